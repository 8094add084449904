//! Internal error types for panamax-reqwest.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for panamax-reqwest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Internal error type for panamax-reqwest operations.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// The backend rejected the credential; the global invalidation policy
    /// has already run by the time this surfaces to a caller.
    #[error("Unauthorized")]
    Unauthorized,
    /// The backend answered with a non-401 error status.
    #[error("API error: {status}{}", message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
    Api {
        /// HTTP status of the response.
        status: StatusCode,
        /// Server-provided message, when the body carried one.
        message: Option<String>,
    },
}

impl From<Error> for panamax_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Reqwest(e) => {
                if e.is_timeout() {
                    panamax_core::Error::timeout()
                        .with_message(e.to_string())
                        .with_source(e)
                } else if e.is_connect() {
                    panamax_core::Error::network_error()
                        .with_message("Connection failed")
                        .with_source(e)
                } else if e.is_decode() {
                    panamax_core::Error::serialization()
                        .with_message(e.to_string())
                        .with_source(e)
                } else {
                    panamax_core::Error::network_error()
                        .with_message(e.to_string())
                        .with_source(e)
                }
            }
            Error::Serde(e) => panamax_core::Error::serialization()
                .with_message(e.to_string())
                .with_source(e),
            Error::Unauthorized => panamax_core::Error::unauthorized(),
            Error::Api { status, message } => {
                let base = if status == StatusCode::FORBIDDEN {
                    panamax_core::Error::forbidden()
                } else {
                    panamax_core::Error::api()
                };
                match message {
                    Some(message) => base.with_message(message),
                    None => base.with_message(format!("HTTP {status}")),
                }
            }
        }
    }
}
