#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod api;
mod client;
mod config;
mod error;

pub use crate::client::{ApiClient, CredentialPolicy, TRACING_TARGET, UnauthorizedEvent};
pub use crate::config::{ApiConfig, DEFAULT_TIMEOUT};
pub use crate::error::{Error, Result};

// Re-exported so endpoint wrappers outside this crate don't need a direct
// reqwest dependency.
pub use reqwest::Method;
