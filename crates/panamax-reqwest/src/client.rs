//! The shared API client and its two interceptor stages.

use std::sync::Arc;

use panamax_core::TokenStore;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// Tracing target for API client operations.
pub const TRACING_TARGET: &str = "panamax_reqwest::client";

/// Capacity of the unauthorized broadcast channel. Events are tiny and a
/// lagging subscriber only ever needs the fact that one fired.
const UNAUTHORIZED_CHANNEL_CAPACITY: usize = 16;

/// Signal emitted by the incoming stage when the backend rejects a
/// credential.
///
/// The transport never navigates; whoever subscribes (the session
/// controller, an app shell) decides what a rejected credential means for
/// the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnauthorizedEvent {
    /// Path of the request that was answered with 401.
    pub path: String,
}

/// Whether the outgoing stage should attach the stored bearer credential.
///
/// Pre-authentication endpoints (login, register, password reset) precede
/// token issuance and are exempt from attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialPolicy {
    /// Read the token store and attach `Authorization: Bearer <token>`.
    Attach,
    /// Send the request without credentials.
    Skip,
}

/// Inner client that holds the HTTP client, configuration, and the shared
/// credential store.
struct ApiClientInner {
    http: Client,
    config: ApiConfig,
    tokens: TokenStore,
    unauthorized: broadcast::Sender<UnauthorizedEvent>,
}

/// The single shared HTTP client wrapping all backend calls.
///
/// Cheap to clone; all clones share one connection pool, one credential
/// store, and one unauthorized broadcast channel.
///
/// # Examples
///
/// ```rust,ignore
/// use panamax_core::TokenStore;
/// use panamax_reqwest::{ApiClient, ApiConfig};
///
/// let tokens = TokenStore::open("~/.panamax/credential.json");
/// let client = ApiClient::new(ApiConfig::default(), tokens);
///
/// let mut unauthorized = client.subscribe_unauthorized();
/// let user = client.current_user().await?;
/// ```
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Creates a new API client with the given configuration and credential
    /// store.
    pub fn new(config: ApiConfig, tokens: TokenStore) -> Self {
        let timeout = config.effective_timeout();
        let user_agent = config.effective_user_agent();

        tracing::debug!(
            target: TRACING_TARGET,
            base_url = %config.base_url,
            timeout_ms = timeout.as_millis(),
            "Creating API client"
        );

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(&user_agent)
            .build()
            .expect("failed to create HTTP client");

        let (unauthorized, _) = broadcast::channel(UNAUTHORIZED_CHANNEL_CAPACITY);

        let inner = ApiClientInner {
            http,
            config,
            tokens,
            unauthorized,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Gets the client configuration.
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Gets the shared credential store.
    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    /// Subscribes to credential-rejection signals from the incoming stage.
    ///
    /// Every 401 that cleared (or would have cleared) the credential is
    /// published here, regardless of which call triggered it.
    pub fn subscribe_unauthorized(&self) -> broadcast::Receiver<UnauthorizedEvent> {
        self.inner.unauthorized.subscribe()
    }

    /// Builds the absolute URL for an endpoint path.
    fn endpoint(&self, path: &str) -> String {
        let base = self.inner.config.base_url.as_str().trim_end_matches('/');
        format!("{}/{}", base, path.trim_start_matches('/'))
    }

    /// Sends one request through both interceptor stages.
    ///
    /// This is the data-fetch capability the rest of the dashboard builds
    /// its own endpoint wrappers on. The token read for the outgoing stage
    /// happens exactly once, before dispatch; subsequent store writes
    /// cannot affect this request.
    pub async fn send<B, R>(
        &self,
        method: Method,
        path: &str,
        policy: CredentialPolicy,
        body: Option<&B>,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        // Outgoing stage: one atomic read-then-attach per request.
        let sent_token = match policy {
            CredentialPolicy::Attach => self.inner.tokens.get(),
            CredentialPolicy::Skip => None,
        };
        self.dispatch(method, path, sent_token, body).await
    }

    /// Sends one request carrying exactly the given credential, bypassing
    /// the store read.
    ///
    /// Used for best-effort revocation after a local logout, where the
    /// store has already been cleared but the old session should still be
    /// told to die.
    pub(crate) async fn send_with_token<B, R>(
        &self,
        method: Method,
        path: &str,
        token: String,
        body: Option<&B>,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.dispatch(method, path, Some(token), body).await
    }

    /// The token that was attached travels with the request's lifetime so
    /// the incoming stage can tell a stale 401 from a current one.
    async fn dispatch<B, R>(
        &self,
        method: Method,
        path: &str,
        sent_token: Option<String>,
        body: Option<&B>,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self.inner.http.request(method.clone(), self.endpoint(path));
        if let Some(token) = &sent_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(
            target: TRACING_TARGET,
            %method,
            path,
            authenticated = sent_token.is_some(),
            "Dispatching request"
        );

        let response = request.send().await?;
        let status = response.status();

        // Incoming stage: only 401 is special-cased; everything else
        // belongs to the caller.
        if status == StatusCode::UNAUTHORIZED {
            self.invalidate_credential(path, sent_token.as_deref());
            return Err(Error::Unauthorized);
        }

        if !status.is_success() {
            let message = response
                .json::<ApiMessage>()
                .await
                .ok()
                .map(|body| body.message);
            tracing::debug!(
                target: TRACING_TARGET,
                path,
                status = status.as_u16(),
                "Request failed"
            );
            return Err(Error::Api { status, message });
        }

        Ok(response.json::<R>().await?)
    }

    /// Global 401 policy: clear the stored credential and signal
    /// subscribers.
    ///
    /// The store is re-read at the moment of clearing. A 401 from a
    /// request dispatched under a token that has since been replaced must
    /// not discard the newer credential, so clearing is suppressed when
    /// the current token differs from the one this request carried. A 401
    /// racing the replacement of its own token between this compare and
    /// the clear remains possible; writes are last-write-wins.
    fn invalidate_credential(&self, path: &str, sent_token: Option<&str>) {
        let current = self.inner.tokens.get();
        if current.as_deref() != sent_token {
            tracing::debug!(
                target: TRACING_TARGET,
                path,
                "Ignoring stale 401; credential changed since dispatch"
            );
            return;
        }

        self.inner.tokens.clear();
        tracing::warn!(
            target: TRACING_TARGET,
            path,
            "Credential rejected by backend; store cleared"
        );

        // Nobody listening is fine; the store is already cleared.
        let _ = self.inner.unauthorized.send(UnauthorizedEvent {
            path: path.to_string(),
        });
    }
}

/// Error body shape used by the backend for non-2xx responses.
#[derive(Debug, serde::Deserialize)]
struct ApiMessage {
    message: String,
}
