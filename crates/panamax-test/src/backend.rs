//! In-memory mock of the backend auth endpoints.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use jiff::Timestamp;
use panamax_core::types::{
    AuthResponse, AuthSession, LoginCredentials, LogoutOthersResponse, MessageResponse,
    RegisterData, Role, User,
};
use url::Url;
use uuid::Uuid;

/// Tracing target for mock backend operations.
pub const TRACING_TARGET: &str = "panamax_test::backend";

#[derive(Debug, Clone)]
struct AccountRecord {
    user: User,
    password: String,
}

#[derive(Debug, Clone)]
struct SessionRecord {
    id: Uuid,
    session_id: String,
    account_id: Uuid,
    token: String,
    device_name: Option<String>,
    created_at: Timestamp,
    last_active_at: Option<Timestamp>,
}

impl SessionRecord {
    fn to_auth_session(&self, current_token: &str) -> AuthSession {
        AuthSession {
            id: self.id,
            session_id: self.session_id.clone(),
            device_name: self.device_name.clone(),
            user_agent: None,
            ip_address: None,
            created_at: self.created_at,
            last_active_at: self.last_active_at,
            is_current: self.token == current_token,
        }
    }
}

#[derive(Debug, Default)]
struct BackendState {
    accounts: Vec<AccountRecord>,
    sessions: Vec<SessionRecord>,
    reset_tokens: Vec<(String, String)>,
}

type SharedState = Arc<Mutex<BackendState>>;

fn lock(state: &SharedState) -> std::sync::MutexGuard<'_, BackendState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builder for the in-process mock auth backend.
///
/// # Examples
///
/// ```rust,ignore
/// use panamax_core::types::Role;
/// use panamax_test::MockBackend;
///
/// let handle = MockBackend::new()
///     .with_account("a@x.com", "p", Role::Client, true)
///     .spawn()
///     .await;
/// let base_url = handle.base_url();
/// ```
#[derive(Debug, Default)]
pub struct MockBackend {
    accounts: Vec<AccountRecord>,
}

impl MockBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an account before the backend starts.
    pub fn with_account(
        mut self,
        email: impl Into<String>,
        password: impl Into<String>,
        role: Role,
        email_verified: bool,
    ) -> Self {
        let user = User {
            id: Uuid::new_v4(),
            email: email.into(),
            role,
            first_name: None,
            last_name: None,
            email_verified,
            created_at: Timestamp::now(),
            subscription: None,
            subscription_status: None,
        };
        self.accounts.push(AccountRecord {
            user,
            password: password.into(),
        });
        self
    }

    /// Binds an ephemeral port and serves the auth routes until the handle
    /// is dropped.
    pub async fn spawn(self) -> MockBackendHandle {
        let state: SharedState = Arc::new(Mutex::new(BackendState {
            accounts: self.accounts,
            ..BackendState::default()
        }));

        let router = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/register", post(register))
            .route("/auth/me", get(me))
            .route("/auth/forgot-password", post(forgot_password))
            .route("/auth/reset-password", post(reset_password))
            .route("/auth/logout", post(logout))
            .route("/auth/sessions", get(list_sessions))
            .route("/auth/sessions/logout-others", post(logout_others))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock backend");
        let addr = listener.local_addr().expect("listener has a local address");

        tracing::debug!(target: TRACING_TARGET, %addr, "Mock backend listening");

        let task = tokio::spawn(async move {
            // Ends when the handle aborts the task.
            let _ = axum::serve(listener, router).await;
        });

        MockBackendHandle { addr, state, task }
    }
}

/// Running mock backend; aborts the server task on drop.
#[derive(Debug)]
pub struct MockBackendHandle {
    addr: SocketAddr,
    state: SharedState,
    task: tokio::task::JoinHandle<()>,
}

impl MockBackendHandle {
    /// Base URL to hand to the client under test.
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).expect("socket address is a valid URL")
    }

    /// Revokes a session server-side, as another device's logout-others or
    /// an expiry sweep would.
    pub fn revoke_token(&self, token: &str) {
        lock(&self.state).sessions.retain(|s| s.token != token);
    }

    /// Number of live sessions for the given account email.
    pub fn session_count(&self, email: &str) -> usize {
        let state = lock(&self.state);
        let Some(account) = state.accounts.iter().find(|a| a.user.email == email) else {
            return 0;
        };
        state
            .sessions
            .iter()
            .filter(|s| s.account_id == account.user.id)
            .count()
    }

    /// The most recently issued password-reset token, if any.
    pub fn last_reset_token(&self) -> Option<String> {
        lock(&self.state)
            .reset_tokens
            .last()
            .map(|(token, _)| token.clone())
    }

    /// Flips the email-verified flag on an account.
    pub fn set_email_verified(&self, email: &str, verified: bool) {
        let mut state = lock(&self.state);
        if let Some(account) = state.accounts.iter_mut().find(|a| a.user.email == email) {
            account.user.email_verified = verified;
        }
    }
}

impl Drop for MockBackendHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(MessageResponse {
            message: "invalid or expired credentials".into(),
        }),
    )
        .into_response()
}

fn issue_session(
    state: &mut BackendState,
    account_id: Uuid,
    device_name: Option<String>,
) -> String {
    let token = new_token();
    state.sessions.push(SessionRecord {
        id: Uuid::new_v4(),
        session_id: new_token(),
        account_id,
        token: token.clone(),
        device_name,
        created_at: Timestamp::now(),
        last_active_at: None,
    });
    token
}

async fn login(State(state): State<SharedState>, Json(payload): Json<LoginCredentials>) -> Response {
    let mut state = lock(&state);

    let Some(account) = state
        .accounts
        .iter()
        .find(|a| a.user.email == payload.email && a.password == payload.password)
        .cloned()
    else {
        return unauthorized();
    };

    if payload.force_logout_others == Some(true) {
        let account_id = account.user.id;
        state.sessions.retain(|s| s.account_id != account_id);
    }

    let token = issue_session(&mut state, account.user.id, payload.device_name);
    Json(AuthResponse {
        access_token: token,
        user: account.user,
    })
    .into_response()
}

async fn register(State(state): State<SharedState>, Json(payload): Json<RegisterData>) -> Response {
    let mut state = lock(&state);

    if state.accounts.iter().any(|a| a.user.email == payload.email) {
        return (
            StatusCode::CONFLICT,
            Json(MessageResponse {
                message: "email already registered".into(),
            }),
        )
            .into_response();
    }

    let user = User {
        id: Uuid::new_v4(),
        email: payload.email,
        role: Role::Client,
        first_name: payload.first_name,
        last_name: payload.last_name,
        email_verified: false,
        created_at: Timestamp::now(),
        subscription: None,
        subscription_status: None,
    };
    state.accounts.push(AccountRecord {
        user: user.clone(),
        password: payload.password,
    });

    let token = issue_session(&mut state, user.id, None);
    Json(AuthResponse {
        access_token: token,
        user,
    })
    .into_response()
}

async fn me(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return unauthorized();
    };
    let mut state = lock(&state);

    let Some(session) = state.sessions.iter_mut().find(|s| s.token == token) else {
        return unauthorized();
    };
    session.last_active_at = Some(Timestamp::now());
    let account_id = session.account_id;

    match state.accounts.iter().find(|a| a.user.id == account_id) {
        Some(account) => Json(account.user.clone()).into_response(),
        None => unauthorized(),
    }
}

async fn forgot_password(
    State(state): State<SharedState>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    let email = payload
        .get("email")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let mut state = lock(&state);

    if state.accounts.iter().any(|a| a.user.email == email) {
        let token = new_token();
        state.reset_tokens.push((token, email));
    }

    // Same answer whether or not the address exists.
    Json(MessageResponse {
        message: "if the address exists, a reset email was sent".into(),
    })
    .into_response()
}

async fn reset_password(
    State(state): State<SharedState>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    let token = payload
        .get("token")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let password = payload
        .get("password")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let mut state = lock(&state);

    let Some(position) = state.reset_tokens.iter().position(|(t, _)| *t == token) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(MessageResponse {
                message: "invalid or expired reset token".into(),
            }),
        )
            .into_response();
    };
    let (_, email) = state.reset_tokens.remove(position);

    if let Some(account) = state.accounts.iter_mut().find(|a| a.user.email == email) {
        account.password = password;
    }

    Json(MessageResponse {
        message: "password updated".into(),
    })
    .into_response()
}

async fn logout(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return unauthorized();
    };
    let mut state = lock(&state);

    let before = state.sessions.len();
    state.sessions.retain(|s| s.token != token);
    if state.sessions.len() == before {
        return unauthorized();
    }

    Json(MessageResponse {
        message: "logged out".into(),
    })
    .into_response()
}

async fn list_sessions(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return unauthorized();
    };
    let state = lock(&state);

    let Some(session) = state.sessions.iter().find(|s| s.token == token) else {
        return unauthorized();
    };
    let account_id = session.account_id;

    let sessions: Vec<AuthSession> = state
        .sessions
        .iter()
        .filter(|s| s.account_id == account_id)
        .map(|s| s.to_auth_session(&token))
        .collect();

    Json(sessions).into_response()
}

async fn logout_others(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return unauthorized();
    };
    let mut state = lock(&state);

    let Some(session) = state.sessions.iter().find(|s| s.token == token) else {
        return unauthorized();
    };
    let account_id = session.account_id;

    let before = state.sessions.len();
    state
        .sessions
        .retain(|s| s.account_id != account_id || s.token == token);
    let revoked = (before - state.sessions.len()) as u64;

    Json(LogoutOthersResponse {
        message: "other sessions revoked".into(),
        revoked_count: revoked,
    })
    .into_response()
}
