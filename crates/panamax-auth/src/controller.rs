//! Process-wide session state and its lifecycle.

use panamax_core::types::{LoginCredentials, RegisterData, Role, User};
use panamax_core::{DEFAULT_TOKEN_TTL, Result};
use panamax_reqwest::ApiClient;
use tokio::sync::{broadcast, watch};

use crate::TRACING_TARGET_CONTROLLER;

/// Read-only authorization snapshot exposed to views.
///
/// `loading == false` together with an absent user means "unauthenticated";
/// a present user implies a credential existed in the store when it was
/// fetched. Views never see the token store itself.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    /// The authenticated account, absent when logged out.
    pub user: Option<User>,
    /// Whether the initial credential restoration is still in flight.
    pub loading: bool,
}

impl AuthSnapshot {
    /// Returns `true` once a user is present.
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Exact-match role predicate; total, and false whenever the user is
    /// absent.
    pub fn has_role(&self, role: Role) -> bool {
        self.user.as_ref().is_some_and(|user| user.has_role(role))
    }
}

/// The auth session controller.
///
/// One instance lives for the lifetime of the process and owns the state
/// machine `INIT → LOADING → {AUTHENTICATED, UNAUTHENTICATED}`; both
/// settled states are re-entrant through login, logout, and credential
/// rejection. All mutation goes through the transport and the shared
/// credential store; views consume snapshots only.
///
/// Must be created inside a Tokio runtime: construction spawns the task
/// that listens for the transport's credential-rejection signal.
#[derive(Clone)]
pub struct SessionController {
    client: ApiClient,
    state: watch::Sender<AuthSnapshot>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Creates the controller in its initial loading state and subscribes
    /// it to the transport's unauthorized signal.
    pub fn new(client: ApiClient) -> Self {
        let (state, _) = watch::channel(AuthSnapshot {
            user: None,
            loading: true,
        });

        let controller = Self { client, state };
        controller.spawn_unauthorized_listener();
        controller
    }

    /// The transport this controller mutates sessions through.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    /// Waits until the controller has settled (`loading == false`) and
    /// returns that snapshot.
    pub async fn settled(&self) -> AuthSnapshot {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|snapshot| !snapshot.loading).await {
            Ok(snapshot) => snapshot.clone(),
            // The sender lives on self; closure is unreachable in practice.
            Err(_) => self.snapshot(),
        }
    }

    /// Returns `true` once a user is present.
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Exact-match role predicate over the current user; false when absent.
    pub fn has_role(&self, role: Role) -> bool {
        self.state.borrow().has_role(role)
    }

    /// Restores the session at app start.
    ///
    /// With no stored credential this settles straight into
    /// "unauthenticated" without a network round-trip. With one, the
    /// current user is fetched; an invalid credential surfaces as a 401,
    /// which the transport has already handled by clearing the store, so
    /// this settles unauthenticated without navigating (navigation belongs
    /// to the unauthorized subscriber, never to the controller).
    pub async fn init(&self) -> AuthSnapshot {
        self.state.send_modify(|snapshot| snapshot.loading = true);

        if self.client.tokens().get().is_none() {
            tracing::debug!(
                target: TRACING_TARGET_CONTROLLER,
                "No stored credential; settling unauthenticated"
            );
            return self.settle(None);
        }

        match self.client.current_user().await {
            Ok(user) => {
                tracing::info!(
                    target: TRACING_TARGET_CONTROLLER,
                    user_id = %user.id,
                    "Session restored from stored credential"
                );
                self.settle(Some(user))
            }
            Err(err) => {
                tracing::debug!(
                    target: TRACING_TARGET_CONTROLLER,
                    error = %err,
                    "Credential restoration failed; settling unauthenticated"
                );
                self.settle(None)
            }
        }
    }

    /// Authenticates and applies the resulting credential and user as one
    /// step.
    ///
    /// On failure the user stays absent and the error propagates to the
    /// calling form; nothing is retried.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<User> {
        let auth = self.client.login(credentials).await?;
        tracing::info!(
            target: TRACING_TARGET_CONTROLLER,
            user_id = %auth.user.id,
            "Login succeeded"
        );
        Ok(self.apply_auth(auth.access_token, auth.user))
    }

    /// Creates an account and applies the resulting credential and user as
    /// one step.
    pub async fn register(&self, data: &RegisterData) -> Result<User> {
        let auth = self.client.register(data).await?;
        tracing::info!(
            target: TRACING_TARGET_CONTROLLER,
            user_id = %auth.user.id,
            "Registration succeeded"
        );
        Ok(self.apply_auth(auth.access_token, auth.user))
    }

    /// Logs out locally and revokes the session server-side best-effort.
    ///
    /// Local state is correct the moment this is entered: the store and
    /// the user are cleared before any network traffic. The revoke call
    /// carries the old token explicitly and its failure is ignored.
    pub async fn logout(&self) {
        let token = self.client.tokens().get();
        self.client.tokens().clear();
        self.settle(None);
        tracing::info!(target: TRACING_TARGET_CONTROLLER, "Logged out");

        if let Some(token) = token {
            if let Err(err) = self.client.revoke_session(token).await {
                tracing::debug!(
                    target: TRACING_TARGET_CONTROLLER,
                    error = %err,
                    "Best-effort session revoke failed"
                );
            }
        }
    }

    /// Applies an [`AuthResponse`](panamax_core::types::AuthResponse)
    /// atomically: credential and user together, never one without the
    /// other.
    fn apply_auth(&self, access_token: String, user: User) -> User {
        self.client.tokens().set(access_token, DEFAULT_TOKEN_TTL);
        self.settle(Some(user.clone()));
        user
    }

    fn settle(&self, user: Option<User>) -> AuthSnapshot {
        self.state.send_modify(|snapshot| {
            snapshot.user = user;
            snapshot.loading = false;
        });
        self.snapshot()
    }

    /// Drops the user whenever the transport reports a rejected
    /// credential. The store is already cleared by the time the signal
    /// arrives; this closes the loop within one event cycle.
    fn spawn_unauthorized_listener(&self) {
        let mut rx = self.client.subscribe_unauthorized();
        let state = self.state.clone();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        tracing::info!(
                            target: TRACING_TARGET_CONTROLLER,
                            path = %event.path,
                            "Credential rejected; dropping user state"
                        );
                        state.send_modify(|snapshot| {
                            snapshot.user = None;
                            snapshot.loading = false;
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Only the fact that one fired matters.
                        tracing::debug!(
                            target: TRACING_TARGET_CONTROLLER,
                            skipped,
                            "Unauthorized signal receiver lagged"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}
