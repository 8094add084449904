//! Access gating for protected views.
//!
//! Both guard forms evaluate the same pure function, so a wrapped view and
//! a manually branching page can never disagree about who gets in.

use std::sync::{Arc, Mutex, PoisonError};

use panamax_core::types::Role;
use panamax_reqwest::ApiClient;
use tokio::sync::broadcast;

use crate::TRACING_TARGET_GUARD;
use crate::controller::{AuthSnapshot, SessionController};

/// Default login entry point.
pub const DEFAULT_LOGIN_TARGET: &str = "/login";

/// Default landing page for authenticated users lacking a required role.
pub const DEFAULT_HOME_TARGET: &str = "/";

/// Outcome of evaluating a snapshot against a guard's requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// State has not settled; render a neutral pending indicator and do
    /// not redirect.
    Pending,
    /// Render the protected view.
    Allow,
    /// Not authenticated; go to the login entry point.
    RedirectLogin,
    /// Authenticated but missing the required role; go to the landing
    /// page, never to login.
    RedirectHome,
}

/// The single gating rule shared by every guard form.
///
/// Never redirects while loading: the one suspension point of the
/// subsystem is waiting for the controller's init round-trip to settle.
pub fn evaluate_access(snapshot: &AuthSnapshot, required_role: Option<Role>) -> AccessDecision {
    if snapshot.loading {
        return AccessDecision::Pending;
    }
    if !snapshot.is_authenticated() {
        return AccessDecision::RedirectLogin;
    }
    if let Some(role) = required_role {
        if !snapshot.has_role(role) {
            return AccessDecision::RedirectHome;
        }
    }
    AccessDecision::Allow
}

impl SessionController {
    /// Hook form of the route guard: the current access decision for
    /// manual branching. Identical rules to [`RouteGuard`] by
    /// construction.
    pub fn access_status(&self, required_role: Option<Role>) -> AccessDecision {
        evaluate_access(&self.snapshot(), required_role)
    }
}

/// Fire-and-forget navigation sink.
///
/// Navigation supersedes any pending render, so there is no cancellation
/// or completion signal to report back.
pub trait Navigator: Send + Sync {
    /// Navigates to the given target.
    fn navigate(&self, target: &str);
}

/// Wrapping form of the route guard.
///
/// Placed in front of a protected view: [`RouteGuard::resolve`] waits for
/// the controller to settle, evaluates access, and performs at most one
/// navigation per distinct redirect decision. Re-resolving with unchanged
/// inputs never re-issues the navigation.
pub struct RouteGuard {
    controller: SessionController,
    navigator: Arc<dyn Navigator>,
    required_role: Option<Role>,
    login_target: String,
    last_redirect: Mutex<Option<(AccessDecision, String)>>,
}

impl std::fmt::Debug for RouteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteGuard")
            .field("required_role", &self.required_role)
            .field("login_target", &self.login_target)
            .finish_non_exhaustive()
    }
}

impl RouteGuard {
    /// Creates a guard with no role requirement and the default login
    /// target.
    pub fn new(controller: SessionController, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            controller,
            navigator,
            required_role: None,
            login_target: DEFAULT_LOGIN_TARGET.to_string(),
            last_redirect: Mutex::new(None),
        }
    }

    /// Requires the given role in addition to authentication.
    pub fn with_required_role(mut self, role: Role) -> Self {
        self.required_role = Some(role);
        self
    }

    /// Overrides the login entry point this guard redirects to.
    pub fn with_login_target(mut self, target: impl Into<String>) -> Self {
        self.login_target = target.into();
        self
    }

    /// Waits for the controller to settle, then gates.
    ///
    /// Returns the decision so the caller can render the view, a pending
    /// indicator, or nothing (when a redirect was issued).
    pub async fn resolve(&self) -> AccessDecision {
        let snapshot = self.controller.settled().await;
        let decision = evaluate_access(&snapshot, self.required_role);

        match decision {
            AccessDecision::RedirectLogin => self.redirect(decision, self.login_target.clone()),
            AccessDecision::RedirectHome => self.redirect(decision, DEFAULT_HOME_TARGET.to_string()),
            AccessDecision::Allow | AccessDecision::Pending => {
                *self.lock_last() = None;
            }
        }

        decision
    }

    /// One-shot navigation: only issued when the decision/target pair
    /// differs from the last redirect this guard performed.
    fn redirect(&self, decision: AccessDecision, target: String) {
        let mut last = self.lock_last();
        if last.as_ref() == Some(&(decision, target.clone())) {
            return;
        }

        tracing::debug!(
            target: TRACING_TARGET_GUARD,
            ?decision,
            redirect_target = %target,
            "Access denied; redirecting"
        );
        self.navigator.navigate(&target);
        *last = Some((decision, target));
    }

    fn lock_last(&self) -> std::sync::MutexGuard<'_, Option<(AccessDecision, String)>> {
        self.last_redirect
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Installs the single top-level subscriber that turns the transport's
/// credential-rejection signal into a navigation to the login entry point.
///
/// The transport deliberately does not navigate; exactly one of these
/// should exist per app shell.
pub fn spawn_unauthorized_redirect(
    client: &ApiClient,
    navigator: Arc<dyn Navigator>,
    target: impl Into<String>,
) -> tokio::task::JoinHandle<()> {
    let mut rx = client.subscribe_unauthorized();
    let target = target.into();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    tracing::info!(
                        target: TRACING_TARGET_GUARD,
                        path = %event.path,
                        redirect_target = %target,
                        "Unauthorized; navigating to login"
                    );
                    navigator.navigate(&target);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use jiff::Timestamp;
    use panamax_core::TokenStore;
    use panamax_core::types::{LoginCredentials, User};
    use panamax_reqwest::{ApiClient, ApiConfig};
    use panamax_test::MockBackend;
    use uuid::Uuid;

    use super::*;

    #[derive(Debug, Default)]
    struct RecordingNavigator {
        targets: StdMutex<Vec<String>>,
    }

    impl RecordingNavigator {
        fn targets(&self) -> Vec<String> {
            self.targets.lock().unwrap().clone()
        }
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, target: &str) {
            self.targets.lock().unwrap().push(target.to_string());
        }
    }

    fn snapshot(user: Option<User>, loading: bool) -> AuthSnapshot {
        AuthSnapshot { user, loading }
    }

    fn user_with_role(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            email: "a@x.com".into(),
            role,
            first_name: None,
            last_name: None,
            email_verified: true,
            created_at: Timestamp::UNIX_EPOCH,
            subscription: None,
            subscription_status: None,
        }
    }

    #[test]
    fn test_loading_is_always_pending() {
        // Never a redirect while loading, whatever else is true.
        for user in [None, Some(user_with_role(Role::Admin))] {
            for role in [None, Some(Role::Client), Some(Role::Admin)] {
                assert_eq!(
                    evaluate_access(&snapshot(user.clone(), true), role),
                    AccessDecision::Pending
                );
            }
        }
    }

    #[test]
    fn test_unauthenticated_redirects_to_login() {
        for role in [None, Some(Role::Client), Some(Role::Admin)] {
            assert_eq!(
                evaluate_access(&snapshot(None, false), role),
                AccessDecision::RedirectLogin
            );
        }
    }

    #[test]
    fn test_missing_role_redirects_home_not_login() {
        let client_user = snapshot(Some(user_with_role(Role::Client)), false);
        assert_eq!(
            evaluate_access(&client_user, Some(Role::Admin)),
            AccessDecision::RedirectHome
        );
    }

    #[test]
    fn test_matching_role_and_no_requirement_allow() {
        let admin = snapshot(Some(user_with_role(Role::Admin)), false);
        assert_eq!(evaluate_access(&admin, None), AccessDecision::Allow);
        assert_eq!(
            evaluate_access(&admin, Some(Role::Admin)),
            AccessDecision::Allow
        );
    }

    async fn authenticated_controller(
        email: &str,
        password: &str,
        role: Role,
    ) -> (panamax_test::MockBackendHandle, SessionController) {
        let handle = MockBackend::new()
            .with_account(email, password, role, true)
            .spawn()
            .await;
        let tokens = TokenStore::in_memory();
        let client = ApiClient::new(ApiConfig::new(handle.base_url()), tokens);
        let controller = SessionController::new(client);
        controller.init().await;
        controller
            .login(&LoginCredentials::new(email, password))
            .await
            .unwrap();
        (handle, controller)
    }

    #[tokio::test]
    async fn test_admin_guard_sends_client_user_home() {
        let (_handle, controller) = authenticated_controller("c@x.com", "p", Role::Client).await;
        let navigator = Arc::new(RecordingNavigator::default());
        let guard = RouteGuard::new(controller, navigator.clone()).with_required_role(Role::Admin);

        let decision = guard.resolve().await;

        assert_eq!(decision, AccessDecision::RedirectHome);
        assert_eq!(navigator.targets(), vec![DEFAULT_HOME_TARGET.to_string()]);
    }

    #[tokio::test]
    async fn test_redirect_is_one_shot_for_unchanged_inputs() {
        let (_handle, controller) = authenticated_controller("c@x.com", "p", Role::Client).await;
        let navigator = Arc::new(RecordingNavigator::default());
        let guard = RouteGuard::new(controller, navigator.clone()).with_required_role(Role::Admin);

        guard.resolve().await;
        guard.resolve().await;
        guard.resolve().await;

        assert_eq!(navigator.targets().len(), 1);
    }

    #[tokio::test]
    async fn test_redirect_reissues_after_decision_changes() {
        let (_handle, controller) = authenticated_controller("c@x.com", "p", Role::Client).await;
        let navigator = Arc::new(RecordingNavigator::default());
        let guard =
            RouteGuard::new(controller.clone(), navigator.clone()).with_required_role(Role::Admin);

        guard.resolve().await; // home
        controller.logout().await;
        guard.resolve().await; // login

        assert_eq!(
            navigator.targets(),
            vec![
                DEFAULT_HOME_TARGET.to_string(),
                DEFAULT_LOGIN_TARGET.to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_unauthenticated_guard_uses_login_target_override() {
        let handle = MockBackend::new().spawn().await;
        let client = ApiClient::new(ApiConfig::new(handle.base_url()), TokenStore::in_memory());
        let controller = SessionController::new(client);
        controller.init().await;

        let navigator = Arc::new(RecordingNavigator::default());
        let guard =
            RouteGuard::new(controller, navigator.clone()).with_login_target("/signin");

        let decision = guard.resolve().await;

        assert_eq!(decision, AccessDecision::RedirectLogin);
        assert_eq!(navigator.targets(), vec!["/signin".to_string()]);
    }

    #[tokio::test]
    async fn test_allowed_guard_does_not_navigate() {
        let (_handle, controller) = authenticated_controller("c@x.com", "p", Role::Client).await;
        let navigator = Arc::new(RecordingNavigator::default());
        let guard = RouteGuard::new(controller, navigator.clone());

        assert_eq!(guard.resolve().await, AccessDecision::Allow);
        assert!(navigator.targets().is_empty());
    }

    #[tokio::test]
    async fn test_hook_form_matches_wrapping_form() {
        let (_handle, controller) = authenticated_controller("c@x.com", "p", Role::Client).await;
        let navigator = Arc::new(RecordingNavigator::default());
        let guard =
            RouteGuard::new(controller.clone(), navigator).with_required_role(Role::Admin);

        assert_eq!(
            controller.access_status(Some(Role::Admin)),
            guard.resolve().await
        );
        assert_eq!(controller.access_status(None), AccessDecision::Allow);
    }

    #[tokio::test]
    async fn test_hook_form_is_pending_while_loading() {
        let handle = MockBackend::new().spawn().await;
        let client = ApiClient::new(ApiConfig::new(handle.base_url()), TokenStore::in_memory());
        let controller = SessionController::new(client);

        // init not called yet
        assert_eq!(controller.access_status(None), AccessDecision::Pending);
        assert_eq!(
            controller.access_status(Some(Role::Admin)),
            AccessDecision::Pending
        );
    }

    #[tokio::test]
    async fn test_unauthorized_signal_drives_login_navigation() {
        let handle = MockBackend::new()
            .with_account("a@x.com", "p", Role::Client, true)
            .spawn()
            .await;
        let tokens = TokenStore::in_memory();
        let client = ApiClient::new(ApiConfig::new(handle.base_url()), tokens.clone());
        let controller = SessionController::new(client.clone());
        let navigator = Arc::new(RecordingNavigator::default());
        let _subscriber =
            spawn_unauthorized_redirect(&client, navigator.clone(), DEFAULT_LOGIN_TARGET);

        controller.init().await;
        controller
            .login(&LoginCredentials::new("a@x.com", "p"))
            .await
            .unwrap();

        let token = tokens.get().unwrap();
        handle.revoke_token(&token);
        let _ = client.current_user().await;

        // The subscriber runs on its own task; give it a moment.
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if navigator.targets() == vec![DEFAULT_LOGIN_TARGET.to_string()] {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("navigation to login observed");
    }
}
