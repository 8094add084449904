//! Typed wrappers for the backend's auth and session-directory endpoints.
//!
//! These forward parameters verbatim; retry policy, if any, belongs to the
//! caller. Only the 401 interception in [`ApiClient::send`] is global.

use panamax_core::Result;
use panamax_core::types::{
    AuthResponse, AuthSession, LoginCredentials, LogoutOthersResponse, MessageResponse,
    RegisterData, User,
};
use reqwest::Method;
use serde::Serialize;

use crate::client::{ApiClient, CredentialPolicy};

#[derive(Debug, Serialize)]
struct ForgotPasswordRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct ResetPasswordRequest<'a> {
    token: &'a str,
    password: &'a str,
}

impl ApiClient {
    /// Authenticates with email and password.
    ///
    /// Precedes token issuance, so no credential is attached. The returned
    /// [`AuthResponse`] carries the token and the user as one payload; the
    /// session controller applies both atomically.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse> {
        self.send(
            Method::POST,
            "auth/login",
            CredentialPolicy::Skip,
            Some(credentials),
        )
        .await
        .map_err(Into::into)
    }

    /// Creates a new account and authenticates it.
    pub async fn register(&self, data: &RegisterData) -> Result<AuthResponse> {
        self.send(
            Method::POST,
            "auth/register",
            CredentialPolicy::Skip,
            Some(data),
        )
        .await
        .map_err(Into::into)
    }

    /// Fetches the account tied to the current credential.
    pub async fn current_user(&self) -> Result<User> {
        self.send(
            Method::GET,
            "auth/me",
            CredentialPolicy::Attach,
            None::<&()>,
        )
        .await
        .map_err(Into::into)
    }

    /// Requests a password-reset email.
    pub async fn forgot_password(&self, email: &str) -> Result<MessageResponse> {
        self.send(
            Method::POST,
            "auth/forgot-password",
            CredentialPolicy::Skip,
            Some(&ForgotPasswordRequest { email }),
        )
        .await
        .map_err(Into::into)
    }

    /// Redeems a password-reset token.
    pub async fn reset_password(&self, token: &str, password: &str) -> Result<MessageResponse> {
        self.send(
            Method::POST,
            "auth/reset-password",
            CredentialPolicy::Skip,
            Some(&ResetPasswordRequest { token, password }),
        )
        .await
        .map_err(Into::into)
    }

    /// Revokes the current session server-side.
    ///
    /// Local logout does not depend on this call succeeding; the session
    /// controller issues it best-effort.
    pub async fn logout(&self) -> Result<MessageResponse> {
        self.send(
            Method::POST,
            "auth/logout",
            CredentialPolicy::Attach,
            None::<&()>,
        )
        .await
        .map_err(Into::into)
    }

    /// Revokes a specific credential's session server-side.
    ///
    /// Takes the token explicitly so a logout that has already cleared the
    /// store can still revoke the session it used to own.
    pub async fn revoke_session(&self, token: String) -> Result<MessageResponse> {
        self.send_with_token(Method::POST, "auth/logout", token, None::<&()>)
            .await
            .map_err(Into::into)
    }

    /// Lists every device session for the current account.
    pub async fn list_sessions(&self) -> Result<Vec<AuthSession>> {
        self.send(
            Method::GET,
            "auth/sessions",
            CredentialPolicy::Attach,
            None::<&()>,
        )
        .await
        .map_err(Into::into)
    }

    /// Revokes every session except the one tied to the current credential.
    pub async fn logout_other_sessions(&self) -> Result<LogoutOthersResponse> {
        self.send(
            Method::POST,
            "auth/sessions/logout-others",
            CredentialPolicy::Attach,
            None::<&()>,
        )
        .await
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use panamax_core::types::Role;
    use panamax_core::{DEFAULT_TOKEN_TTL, ErrorKind, TokenStore};
    use panamax_test::MockBackend;

    use crate::{ApiClient, ApiConfig};

    use super::*;

    async fn spawn_backend() -> (panamax_test::MockBackendHandle, ApiClient, TokenStore) {
        let handle = MockBackend::new()
            .with_account("a@x.com", "p", Role::Client, true)
            .spawn()
            .await;
        let tokens = TokenStore::in_memory();
        let client = ApiClient::new(ApiConfig::new(handle.base_url()), tokens.clone());
        (handle, client, tokens)
    }

    #[tokio::test]
    async fn test_login_then_current_user_returns_same_id() {
        let (_handle, client, tokens) = spawn_backend().await;

        let auth = client
            .login(&LoginCredentials::new("a@x.com", "p"))
            .await
            .unwrap();
        tokens.set(&auth.access_token, DEFAULT_TOKEN_TTL);

        let user = client.current_user().await.unwrap();
        assert_eq!(user.id, auth.user.id);
        assert_eq!(user.email, "a@x.com");
    }

    #[tokio::test]
    async fn test_login_failure_propagates_to_caller() {
        let (_handle, client, tokens) = spawn_backend().await;

        let err = client
            .login(&LoginCredentials::new("a@x.com", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(tokens.get(), None);
    }

    #[tokio::test]
    async fn test_revoked_token_clears_store_and_signals() {
        let (handle, client, tokens) = spawn_backend().await;

        let auth = client
            .login(&LoginCredentials::new("a@x.com", "p"))
            .await
            .unwrap();
        tokens.set(&auth.access_token, DEFAULT_TOKEN_TTL);
        let mut unauthorized = client.subscribe_unauthorized();

        // Session dies server-side (revoked from another device, expiry).
        handle.revoke_token(&auth.access_token);

        let err = client.current_user().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(tokens.get(), None);

        let event = unauthorized.try_recv().unwrap();
        assert_eq!(event.path, "auth/me");
    }

    #[tokio::test]
    async fn test_register_issues_unverified_account() {
        let (_handle, client, tokens) = spawn_backend().await;

        let auth = client
            .register(&RegisterData {
                email: "new@x.com".into(),
                password: "secret".into(),
                first_name: Some("New".into()),
                last_name: None,
            })
            .await
            .unwrap();
        tokens.set(&auth.access_token, DEFAULT_TOKEN_TTL);

        assert!(!auth.user.email_verified);
        assert_eq!(client.current_user().await.unwrap().id, auth.user.id);
    }

    #[tokio::test]
    async fn test_register_duplicate_email_is_api_error() {
        let (_handle, client, _tokens) = spawn_backend().await;

        let err = client
            .register(&RegisterData {
                email: "a@x.com".into(),
                password: "secret".into(),
                first_name: None,
                last_name: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api);
        assert!(err.message.as_deref().unwrap_or_default().contains("email"));
    }

    #[tokio::test]
    async fn test_logout_revokes_session_server_side() {
        let (_handle, client, tokens) = spawn_backend().await;

        let auth = client
            .login(&LoginCredentials::new("a@x.com", "p"))
            .await
            .unwrap();
        tokens.set(&auth.access_token, DEFAULT_TOKEN_TTL);

        client.logout().await.unwrap();

        // The token is gone server-side; the next call must 401.
        let err = client.current_user().await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_session_directory_lists_and_revokes_others() {
        let (handle, client, tokens) = spawn_backend().await;

        // First device.
        client
            .login(&LoginCredentials::new("a@x.com", "p").with_device_name("phone"))
            .await
            .unwrap();

        // Second device becomes the current one.
        let auth = client
            .login(&LoginCredentials::new("a@x.com", "p").with_device_name("laptop"))
            .await
            .unwrap();
        tokens.set(&auth.access_token, DEFAULT_TOKEN_TTL);

        let sessions = client.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions.iter().filter(|s| s.is_current).count(), 1);

        let revoked = client.logout_other_sessions().await.unwrap();
        assert_eq!(revoked.revoked_count, 1);

        let sessions = client.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].is_current);
        assert_eq!(sessions[0].device_name.as_deref(), Some("laptop"));

        drop(handle);
    }

    #[tokio::test]
    async fn test_force_logout_others_leaves_single_session() {
        let (_handle, client, tokens) = spawn_backend().await;

        client
            .login(&LoginCredentials::new("a@x.com", "p"))
            .await
            .unwrap();
        client
            .login(&LoginCredentials::new("a@x.com", "p"))
            .await
            .unwrap();

        let auth = client
            .login(&LoginCredentials::new("a@x.com", "p").with_force_logout_others())
            .await
            .unwrap();
        tokens.set(&auth.access_token, DEFAULT_TOKEN_TTL);

        let sessions = client.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].is_current);
    }

    #[tokio::test]
    async fn test_forgot_and_reset_password_flow() {
        let (handle, client, _tokens) = spawn_backend().await;

        client.forgot_password("a@x.com").await.unwrap();
        let reset_token = handle.last_reset_token().expect("reset token issued");

        client.reset_password(&reset_token, "brand-new").await.unwrap();

        // Old password no longer works, new one does.
        assert!(client.login(&LoginCredentials::new("a@x.com", "p")).await.is_err());
        client
            .login(&LoginCredentials::new("a@x.com", "brand-new"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_reset_token_is_api_error() {
        let (_handle, client, _tokens) = spawn_backend().await;

        let err = client
            .reset_password("bogus", "whatever")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api);
    }
}
