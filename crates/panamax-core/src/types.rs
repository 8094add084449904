//! Wire-level auth data model shared by the transport and the session
//! controller.
//!
//! All payloads use camelCase field names on the wire, matching the
//! dashboard backend's JSON contract. Responses are deserialized verbatim;
//! none of these types carry client-side state of their own.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, IntoStaticStr};
use uuid::Uuid;

/// Authorization tag gating specific views.
///
/// A role is a single exact-match enum, not a set: an `Admin` does not
/// implicitly pass a `Client` check or vice versa.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Regular dashboard customer.
    Client,
    /// Operator with access to administrative views.
    Admin,
}

/// The authenticated account as returned by `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique account identifier.
    pub id: Uuid,
    /// Account email address.
    pub email: String,
    /// Authorization role for this account.
    pub role: Role,
    /// Optional given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Optional family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Whether the account email has been confirmed.
    pub email_verified: bool,
    /// Timestamp when the account was created.
    pub created_at: Timestamp,
    /// Subscription plan identifier, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
    /// Subscription billing status, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<String>,
}

impl User {
    /// Returns `true` if this account carries exactly the given role.
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }
}

/// One device/browser's authenticated instance, independently revocable.
///
/// Created server-side at login; the client only lists and revokes these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    /// Unique record identifier.
    pub id: Uuid,
    /// Opaque server-side session identifier.
    pub session_id: String,
    /// Self-reported device name captured at login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    /// User agent string captured at login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Remote address captured at login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Timestamp when the session was created.
    pub created_at: Timestamp,
    /// Timestamp of the last request seen on this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<Timestamp>,
    /// Whether this record is the session tied to the active credential.
    pub is_current: bool,
}

/// Login request payload. Not persisted client-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginCredentials {
    /// Account email address.
    pub email: String,
    /// Account password, sent verbatim over TLS.
    pub password: String,
    /// Self-reported device name for the session directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    /// When set, the backend invalidates every other session for this
    /// account atomically with the login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_logout_others: Option<bool>,
}

impl LoginCredentials {
    /// Creates a plain email/password login payload.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            device_name: None,
            force_logout_others: None,
        }
    }

    /// Sets the device name reported to the session directory.
    pub fn with_device_name(mut self, device_name: impl Into<String>) -> Self {
        self.device_name = Some(device_name.into());
        self
    }

    /// Requests invalidation of all other sessions at login.
    pub fn with_force_logout_others(mut self) -> Self {
        self.force_logout_others = Some(true);
        self
    }
}

/// Registration request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterData {
    /// Account email address.
    pub email: String,
    /// Account password.
    pub password: String,
    /// Optional given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Optional family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// The atomic result of login and registration.
///
/// The credential and the user must always be applied together; there is
/// no valid state where one half of this payload has been consumed and the
/// other discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Bearer credential for subsequent requests.
    pub access_token: String,
    /// The authenticated account.
    pub user: User,
}

/// Result of a logout-others call against the session directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutOthersResponse {
    /// Human-readable confirmation.
    pub message: String,
    /// Number of sessions invalidated. Informational only; does not affect
    /// the local credential.
    pub revoked_count: u64,
}

/// Generic message-only response (forgot/reset password).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable confirmation.
    pub message: String,
}
