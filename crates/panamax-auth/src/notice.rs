//! Email-verification notice projection.

use crate::controller::AuthSnapshot;

/// A persistent, non-dismissable prompt shown to unverified accounts.
///
/// Pure value: it holds no state and is recomputed from the controller's
/// snapshot on every render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationNotice {
    /// The unverified address, for display in the prompt.
    pub email: String,
}

impl VerificationNotice {
    /// Display text for the notice.
    pub fn message(&self) -> String {
        format!(
            "Please verify your email address ({}). Check your inbox for the confirmation link.",
            self.email
        )
    }
}

/// Projects the current snapshot onto the verification notice.
///
/// Renders nothing while loading, while logged out, or once the email is
/// verified; otherwise the notice stays up until the flag flips.
pub fn verification_notice(snapshot: &AuthSnapshot) -> Option<VerificationNotice> {
    if snapshot.loading {
        return None;
    }
    let user = snapshot.user.as_ref()?;
    if user.email_verified {
        return None;
    }
    Some(VerificationNotice {
        email: user.email.clone(),
    })
}
