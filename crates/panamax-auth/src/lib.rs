#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for session controller operations.
pub const TRACING_TARGET_CONTROLLER: &str = "panamax_auth::controller";

/// Tracing target for route guard operations.
pub const TRACING_TARGET_GUARD: &str = "panamax_auth::guard";

mod controller;
mod guard;
mod notice;

pub use crate::controller::{AuthSnapshot, SessionController};
pub use crate::guard::{
    AccessDecision, DEFAULT_HOME_TARGET, DEFAULT_LOGIN_TARGET, Navigator, RouteGuard,
    evaluate_access, spawn_unauthorized_redirect,
};
pub use crate::notice::{VerificationNotice, verification_notice};
