#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for credential store operations.
pub const TRACING_TARGET_TOKEN: &str = "panamax_core::token";

mod error;
mod token;

pub mod types;

pub use crate::error::{BoxedError, Error, ErrorKind, Result};
pub use crate::token::{DEFAULT_TOKEN_TTL, TokenStore};
