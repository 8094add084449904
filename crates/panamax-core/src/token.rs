//! Persistent storage for the bearer credential.
//!
//! The store owns the one active credential for this client profile. It is
//! the single source of truth consulted by the transport's outgoing stage
//! and mutated by login/logout and by the global 401 handler; writes are
//! last-write-wins and reads always observe the current value.
//!
//! Storage failures (missing directory, unreadable file, corrupt record)
//! never propagate out of read paths: a credential that cannot be read is
//! simply absent.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET_TOKEN;

/// Default credential lifetime: one day.
pub const DEFAULT_TOKEN_TTL: SignedDuration = SignedDuration::from_hours(24);

/// On-disk credential record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCredential {
    token: String,
    expires_at: Timestamp,
}

impl StoredCredential {
    fn is_expired(&self) -> bool {
        self.expires_at <= Timestamp::now()
    }
}

struct TokenStoreInner {
    current: Mutex<Option<StoredCredential>>,
    path: Option<PathBuf>,
}

/// Persistent store for the bearer credential.
///
/// Cheap to clone; all clones share the same state. At most one credential
/// is held at a time and setting a new one overwrites the previous.
///
/// The file-backed variant survives process restarts and writes the record
/// with owner-only permissions on unix. The in-memory variant backs tests
/// and ephemeral profiles.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<TokenStoreInner>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The credential itself is deliberately not printed.
        f.debug_struct("TokenStore")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    /// Creates a store with no persistence.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(TokenStoreInner {
                current: Mutex::new(None),
                path: None,
            }),
        }
    }

    /// Opens a file-backed store, restoring any previously persisted
    /// credential.
    ///
    /// A missing, unreadable, or corrupt record starts the store empty; an
    /// expired record is discarded on load.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let restored = Self::read_record(&path);

        if restored.is_some() {
            tracing::debug!(
                target: TRACING_TARGET_TOKEN,
                path = %path.display(),
                "Restored persisted credential"
            );
        }

        Self {
            inner: Arc::new(TokenStoreInner {
                current: Mutex::new(restored),
                path: Some(path),
            }),
        }
    }

    /// Stores a credential with the given lifetime, overwriting any
    /// previous one.
    pub fn set(&self, token: impl Into<String>, ttl: SignedDuration) {
        let record = StoredCredential {
            token: token.into(),
            expires_at: Timestamp::now()
                .saturating_add(ttl)
                .expect("SignedDuration arithmetic on Timestamp is infallible"),
        };

        *self.lock() = Some(record.clone());
        self.persist(Some(&record));

        tracing::debug!(
            target: TRACING_TARGET_TOKEN,
            expires_at = %record.expires_at,
            "Credential stored"
        );
    }

    /// Returns the current credential, or `None` when missing or expired.
    ///
    /// Never fails: storage problems degrade to an absent credential.
    pub fn get(&self) -> Option<String> {
        let mut guard = self.lock();
        match guard.as_ref() {
            Some(record) if !record.is_expired() => Some(record.token.clone()),
            Some(_) => {
                // Expired records behave exactly like absent ones.
                *guard = None;
                drop(guard);
                self.persist(None);
                tracing::debug!(
                    target: TRACING_TARGET_TOKEN,
                    "Discarded expired credential"
                );
                None
            }
            None => None,
        }
    }

    /// Removes the credential. Idempotent.
    pub fn clear(&self) {
        *self.lock() = None;
        self.persist(None);
        tracing::debug!(target: TRACING_TARGET_TOKEN, "Credential cleared");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<StoredCredential>> {
        self.inner
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_record(path: &Path) -> Option<StoredCredential> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(
                    target: TRACING_TARGET_TOKEN,
                    path = %path.display(),
                    error = %err,
                    "Failed to read credential record; treating as absent"
                );
                return None;
            }
        };

        let record: StoredCredential = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(
                    target: TRACING_TARGET_TOKEN,
                    path = %path.display(),
                    error = %err,
                    "Corrupt credential record; treating as absent"
                );
                return None;
            }
        };

        if record.is_expired() {
            return None;
        }
        Some(record)
    }

    /// Writes the record through to disk, or removes the file when `None`.
    /// Failures are logged and otherwise ignored.
    fn persist(&self, record: Option<&StoredCredential>) {
        let Some(path) = self.inner.path.as_deref() else {
            return;
        };

        let result = match record {
            Some(record) => Self::write_record(path, record),
            None => match std::fs::remove_file(path) {
                Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
                _ => Ok(()),
            },
        };

        if let Err(err) = result {
            tracing::warn!(
                target: TRACING_TARGET_TOKEN,
                path = %path.display(),
                error = %err,
                "Failed to persist credential record"
            );
        }
    }

    fn write_record(path: &Path, record: &StoredCredential) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(record).map_err(std::io::Error::other)?;
        std::fs::write(path, bytes)?;

        // The record must not be readable by other local users; this is the
        // closest filesystem analog of a same-site, secure cookie.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}
