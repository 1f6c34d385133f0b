//! Lock error types.

use std::time::Duration;

use thiserror::Error;

use super::LockKey;

/// Errors raised while acquiring scope locks.
///
/// Blocking is the normal outcome of contention; these errors only occur when a
/// caller opted into a timeout or the lock state itself is unusable.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock was still held by another transaction when the wait ran out.
    #[error("Timed out after {waited:?} waiting for scope lock {key}")]
    Timeout {
        /// The contended key
        key: LockKey,
        /// How long the caller waited
        waited: Duration,
    },

    /// The lock table is unusable because a holder panicked while updating it.
    #[error("Lock table poisoned")]
    Poisoned,
}

impl LockError {
    /// Check if this error is a lock wait timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::Timeout { .. })
    }

    /// Get the contended key, if known.
    pub fn key(&self) -> Option<LockKey> {
        match self {
            LockError::Timeout { key, .. } => Some(*key),
            LockError::Poisoned => None,
        }
    }
}

impl From<LockError> for crate::Error {
    fn from(err: LockError) -> Self {
        crate::Error::Lock(err)
    }
}
