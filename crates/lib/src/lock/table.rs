//! In-process lock table.
//!
//! Emulates an advisory lock primitive for stores that have none: keys map to
//! the id of the owning transaction, and waiters park on a [`Notify`] until a
//! holder releases.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

use super::{LockError, LockKey};

/// Identifier of the transaction owning a lock.
pub type OwnerId = u64;

/// Keyed mutual exclusion with owner tracking.
///
/// Re-acquiring a key already owned by the same owner succeeds immediately.
#[derive(Debug, Default)]
pub struct LockTable {
    owners: Mutex<HashMap<LockKey, OwnerId>>,
    released: Notify,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `owner` holds `key`, or until `timeout` elapses.
    pub async fn acquire(
        &self,
        key: LockKey,
        owner: OwnerId,
        timeout: Option<Duration>,
    ) -> Result<(), LockError> {
        let wait = async {
            loop {
                let notified = self.released.notified();
                tokio::pin!(notified);
                // Register before checking so a release in between is not missed.
                notified.as_mut().enable();
                if self.try_acquire(key, owner)? {
                    return Ok(());
                }
                tracing::trace!(%key, owner, "Waiting for scope lock");
                notified.await;
            }
        };

        match timeout {
            Some(waited) => tokio::time::timeout(waited, wait)
                .await
                .map_err(|_| LockError::Timeout { key, waited })?,
            None => wait.await,
        }
    }

    /// Takes `key` for `owner` if it is free or already owned by `owner`.
    pub fn try_acquire(&self, key: LockKey, owner: OwnerId) -> Result<bool, LockError> {
        let mut owners = self.owners.lock().map_err(|_| LockError::Poisoned)?;
        match owners.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(owner);
                Ok(true)
            }
            Entry::Occupied(slot) => Ok(*slot.get() == owner),
        }
    }

    /// Releases every key held by `owner` and wakes all waiters.
    pub fn release_all(&self, owner: OwnerId) -> Result<usize, LockError> {
        let released = {
            let mut owners = self.owners.lock().map_err(|_| LockError::Poisoned)?;
            let before = owners.len();
            owners.retain(|_, holder| *holder != owner);
            before - owners.len()
        };
        if released > 0 {
            self.released.notify_waiters();
        }
        Ok(released)
    }

    /// The current owner of `key`.
    pub fn holder(&self, key: LockKey) -> Option<OwnerId> {
        self.owners.lock().ok()?.get(&key).copied()
    }
}
