//! Scope locks.
//!
//! Every write that can change the ordering of a scope first takes that scope's
//! lock, and holds it until the enclosing transaction commits or rolls back. At
//! most one transaction renumbers a given scope at a time.
//!
//! A [`LockKey`] identifies a scope of a positioned column. The actual blocking
//! primitive belongs to the backend transaction
//! ([`BackendTransaction::acquire_lock`]): a native advisory lock where the store
//! has one, or an emulation (the in-process [`LockTable`], or a serialization row
//! in SQL stores). [`AdvisoryLock`] tracks which keys a transaction holds so that
//! repeated acquisition within one transaction is a no-op.

pub mod errors;
mod table;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use errors::LockError;
pub use table::{LockTable, OwnerId};

use crate::Result;
use crate::backend::BackendTransaction;
use crate::constants::LOCK_NAMESPACE;
use crate::record::{Scope, Value};

/// Stable 64-bit key of one scope of one positioned column.
///
/// Derived from a SHA-256 digest over a length-prefixed encoding of the entity
/// type, the column and the ordered scope values, so tuples that differ in any
/// value (or only in how values split across columns) get different keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockKey(i64);

impl LockKey {
    pub fn derive(entity: &str, column: &str, scope: &Scope) -> Self {
        let mut hasher = Sha256::new();
        write_part(&mut hasher, LOCK_NAMESPACE.as_bytes());
        write_part(&mut hasher, entity.as_bytes());
        write_part(&mut hasher, column.as_bytes());
        for (name, value) in scope.iter() {
            write_part(&mut hasher, name.as_bytes());
            match value {
                Value::Null => hasher.update([0u8]),
                Value::Integer(i) => {
                    hasher.update([1u8]);
                    hasher.update(i.to_be_bytes());
                }
                Value::Text(s) => {
                    hasher.update([2u8]);
                    write_part(&mut hasher, s.as_bytes());
                }
            }
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self(i64::from_be_bytes(bytes))
    }

    /// Wraps a raw key, e.g. one read back from a lock table.
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw value, as passed to `pg_advisory_xact_lock`.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

fn write_part(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// The scope locks held by one transaction.
///
/// Keys are acquired in ascending order within each call, so two transactions
/// that each need several scopes (a cross-scope move) request them in the same
/// order. Acquiring a key the transaction already holds is a no-op.
#[derive(Debug, Default)]
pub struct AdvisoryLock {
    held: BTreeSet<LockKey>,
}

impl AdvisoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the transaction holds every key in `keys`.
    pub async fn acquire<I>(&mut self, tx: &mut dyn BackendTransaction, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = LockKey>,
    {
        let pending: BTreeSet<LockKey> = keys
            .into_iter()
            .filter(|key| !self.held.contains(key))
            .collect();

        for key in pending {
            tracing::debug!(%key, "Acquiring scope lock");
            tx.acquire_lock(key).await?;
            self.held.insert(key);
        }
        Ok(())
    }

    pub fn holds(&self, key: LockKey) -> bool {
        self.held.contains(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn held(&self) -> impl Iterator<Item = LockKey> + '_ {
        self.held.iter().copied()
    }

    /// Forgets every held key once the transaction has finished.
    ///
    /// The backend frees the underlying locks as part of commit or rollback;
    /// this runs once per outcome and returns how many keys were held.
    pub fn release(&mut self) -> usize {
        let count = self.held.len();
        if count > 0 {
            tracing::debug!(count, "Released scope locks");
        }
        self.held.clear();
        count
    }
}
