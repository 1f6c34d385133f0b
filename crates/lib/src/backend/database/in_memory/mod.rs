//! In-memory backend implementation
//!
//! This module provides an in-memory implementation of the [`Backend`] trait,
//! suitable for testing, development, or embedding where a real database is not
//! available. Tables are created on first insert and hold schemaless rows.

mod persistence;
mod storage;

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Result;
use crate::backend::{Backend, BackendTransaction};
use crate::lock::{LockKey, LockTable, OwnerId};
use crate::record::{Row, RowId};

use storage::InMemoryTransaction;

/// Committed rows of one table, keyed by primary key.
pub(crate) type Table = BTreeMap<RowId, Row>;

/// State shared by the backend and all of its open transactions.
#[derive(Debug)]
pub(crate) struct Shared {
    /// Committed tables
    pub(crate) tables: RwLock<HashMap<String, Table>>,
    /// Next generated primary key, shared by all tables
    pub(crate) next_id: AtomicI64,
    /// Source of transaction ids, used as lock owners
    next_owner: AtomicU64,
    /// Scope locks
    pub(crate) locks: LockTable,
    /// How long a transaction waits for a lock before failing
    pub(crate) lock_timeout: Option<Duration>,
}

impl Shared {
    fn new(tables: HashMap<String, Table>, lock_timeout: Option<Duration>) -> Self {
        let next_id = tables
            .values()
            .filter_map(|table| table.keys().next_back())
            .max()
            .map_or(1, |max| max + 1);
        Self {
            tables: RwLock::new(tables),
            next_id: AtomicI64::new(next_id),
            next_owner: AtomicU64::new(1),
            locks: LockTable::new(),
            lock_timeout,
        }
    }

    fn next_owner(&self) -> OwnerId {
        self.next_owner.fetch_add(1, Ordering::Relaxed)
    }
}

/// A simple in-memory store.
///
/// Each transaction buffers its writes privately and reads committed rows
/// merged with its own writes. Commit applies the buffer atomically. Scope
/// locks come from an in-process [`LockTable`], so two transactions on the same
/// `InMemory` exclude each other exactly like two database sessions would.
///
/// The committed state can be saved to and loaded from a JSON file with
/// [`InMemory::save_to_file`] and [`InMemory::load_from_file`].
#[derive(Debug, Clone)]
pub struct InMemory {
    shared: Arc<Shared>,
}

impl Default for InMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemory {
    /// Creates a new, empty store. Lock acquisition waits indefinitely.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new(HashMap::new(), None)),
        }
    }

    /// Creates a new, empty store whose transactions give up waiting for a
    /// scope lock after `timeout` with [`LockError::Timeout`](crate::lock::LockError::Timeout).
    pub fn with_lock_timeout(timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared::new(HashMap::new(), Some(timeout))),
        }
    }

    pub(crate) fn from_tables(tables: HashMap<String, Table>) -> Self {
        Self {
            shared: Arc::new(Shared::new(tables, None)),
        }
    }

    /// Names of the tables holding at least one committed row.
    pub async fn table_names(&self) -> Vec<String> {
        let tables = self.shared.tables.read().await;
        let mut names: Vec<String> = tables
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Committed rows of a table in primary key order.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        let tables = self.shared.tables.read().await;
        tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether any transaction currently holds the lock for `key`.
    pub fn is_locked(&self, key: LockKey) -> bool {
        self.shared.locks.holder(key).is_some()
    }

    /// Saves every committed table to a file as JSON.
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        persistence::save_to_file(self, path).await
    }

    /// Loads a store from a JSON file written by [`InMemory::save_to_file`].
    ///
    /// If the file does not exist, a new, empty store is returned.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        persistence::load_from_file(path).await
    }

    fn transaction(&self, read_only: bool) -> Box<dyn BackendTransaction> {
        let owner = self.shared.next_owner();
        tracing::trace!(owner, read_only, "Beginning in-memory transaction");
        Box::new(InMemoryTransaction::new(
            Arc::clone(&self.shared),
            owner,
            read_only,
        ))
    }
}

#[async_trait]
impl Backend for InMemory {
    async fn begin(&self) -> Result<Box<dyn BackendTransaction>> {
        Ok(self.transaction(false))
    }

    async fn begin_read(&self) -> Result<Box<dyn BackendTransaction>> {
        Ok(self.transaction(true))
    }

    fn label(&self) -> &'static str {
        "in-memory"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
