//!
//! Entry point tying a storage backend to the positioning declarations.
//!
//! An [`Instance`] is a cheap-to-clone handle over an `Arc<dyn Backend>` and an
//! `Arc<Registry>`. Work happens in [`Transaction`]s obtained from
//! [`Instance::begin`]; the autocommit helpers run a single operation in its own
//! transaction and roll it back on error.

mod maintenance;

use std::fmt;
use std::sync::Arc;

pub use maintenance::{HealReport, ScopeReport};

use crate::Result;
use crate::backend::Backend;
use crate::config::Registry;
use crate::record::{Record, RowId};
use crate::transaction::Transaction;

/// Handle over a backend and the declarations that apply to it.
#[derive(Clone)]
pub struct Instance {
    backend: Arc<dyn Backend>,
    registry: Arc<Registry>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("backend", &self.backend.label())
            .field("registry", &self.registry)
            .finish()
    }
}

impl Instance {
    /// Creates an instance over `backend`. The registry is frozen from here on.
    pub fn new(backend: impl Backend + 'static, registry: Registry) -> Self {
        Self::from_parts(Arc::new(backend), Arc::new(registry))
    }

    /// Creates an instance from already shared parts.
    pub fn from_parts(backend: Arc<dyn Backend>, registry: Arc<Registry>) -> Self {
        tracing::debug!(backend = backend.label(), "Opened positioning instance");
        Self { backend, registry }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Starts a read-write transaction.
    pub async fn begin(&self) -> Result<Transaction> {
        let inner = self.backend.begin().await?;
        Ok(Transaction::new(inner, Arc::clone(&self.registry)))
    }

    /// Starts a read-only transaction.
    pub async fn begin_read(&self) -> Result<Transaction> {
        let inner = self.backend.begin_read().await?;
        Ok(Transaction::new(inner, Arc::clone(&self.registry)))
    }

    /// Inserts `record` in its own transaction.
    ///
    /// On error the record is left exactly as it was passed in.
    pub async fn create(&self, record: &mut Record) -> Result<()> {
        let snapshot = record.clone();
        let mut tx = self.begin().await?;
        let result = tx.create(record).await;
        restore_on_error(record, snapshot, finish(tx, result).await)
    }

    /// Saves the changes of `record` in its own transaction.
    pub async fn update(&self, record: &mut Record) -> Result<()> {
        let snapshot = record.clone();
        let mut tx = self.begin().await?;
        let result = tx.update(record).await;
        restore_on_error(record, snapshot, finish(tx, result).await)
    }

    /// Deletes `record` in its own transaction.
    pub async fn destroy(&self, record: &mut Record) -> Result<()> {
        let snapshot = record.clone();
        let mut tx = self.begin().await?;
        let result = tx.destroy(record).await;
        restore_on_error(record, snapshot, finish(tx, result).await)
    }

    pub async fn find(&self, entity: &str, id: RowId) -> Result<Option<Record>> {
        let mut tx = self.begin_read().await?;
        let result = tx.find(entity, id).await;
        tx.commit().await?;
        result
    }

    pub async fn prior(&self, record: &Record, column: &str) -> Result<Option<Record>> {
        let mut tx = self.begin_read().await?;
        let result = tx.prior(record, column).await;
        tx.commit().await?;
        result
    }

    pub async fn subsequent(&self, record: &Record, column: &str) -> Result<Option<Record>> {
        let mut tx = self.begin_read().await?;
        let result = tx.subsequent(record, column).await;
        tx.commit().await?;
        result
    }

    /// Every record in the scope of `record` for `column`, in order.
    pub async fn siblings(&self, record: &Record, column: &str) -> Result<Vec<Record>> {
        let mut tx = self.begin_read().await?;
        let result = tx.siblings(record, column).await;
        tx.commit().await?;
        result
    }
}

/// Commits on success, rolls back on failure.
async fn finish(tx: Transaction, result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => tx.commit().await,
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback after failed write also failed");
            }
            Err(err)
        }
    }
}

fn restore_on_error(record: &mut Record, snapshot: Record, result: Result<()>) -> Result<()> {
    if result.is_err() {
        *record = snapshot;
    }
    result
}
