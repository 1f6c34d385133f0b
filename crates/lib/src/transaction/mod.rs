//! Lifecycle integration.
//!
//! A [`Transaction`] wraps one backend transaction and runs the positioning
//! hooks around every write made through it:
//!
//! - `create`: lock every configured scope of the record, place it, insert
//! - `update`: lock the stored and the new scopes of every column whose
//!   position or scope changed, renumber, write the changed attributes
//! - `destroy`: lock the stored scopes, delete, close the gaps
//! - `commit` / `rollback`: finish the backend transaction, which frees the locks
//!
//! Locks are held until the transaction finishes, so no other transaction can
//! observe or interleave with a half-done renumbering.

pub mod errors;

use std::fmt;
use std::sync::Arc;

pub use errors::TransactionError;

use crate::Result;
use crate::backend::{BackendTransaction, ScopeTarget, TableRef};
use crate::config::{Registry, ScopeConfiguration, StorageIdentity};
use crate::lock::{AdvisoryLock, LockKey};
use crate::mechanism::Mechanism;
use crate::record::{Record, Row, RowId, Scope, Value};

/// How often `update` and `destroy` re-read a row whose scope moved while its
/// locks were being taken.
const MAX_LOCK_ATTEMPTS: usize = 8;

/// Where a mutating transaction is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No scope lock taken yet.
    Idle,
    /// At least one scope lock is held.
    LockAcquired,
    /// Positions have been written.
    Renumbering,
    Committed,
    RolledBack,
    /// The transaction finished and its locks are gone.
    LockReleased,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Idle => "idle",
            TransactionState::LockAcquired => "lock acquired",
            TransactionState::Renumbering => "renumbering",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
            TransactionState::LockReleased => "lock released",
        };
        f.write_str(name)
    }
}

/// Warns if a transaction that wrote something is dropped unfinished.
///
/// The backend rolls such a transaction back and frees its locks on its own.
#[derive(Debug, Default)]
struct FinishGuard {
    armed: bool,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("Transaction dropped without commit or rollback; rolling back");
        }
    }
}

/// A unit of work against a backend with positioning maintained on every write.
pub struct Transaction {
    inner: Box<dyn BackendTransaction>,
    registry: Arc<Registry>,
    lock: AdvisoryLock,
    state: TransactionState,
    guard: FinishGuard,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .field("read_only", &self.inner.is_read_only())
            .field("lock", &self.lock)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub(crate) fn new(inner: Box<dyn BackendTransaction>, registry: Arc<Registry>) -> Self {
        Self {
            inner,
            registry,
            lock: AdvisoryLock::new(),
            state: TransactionState::Idle,
            guard: FinishGuard::default(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Scope locks held so far.
    pub fn held_locks(&self) -> impl Iterator<Item = LockKey> + '_ {
        self.lock.held()
    }

    /// Direct access to the backend transaction, for reads the lifecycle
    /// does not cover. Writes made through it bypass positioning.
    pub fn backend_transaction(&mut self) -> &mut dyn BackendTransaction {
        self.inner.as_mut()
    }

    fn transition(&mut self, next: TransactionState) {
        if self.state != next {
            tracing::trace!(from = %self.state, to = %next, "Transaction state");
            self.state = next;
        }
    }

    fn ensure_writable(&self, operation: &str) -> Result<()> {
        if self.inner.is_read_only() {
            return Err(TransactionError::ReadOnly {
                operation: operation.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn require_persisted(record: &Record) -> Result<RowId> {
        if record.is_destroyed() {
            return Err(TransactionError::RecordDestroyed {
                entity: record.entity().to_string(),
                id: record.id().unwrap_or_default(),
            }
            .into());
        }
        record.id().ok_or_else(|| {
            TransactionError::NotPersisted {
                entity: record.entity().to_string(),
            }
            .into()
        })
    }

    async fn acquire<I>(&mut self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = LockKey>,
    {
        self.lock.acquire(self.inner.as_mut(), keys).await?;
        self.guard.armed = true;
        if self.state == TransactionState::Idle && !self.lock.is_empty() {
            self.transition(TransactionState::LockAcquired);
        }
        Ok(())
    }

    /// Takes the lock of one scope of a positioned column, for work that
    /// rewrites positions directly (such as healing).
    pub async fn lock_scope(&mut self, config: &ScopeConfiguration, scope: &Scope) -> Result<()> {
        self.ensure_writable("lock a scope")?;
        self.acquire([config.lock_key(scope)]).await
    }

    /// Reads the stored row and locks its scopes (and the scopes `record`
    /// moves to, if given), re-reading until the stored scopes are covered.
    async fn lock_stored(
        &mut self,
        table: TableRef<'_>,
        configs: &[&ScopeConfiguration],
        entity: &str,
        id: RowId,
        record: Option<&Record>,
    ) -> Result<Row> {
        for _ in 0..MAX_LOCK_ATTEMPTS {
            let stored = self.inner.fetch(table, id).await?.ok_or_else(|| {
                TransactionError::RecordNotFound {
                    entity: entity.to_string(),
                    id,
                }
            })?;

            let mut keys: Vec<LockKey> = configs
                .iter()
                .map(|config| config.lock_key(&config.scope_of_row(&stored)))
                .collect();
            if let Some(record) = record {
                keys.extend(
                    configs
                        .iter()
                        .map(|config| config.lock_key(&config.scope_of(record))),
                );
            }

            if keys.iter().all(|key| self.lock.holds(*key)) {
                return Ok(stored);
            }
            self.acquire(keys).await?;
        }
        Err(TransactionError::ScopeUnstable {
            entity: entity.to_string(),
            id,
            attempts: MAX_LOCK_ATTEMPTS,
        }
        .into())
    }

    /// Inserts a new record, placing it in every positioned column.
    pub async fn create(&mut self, record: &mut Record) -> Result<()> {
        self.ensure_writable("create")?;
        if let Some(id) = record.id() {
            return Err(TransactionError::AlreadyPersisted {
                entity: record.entity().to_string(),
                id,
            }
            .into());
        }

        let registry = Arc::clone(&self.registry);
        let entity_type = registry.entity(record.entity())?;
        if let StorageIdentity::Inherited { discriminator, .. } = entity_type.identity()
            && record.get(discriminator).is_null()
        {
            record.set(discriminator.clone(), entity_type.name().to_string());
        }
        let storage = registry.storage_entity(record.entity())?;
        let table = TableRef::new(storage.table_name(), storage.primary_key_column());
        let configs = registry.configurations(record.entity())?;

        self.acquire(
            configs
                .iter()
                .map(|config| config.lock_key(&config.scope_of(record))),
        )
        .await?;

        if !configs.is_empty() {
            self.transition(TransactionState::Renumbering);
        }
        for config in &configs {
            Mechanism::new(config)
                .create_position(self.inner.as_mut(), record)
                .await?;
        }

        let id = self
            .inner
            .insert(table, &record.insert_row(table.primary_key))
            .await?;
        self.guard.armed = true;
        record.mark_persisted(table.primary_key, id);
        tracing::debug!(entity = record.entity(), id, "Created record");
        Ok(())
    }

    /// Writes the record's changed attributes, renumbering every positioned
    /// column whose position or scope changed.
    pub async fn update(&mut self, record: &mut Record) -> Result<()> {
        self.ensure_writable("update")?;
        let id = Self::require_persisted(record)?;
        if record.changed().next().is_none() {
            return Ok(());
        }

        let registry = Arc::clone(&self.registry);
        let storage = registry.storage_entity(record.entity())?;
        let table = TableRef::new(storage.table_name(), storage.primary_key_column());
        let touched: Vec<&ScopeConfiguration> = registry
            .configurations(record.entity())?
            .into_iter()
            .filter(|config| config.affects_ordering(record))
            .collect();

        if !touched.is_empty() {
            let entity = record.entity().to_string();
            let stored = self
                .lock_stored(table, &touched, &entity, id, Some(&*record))
                .await?;
            self.transition(TransactionState::Renumbering);
            for config in &touched {
                Mechanism::new(config)
                    .update_position(self.inner.as_mut(), record, &stored)
                    .await?;
            }
        }

        let changes = record.changes();
        self.inner.update(table, id, &changes).await?;
        self.guard.armed = true;
        record.mark_persisted(table.primary_key, id);
        tracing::debug!(entity = record.entity(), id, columns = changes.len(), "Updated record");
        Ok(())
    }

    /// Deletes the record and closes its slot in every positioned column.
    pub async fn destroy(&mut self, record: &mut Record) -> Result<()> {
        self.ensure_writable("destroy")?;
        let id = Self::require_persisted(record)?;

        let registry = Arc::clone(&self.registry);
        let storage = registry.storage_entity(record.entity())?;
        let table = TableRef::new(storage.table_name(), storage.primary_key_column());
        let configs = registry.configurations(record.entity())?;

        let entity = record.entity().to_string();
        let stored = self.lock_stored(table, &configs, &entity, id, None).await?;
        self.inner.delete(table, id).await?;
        self.guard.armed = true;

        if !configs.is_empty() {
            self.transition(TransactionState::Renumbering);
        }
        for config in &configs {
            Mechanism::new(config)
                .destroy_position(self.inner.as_mut(), &stored)
                .await?;
        }
        record.mark_destroyed();
        tracing::debug!(entity = %entity, id, "Destroyed record");
        Ok(())
    }

    /// Loads a record by primary key.
    pub async fn find(&mut self, entity: &str, id: RowId) -> Result<Option<Record>> {
        let registry = Arc::clone(&self.registry);
        let storage = registry.storage_entity(entity)?;
        let table = TableRef::new(storage.table_name(), storage.primary_key_column());
        Ok(self.inner.fetch(table, id).await?.map(|row| {
            let entity = registry.entity_of_row(storage.name(), &row).to_string();
            Record::from_row(entity, id, row)
        }))
    }

    /// The sibling right before `record` in `column`.
    pub async fn prior(&mut self, record: &Record, column: &str) -> Result<Option<Record>> {
        let registry = Arc::clone(&self.registry);
        let config = registry.configuration(record.entity(), column)?;
        let row = Mechanism::new(config)
            .prior(self.inner.as_mut(), record)
            .await?;
        Ok(row.map(|row| to_record(&registry, config, row)))
    }

    /// The sibling right after `record` in `column`.
    pub async fn subsequent(&mut self, record: &Record, column: &str) -> Result<Option<Record>> {
        let registry = Arc::clone(&self.registry);
        let config = registry.configuration(record.entity(), column)?;
        let row = Mechanism::new(config)
            .subsequent(self.inner.as_mut(), record)
            .await?;
        Ok(row.map(|row| to_record(&registry, config, row)))
    }

    /// Every record in the scope of `record` for `column`, in order.
    pub async fn siblings(&mut self, record: &Record, column: &str) -> Result<Vec<Record>> {
        let registry = Arc::clone(&self.registry);
        let config = registry.configuration(record.entity(), column)?;
        let scope = config.scope_of(record);
        let target = ScopeTarget::new(
            TableRef::new(config.table(), config.primary_key()),
            config.column(),
            &scope,
        );
        let rows = self.inner.rows_in_scope(target).await?;
        Ok(rows
            .into_iter()
            .map(|row| to_record(&registry, config, row))
            .collect())
    }

    /// Commits the backend transaction, releasing every scope lock.
    pub async fn commit(mut self) -> Result<()> {
        self.guard.armed = false;
        self.transition(TransactionState::Committed);
        let result = self.inner.commit().await;
        self.lock.release();
        tracing::trace!(to = %TransactionState::LockReleased, "Transaction state");
        result
    }

    /// Rolls the backend transaction back, releasing every scope lock.
    pub async fn rollback(mut self) -> Result<()> {
        self.guard.armed = false;
        self.transition(TransactionState::RolledBack);
        let result = self.inner.rollback().await;
        self.lock.release();
        tracing::trace!(to = %TransactionState::LockReleased, "Transaction state");
        result
    }
}

fn to_record(registry: &Registry, config: &ScopeConfiguration, row: Row) -> Record {
    let id = row
        .get(config.primary_key())
        .and_then(Value::as_integer)
        .unwrap_or_default();
    let entity = registry.entity_of_row(config.entity(), &row).to_string();
    Record::from_row(entity, id, row)
}
