//! Transactions of the in-memory store.
//!
//! A transaction never touches the committed tables until it commits. Writes
//! go to a per-table overlay and every read merges the committed table with
//! it. Updates stage only the columns they write, so committing never puts
//! back a column that another transaction changed in the meantime.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;

use super::{Shared, Table};
use crate::Result;
use crate::backend::errors::BackendError;
use crate::backend::{BackendTransaction, PositionRange, ScopeTarget, TableRef};
use crate::lock::{LockKey, OwnerId};
use crate::record::{Row, RowId, Scope, Value};

/// A pending write to one row.
#[derive(Debug, Clone)]
enum Staged {
    /// A row inserted by this transaction.
    Inserted(Row),
    /// Columns written over the committed row.
    Patched(Row),
    Deleted,
}

impl Staged {
    /// The row as this transaction sees it, given the committed one.
    fn apply(&self, committed: Option<&Row>) -> Option<Row> {
        match self {
            Staged::Inserted(row) => Some(row.clone()),
            Staged::Patched(patch) => committed.map(|row| {
                let mut row = row.clone();
                row.extend(patch.clone());
                row
            }),
            Staged::Deleted => None,
        }
    }

    /// Folds further column writes into this entry.
    fn patch(&mut self, changes: Row) {
        match self {
            Staged::Inserted(row) | Staged::Patched(row) => row.extend(changes),
            Staged::Deleted => {}
        }
    }
}

type Overlay = BTreeMap<RowId, Staged>;

pub(crate) struct InMemoryTransaction {
    shared: Arc<Shared>,
    owner: OwnerId,
    read_only: bool,
    writes: HashMap<String, Overlay>,
    finished: bool,
}

impl InMemoryTransaction {
    pub(crate) fn new(shared: Arc<Shared>, owner: OwnerId, read_only: bool) -> Self {
        Self {
            shared,
            owner,
            read_only,
            writes: HashMap::new(),
            finished: false,
        }
    }

    fn ensure_writable(&self, operation: &str) -> Result<()> {
        if self.read_only {
            return Err(BackendError::ReadOnlyTransaction {
                operation: operation.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// The table as this transaction sees it.
    async fn view(&self, table: &str) -> Table {
        let mut rows = {
            let tables = self.shared.tables.read().await;
            tables.get(table).cloned().unwrap_or_default()
        };
        if let Some(overlay) = self.writes.get(table) {
            for (id, staged) in overlay {
                match staged.apply(rows.get(id)) {
                    Some(row) => rows.insert(*id, row),
                    None => rows.remove(id),
                };
            }
        }
        rows
    }

    async fn scope_rows(&self, target: ScopeTarget<'_>) -> Vec<Row> {
        self.view(target.table.name)
            .await
            .into_values()
            .filter(|row| target.scope.contains(row))
            .collect()
    }

    fn stage(&mut self, table: &str, id: RowId, staged: Staged) {
        self.writes
            .entry(table.to_string())
            .or_default()
            .insert(id, staged);
    }

    /// Stages column writes on a row this transaction can see.
    fn stage_patch(&mut self, table: &str, id: RowId, changes: Row) {
        let overlay = self.writes.entry(table.to_string()).or_default();
        match overlay.get_mut(&id) {
            Some(staged) => staged.patch(changes),
            None => {
                overlay.insert(id, Staged::Patched(changes));
            }
        }
    }

    fn release_locks(&mut self) {
        self.finished = true;
        match self.shared.locks.release_all(self.owner) {
            Ok(0) => {}
            Ok(count) => tracing::trace!(owner = self.owner, count, "Released in-memory locks"),
            Err(e) => tracing::error!(owner = self.owner, error = %e, "Failed to release locks"),
        }
    }
}

fn position_of(row: &Row, column: &str) -> Option<i64> {
    row.get(column).and_then(Value::as_integer)
}

fn primary_key_of(row: &Row, primary_key: &str) -> RowId {
    position_of(row, primary_key).unwrap_or_default()
}

#[async_trait]
impl BackendTransaction for InMemoryTransaction {
    fn is_read_only(&self) -> bool {
        self.read_only
    }

    async fn acquire_lock(&mut self, key: LockKey) -> Result<()> {
        self.ensure_writable("acquire a lock")?;
        self.shared
            .locks
            .acquire(key, self.owner, self.shared.lock_timeout)
            .await?;
        Ok(())
    }

    async fn fetch(&mut self, table: TableRef<'_>, id: RowId) -> Result<Option<Row>> {
        let tables = self.shared.tables.read().await;
        let committed = tables.get(table.name).and_then(|rows| rows.get(&id));
        match self.writes.get(table.name).and_then(|overlay| overlay.get(&id)) {
            Some(staged) => Ok(staged.apply(committed)),
            None => Ok(committed.cloned()),
        }
    }

    async fn insert(&mut self, table: TableRef<'_>, row: &Row) -> Result<RowId> {
        self.ensure_writable("insert")?;
        let id = match position_of(row, table.primary_key) {
            Some(id) => {
                if self.fetch(table, id).await?.is_some() {
                    return Err(BackendError::RowExists {
                        table: table.name.to_string(),
                        id,
                    }
                    .into());
                }
                self.shared.next_id.fetch_max(id + 1, Ordering::Relaxed);
                id
            }
            None => self.shared.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let mut stored = row.clone();
        stored.insert(table.primary_key.to_string(), Value::Integer(id));
        self.stage(table.name, id, Staged::Inserted(stored));
        Ok(id)
    }

    async fn update(&mut self, table: TableRef<'_>, id: RowId, changes: &Row) -> Result<()> {
        self.ensure_writable("update")?;
        if self.fetch(table, id).await?.is_none() {
            return Err(BackendError::RowNotFound {
                table: table.name.to_string(),
                id,
            }
            .into());
        }
        let patch: Row = changes
            .iter()
            .filter(|(column, _)| column.as_str() != table.primary_key)
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect();
        self.stage_patch(table.name, id, patch);
        Ok(())
    }

    async fn delete(&mut self, table: TableRef<'_>, id: RowId) -> Result<()> {
        self.ensure_writable("delete")?;
        if self.fetch(table, id).await?.is_none() {
            return Err(BackendError::RowNotFound {
                table: table.name.to_string(),
                id,
            }
            .into());
        }
        self.stage(table.name, id, Staged::Deleted);
        Ok(())
    }

    async fn count(&mut self, target: ScopeTarget<'_>) -> Result<i64> {
        let positioned = self
            .scope_rows(target)
            .await
            .iter()
            .filter(|row| position_of(row, target.column).is_some())
            .count();
        Ok(positioned as i64)
    }

    async fn find_at(&mut self, target: ScopeTarget<'_>, position: i64) -> Result<Option<Row>> {
        Ok(self
            .scope_rows(target)
            .await
            .into_iter()
            .find(|row| position_of(row, target.column) == Some(position)))
    }

    async fn shift(
        &mut self,
        target: ScopeTarget<'_>,
        range: PositionRange,
        delta: i64,
    ) -> Result<u64> {
        self.ensure_writable("shift positions")?;
        if range.is_empty() || delta == 0 {
            return Ok(0);
        }

        let mut moved = 0;
        for row in self.scope_rows(target).await {
            let Some(position) = position_of(&row, target.column) else {
                continue;
            };
            if !range.contains(position) {
                continue;
            }
            let id = primary_key_of(&row, target.table.primary_key);
            let patch = Row::from([(target.column.to_string(), Value::Integer(position + delta))]);
            self.stage_patch(target.table.name, id, patch);
            moved += 1;
        }
        tracing::trace!(%target, %range, delta, moved, "Shifted in-memory positions");
        Ok(moved)
    }

    async fn rows_in_scope(&mut self, target: ScopeTarget<'_>) -> Result<Vec<Row>> {
        let mut rows = self.scope_rows(target).await;
        rows.sort_by_key(|row| {
            let position = position_of(row, target.column);
            (
                position.is_none(),
                position,
                primary_key_of(row, target.table.primary_key),
            )
        });
        Ok(rows)
    }

    async fn scopes(&mut self, table: TableRef<'_>, columns: &[String]) -> Result<Vec<Scope>> {
        let mut scopes: Vec<Scope> = self
            .view(table.name)
            .await
            .values()
            .map(|row| Scope::from_row(columns, row))
            .collect();
        scopes.sort();
        scopes.dedup();
        Ok(scopes)
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        if !self.writes.is_empty() {
            let mut tables = self.shared.tables.write().await;
            for (name, overlay) in std::mem::take(&mut self.writes) {
                let table = tables.entry(name).or_default();
                for (id, staged) in overlay {
                    // A row deleted by another transaction stays deleted.
                    match staged.apply(table.get(&id)) {
                        Some(row) => table.insert(id, row),
                        None => table.remove(&id),
                    };
                }
            }
        }
        self.release_locks();
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.writes.clear();
        self.release_locks();
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            if !self.writes.is_empty() {
                tracing::warn!(owner = self.owner, "In-memory transaction dropped without commit");
            }
            self.release_locks();
        }
    }
}
