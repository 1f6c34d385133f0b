//! Position maintenance.
//!
//! [`Mechanism`] computes where a row goes and shifts its siblings to keep the
//! scope dense. It runs inside a transaction that already holds the lock of
//! every scope it touches; it never takes locks itself.
//!
//! For a scope of N rows:
//!
//! | operation        | valid slots  | siblings moved                          |
//! |------------------|--------------|-----------------------------------------|
//! | create at `p`    | `1..=N+1`    | `p..` up by one                         |
//! | move `o` to `n`  | `1..=N`      | `o+1..=n` down, or `n..=o-1` up         |
//! | scope change     | both scopes  | old scope `o+1..` down, then as create  |
//! | destroy at `k`   |              | `k+1..` down by one                     |

pub mod errors;

pub use errors::PositionError;

use crate::Result;
use crate::backend::{BackendTransaction, PositionRange, ScopeTarget, TableRef};
use crate::config::ScopeConfiguration;
use crate::record::{PositionRequest, Record, Row, RowId, Scope, Value};

/// Renumbering for one positioned column.
#[derive(Debug, Clone, Copy)]
pub struct Mechanism<'a> {
    config: &'a ScopeConfiguration,
}

impl<'a> Mechanism<'a> {
    pub fn new(config: &'a ScopeConfiguration) -> Self {
        Self { config }
    }

    fn table(&self) -> TableRef<'a> {
        TableRef::new(self.config.table(), self.config.primary_key())
    }

    fn target<'s>(&'s self, scope: &'s Scope) -> ScopeTarget<'s> {
        ScopeTarget::new(self.table(), self.config.column(), scope)
    }

    fn column(&self) -> &'a str {
        self.config.column()
    }

    /// The sibling right before the record, if any.
    pub async fn prior(&self, tx: &mut dyn BackendTransaction, record: &Record) -> Result<Option<Row>> {
        match record.position(self.column()) {
            Some(position) if position > 1 => {
                let scope = self.config.scope_of(record);
                tx.find_at(self.target(&scope), position - 1).await
            }
            _ => Ok(None),
        }
    }

    /// The sibling right after the record, if any.
    pub async fn subsequent(
        &self,
        tx: &mut dyn BackendTransaction,
        record: &Record,
    ) -> Result<Option<Row>> {
        match record.position(self.column()) {
            Some(position) => {
                let scope = self.config.scope_of(record);
                tx.find_at(self.target(&scope), position + 1).await
            }
            None => Ok(None),
        }
    }

    /// Places a record that is about to be inserted and opens its slot.
    ///
    /// Without a request the record goes last. Returns the assigned position.
    pub async fn create_position(
        &self,
        tx: &mut dyn BackendTransaction,
        record: &mut Record,
    ) -> Result<i64> {
        let scope = self.config.scope_of(record);
        let request = record
            .position_request(self.column())
            .unwrap_or(PositionRequest::Last);
        let position = self.insert_into(tx, &scope, &request).await?;
        record.assign_position(self.column(), position);
        Ok(position)
    }

    /// Moves a persisted record according to its pending changes.
    ///
    /// `stored` is the row as currently written, before this update. Returns
    /// the assigned position, or `None` when nothing had to move.
    pub async fn update_position(
        &self,
        tx: &mut dyn BackendTransaction,
        record: &mut Record,
        stored: &Row,
    ) -> Result<Option<i64>> {
        let column = self.column();
        let id = record.id().unwrap_or_default();
        let old_scope = self.config.scope_of_row(stored);
        let new_scope = self.config.scope_of(record);
        let old_position = stored.get(column).and_then(Value::as_integer);

        if old_scope != new_scope {
            if let Some(old) = old_position {
                self.move_out_of_the_way(tx, id).await?;
                tx.shift(self.target(&old_scope), PositionRange::from(old + 1), -1)
                    .await?;
            }
            let request = record
                .position_request(column)
                .unwrap_or(PositionRequest::Last);
            let position = self.insert_into(tx, &new_scope, &request).await?;
            tracing::debug!(
                id,
                column,
                from = %old_scope,
                to = %new_scope,
                position,
                "Moved row to another scope"
            );
            record.assign_position(column, position);
            return Ok(Some(position));
        }

        let Some(old) = old_position else {
            // An unpositioned row is inserted into its own scope.
            let request = record
                .position_request(column)
                .unwrap_or(PositionRequest::Last);
            let target = self.target(&new_scope);
            let last = tx.count(target).await? + 1;
            let position = self
                .solidify(tx, &new_scope, &request, None, last)
                .await?;
            tx.shift(target, PositionRange::from(position), 1).await?;
            record.assign_position(column, position);
            return Ok(Some(position));
        };

        let Some(request) = record.position_request(column) else {
            return Ok(None);
        };
        let target = self.target(&new_scope);
        let last = tx.count(target).await?;
        let new = self
            .solidify(tx, &new_scope, &request, Some(old), last)
            .await?;

        if new != old {
            self.move_out_of_the_way(tx, id).await?;
            if new > old {
                tx.shift(target, PositionRange::between(old + 1, new), -1)
                    .await?;
            } else {
                tx.shift(target, PositionRange::between(new, old - 1), 1)
                    .await?;
            }
            tracing::debug!(id, column, scope = %new_scope, from = old, to = new, "Moved row");
        }
        record.assign_position(column, new);
        Ok(Some(new))
    }

    /// Closes the slot of a row that was just deleted.
    pub async fn destroy_position(&self, tx: &mut dyn BackendTransaction, stored: &Row) -> Result<()> {
        let Some(position) = stored.get(self.column()).and_then(Value::as_integer) else {
            return Ok(());
        };
        let scope = self.config.scope_of_row(stored);
        let moved = tx
            .shift(self.target(&scope), PositionRange::from(position + 1), -1)
            .await?;
        tracing::debug!(column = self.column(), %scope, position, moved, "Closed gap");
        Ok(())
    }

    /// Resolves `request` for a row entering `scope` and shifts the siblings
    /// at and after the slot up by one.
    async fn insert_into(
        &self,
        tx: &mut dyn BackendTransaction,
        scope: &Scope,
        request: &PositionRequest,
    ) -> Result<i64> {
        let target = self.target(scope);
        let last = tx.count(target).await? + 1;
        let position = self.solidify(tx, scope, request, None, last).await?;
        tx.shift(target, PositionRange::from(position), 1).await?;
        Ok(position)
    }

    /// Turns a request into a slot in `1..=last`.
    ///
    /// `current` is the row's position when it already sits in `scope`; a
    /// relative target after it is one slot closer once the row leaves its
    /// current slot.
    async fn solidify(
        &self,
        tx: &mut dyn BackendTransaction,
        scope: &Scope,
        request: &PositionRequest,
        current: Option<i64>,
        last: i64,
    ) -> Result<i64> {
        let last = last.max(1);
        let position = match request {
            PositionRequest::At(position) => *position,
            PositionRequest::First | PositionRequest::After(None) => 1,
            PositionRequest::Last | PositionRequest::Before(None) => last,
            PositionRequest::Before(Some(id)) => {
                let target = self.sibling_position(tx, scope, *id).await?;
                match current {
                    Some(current) if current < target => target - 1,
                    _ => target,
                }
            }
            PositionRequest::After(Some(id)) => {
                let target = self.sibling_position(tx, scope, *id).await?;
                match current {
                    Some(current) if current < target => target,
                    _ => target + 1,
                }
            }
        };
        Ok(position.clamp(1, last))
    }

    async fn sibling_position(
        &self,
        tx: &mut dyn BackendTransaction,
        scope: &Scope,
        id: RowId,
    ) -> Result<i64> {
        let row = tx
            .fetch(self.table(), id)
            .await?
            .filter(|row| scope.contains(row))
            .ok_or_else(|| PositionError::RelativeRecordNotInScope {
                column: self.column().to_string(),
                id,
            })?;
        row.get(self.column())
            .and_then(Value::as_integer)
            .ok_or_else(|| {
                PositionError::RelativeRecordUnpositioned {
                    column: self.column().to_string(),
                    id,
                }
                .into()
            })
    }

    /// Parks the row on slot 0 so shifting its neighbours never collides with it.
    async fn move_out_of_the_way(&self, tx: &mut dyn BackendTransaction, id: RowId) -> Result<()> {
        let parked = Row::from([(self.column().to_string(), Value::Integer(0))]);
        tx.update(self.table(), id, &parked).await
    }
}
