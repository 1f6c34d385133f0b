//! Checking and repairing the arrangement of stored scopes.
//!
//! Rows written outside the lifecycle (bulk imports, manual SQL) can leave a
//! scope with gaps, duplicates or NULL positions. [`Instance::verify`] reports
//! them and [`Instance::heal`] renumbers each scope back to `1..=N`.

use std::collections::BTreeMap;

use serde::Serialize;

use super::Instance;
use crate::Result;
use crate::backend::{ScopeTarget, TableRef};
use crate::config::ScopeConfiguration;
use crate::record::{Row, RowId, Scope, Value};

/// The state of one scope of a positioned column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeReport {
    pub scope: Scope,
    /// Rows in the scope.
    pub count: usize,
    /// Slots in `1..=count` that no row occupies.
    pub gaps: Vec<i64>,
    /// Positions held by more than one row.
    pub duplicates: Vec<i64>,
    /// Rows with a NULL position.
    pub unpositioned: usize,
}

impl ScopeReport {
    fn from_rows(scope: Scope, column: &str, rows: &[Row]) -> Self {
        let mut occupancy: BTreeMap<i64, usize> = BTreeMap::new();
        let mut unpositioned = 0;
        for row in rows {
            match row.get(column).and_then(Value::as_integer) {
                Some(position) => *occupancy.entry(position).or_default() += 1,
                None => unpositioned += 1,
            }
        }

        let count = rows.len();
        let gaps = (1..=count as i64)
            .filter(|slot| !occupancy.contains_key(slot))
            .collect();
        let duplicates = occupancy
            .iter()
            .filter(|(_, rows)| **rows > 1)
            .map(|(position, _)| *position)
            .collect();

        Self {
            scope,
            count,
            gaps,
            duplicates,
            unpositioned,
        }
    }

    /// Whether the positions are exactly `1..=count`.
    pub fn is_dense(&self) -> bool {
        self.gaps.is_empty() && self.duplicates.is_empty() && self.unpositioned == 0
    }
}

/// Outcome of healing one positioned column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealReport {
    pub entity: String,
    pub column: String,
    /// Scopes visited.
    pub scopes: usize,
    /// Rows visited.
    pub rows: usize,
    /// Rows whose position was rewritten.
    pub renumbered: usize,
}

impl Instance {
    /// Reports the arrangement of every scope of `column` on `entity`.
    pub async fn verify(&self, entity: &str, column: &str) -> Result<Vec<ScopeReport>> {
        let config = self.registry.configuration(entity, column)?;
        let mut tx = self.begin_read().await?;
        let result = async {
            let scopes = tx
                .backend_transaction()
                .scopes(table_of(config), config.scope_columns())
                .await?;
            let mut reports = Vec::with_capacity(scopes.len());
            for scope in scopes {
                let rows = tx
                    .backend_transaction()
                    .rows_in_scope(ScopeTarget::new(table_of(config), config.column(), &scope))
                    .await?;
                reports.push(ScopeReport::from_rows(scope, config.column(), &rows));
            }
            Ok::<_, crate::Error>(reports)
        }
        .await;
        tx.commit().await?;
        result
    }

    /// Renumbers every scope of `column` on `entity` to `1..=N`, keeping the
    /// current order (position, then primary key, NULL positions last).
    ///
    /// Each scope is healed in its own transaction under its lock. Only rows
    /// whose position changes are written, first to a negative slot and then to
    /// the final one, so a unique index on the position never sees a duplicate.
    pub async fn heal(&self, entity: &str, column: &str) -> Result<HealReport> {
        let config = self.registry.configuration(entity, column)?;
        let mut report = HealReport {
            entity: config.entity().to_string(),
            column: config.column().to_string(),
            ..HealReport::default()
        };

        let scopes = {
            let mut tx = self.begin_read().await?;
            let scopes = tx
                .backend_transaction()
                .scopes(table_of(config), config.scope_columns())
                .await;
            tx.commit().await?;
            scopes?
        };

        for scope in scopes {
            let mut tx = self.begin().await?;
            match heal_scope(&mut tx, config, &scope).await {
                Ok((rows, renumbered)) => {
                    tx.commit().await?;
                    report.scopes += 1;
                    report.rows += rows;
                    report.renumbered += renumbered;
                    if renumbered > 0 {
                        tracing::info!(%scope, column = config.column(), renumbered, "Healed scope");
                    }
                }
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::warn!(error = %rollback_err, "Rollback after failed heal also failed");
                    }
                    return Err(err);
                }
            }
        }

        tracing::info!(
            entity = %report.entity,
            column = %report.column,
            scopes = report.scopes,
            renumbered = report.renumbered,
            "Heal finished"
        );
        Ok(report)
    }
}

fn table_of(config: &ScopeConfiguration) -> TableRef<'_> {
    TableRef::new(config.table(), config.primary_key())
}

/// Returns (rows visited, rows rewritten).
async fn heal_scope(
    tx: &mut crate::transaction::Transaction,
    config: &ScopeConfiguration,
    scope: &Scope,
) -> Result<(usize, usize)> {
    tx.lock_scope(config, scope).await?;
    let table = table_of(config);
    let inner = tx.backend_transaction();
    let rows = inner
        .rows_in_scope(ScopeTarget::new(table, config.column(), scope))
        .await?;

    let moves: Vec<(RowId, i64)> = rows
        .iter()
        .zip(1i64..)
        .filter(|(row, slot)| row.get(config.column()).and_then(Value::as_integer) != Some(*slot))
        .filter_map(|(row, slot)| {
            row.get(config.primary_key())
                .and_then(Value::as_integer)
                .map(|id| (id, slot))
        })
        .collect();

    for (id, slot) in &moves {
        let parked = Row::from([(config.column().to_string(), Value::Integer(-slot))]);
        inner.update(table, *id, &parked).await?;
    }
    for (id, slot) in &moves {
        let placed = Row::from([(config.column().to_string(), Value::Integer(*slot))]);
        inner.update(table, *id, &placed).await?;
    }
    Ok((rows.len(), moves.len()))
}
