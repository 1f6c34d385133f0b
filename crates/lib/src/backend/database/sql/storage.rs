//! Row and position operations for SQL backends.
//!
//! Statements are built at runtime against the application's tables:
//! identifiers are quoted, values are bound as parameters, and NULL is written
//! inline (`IS NULL` in predicates, `NULL` in assignments) so no statement ever
//! binds an untyped NULL.

use async_trait::async_trait;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, Column, Row as _, Transaction, TypeInfo, ValueRef};

use super::{DbKind, LockStrategy, SqlxResultExt, locks};
use crate::Result;
use crate::backend::errors::BackendError;
use crate::backend::{BackendTransaction, PositionRange, ScopeTarget, TableRef};
use crate::lock::LockKey;
use crate::record::{Row, RowId, Scope, Value};

/// Quotes an identifier, doubling embedded quotes.
pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// A statement under construction and its bound parameters.
#[derive(Debug, Default)]
struct Statement {
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Appends a placeholder bound to `value`.
    fn bind(&mut self, value: Value) -> &mut Self {
        self.params.push(value);
        let placeholder = format!("${}", self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Appends `"column" = $n`, or `"column" IS NULL`.
    fn push_equals(&mut self, column: &str, value: &Value) -> &mut Self {
        self.push(&quote(column));
        match value {
            Value::Null => self.push(" IS NULL"),
            value => self.push(" = ").bind(value.clone()),
        }
    }

    /// Appends the predicate matching every row of `scope`.
    fn push_scope(&mut self, scope: &Scope) -> &mut Self {
        if scope.is_global() {
            return self.push("1 = 1");
        }
        for (i, (column, value)) in scope.iter().enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            self.push_equals(column, value);
        }
        self
    }

    fn query(&self) -> Query<'_, Any, AnyArguments<'_>> {
        let mut query = sqlx::query(&self.sql);
        for param in &self.params {
            query = match param {
                Value::Integer(i) => query.bind(*i),
                Value::Text(s) => query.bind(s.clone()),
                // Never pushed by the builder; NULL is always written inline.
                Value::Null => query.bind(Option::<i64>::None),
            };
        }
        query
    }
}

fn decode_integer(row: &AnyRow, index: usize) -> std::result::Result<Option<i64>, sqlx::Error> {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return Ok(value);
    }
    if let Ok(value) = row.try_get::<Option<i32>, _>(index) {
        return Ok(value.map(i64::from));
    }
    row.try_get::<Option<i16>, _>(index)
        .map(|value| value.map(i64::from))
}

/// Converts a fetched row into a [`Row`].
///
/// Integer, text and boolean columns are kept. Columns of any other type
/// (REAL, timestamps, blobs) are left out: positioning never reads them, and
/// updates only write the columns a record changed, so they are never touched.
/// Key, scope and position columns must therefore be integer or text.
fn decode_row(table: &str, row: &AnyRow) -> Result<Row> {
    let mut decoded = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row
            .try_get_raw(index)
            .sql_context(&format!("Failed to read column {}", column.name()))?;
        let value = if raw.is_null() {
            Value::Null
        } else if let Ok(Some(i)) = decode_integer(row, index) {
            Value::Integer(i)
        } else if let Ok(s) = row.try_get::<String, _>(index) {
            Value::Text(s)
        } else if let Ok(b) = row.try_get::<bool, _>(index) {
            Value::Integer(i64::from(b))
        } else {
            tracing::trace!(
                table,
                column = column.name(),
                type_name = column.type_info().name(),
                "Skipping column of unrepresentable type"
            );
            continue;
        };
        decoded.insert(column.name().to_string(), value);
    }
    Ok(decoded)
}

fn decode_count(row: &AnyRow) -> Result<i64> {
    decode_integer(row, 0)
        .sql_context("Failed to decode count")
        .map(Option::unwrap_or_default)
}

pub(crate) struct SqlxTransaction {
    tx: Transaction<'static, Any>,
    kind: DbKind,
    lock_strategy: LockStrategy,
    read_only: bool,
}

impl SqlxTransaction {
    pub(crate) fn new(
        tx: Transaction<'static, Any>,
        kind: DbKind,
        lock_strategy: LockStrategy,
        read_only: bool,
    ) -> Self {
        Self {
            tx,
            kind,
            lock_strategy,
            read_only,
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

    async fn fetch_rows(&mut self, table: &str, statement: &Statement) -> Result<Vec<Row>> {
        let rows = statement
            .query()
            .fetch_all(&mut *self.tx)
            .await
            .sql_context(&format!("Failed to query {table}"))?;
        rows.iter().map(|row| decode_row(table, row)).collect()
    }

    async fn execute(&mut self, statement: &Statement, context: &str) -> Result<u64> {
        let result = statement
            .query()
            .execute(&mut *self.tx)
            .await
            .sql_context(context)?;
        Ok(result.rows_affected())
    }

    /// `SELECT * FROM table WHERE <scope>`, ready for more conditions.
    fn select_scope(target: ScopeTarget<'_>) -> Statement {
        let mut statement = Statement::new(format!(
            "SELECT * FROM {} WHERE ",
            quote(target.table.name)
        ));
        statement.push_scope(target.scope);
        statement
    }
}

#[async_trait]
impl BackendTransaction for SqlxTransaction {
    fn is_read_only(&self) -> bool {
        self.read_only
    }

    async fn acquire_lock(&mut self, key: LockKey) -> Result<()> {
        self.ensure_writable("acquire a lock")?;
        locks::acquire(&mut self.tx, self.lock_strategy, key).await?;
        tracing::trace!(%key, backend = self.kind.label(), "Acquired scope lock");
        Ok(())
    }

    async fn fetch(&mut self, table: TableRef<'_>, id: RowId) -> Result<Option<Row>> {
        let mut statement = Statement::new(format!("SELECT * FROM {} WHERE ", quote(table.name)));
        statement.push_equals(table.primary_key, &Value::Integer(id));
        Ok(self.fetch_rows(table.name, &statement).await?.into_iter().next())
    }

    async fn insert(&mut self, table: TableRef<'_>, row: &Row) -> Result<RowId> {
        self.ensure_writable("insert")?;
        let columns: Vec<(&String, &Value)> =
            row.iter().filter(|(_, value)| !value.is_null()).collect();

        let mut statement = Statement::new(format!("INSERT INTO {}", quote(table.name)));
        if columns.is_empty() {
            statement.push(" DEFAULT VALUES");
        } else {
            let names: Vec<String> = columns.iter().map(|(name, _)| quote(name)).collect();
            statement.push(&format!(" ({}) VALUES (", names.join(", ")));
            for (i, (_, value)) in columns.iter().enumerate() {
                if i > 0 {
                    statement.push(", ");
                }
                statement.bind((*value).clone());
            }
            statement.push(")");
        }
        statement.push(&format!(" RETURNING {}", quote(table.primary_key)));

        let inserted = statement
            .query()
            .fetch_one(&mut *self.tx)
            .await
            .sql_context(&format!("Failed to insert into {}", table.name))?;
        decode_integer(&inserted, 0)
            .sql_context("Failed to decode inserted primary key")?
            .ok_or_else(|| {
                BackendError::SqlxError {
                    reason: format!("Insert into {} returned no primary key", table.name),
                    source: None,
                }
                .into()
            })
    }

    async fn update(&mut self, table: TableRef<'_>, id: RowId, changes: &Row) -> Result<()> {
        self.ensure_writable("update")?;
        let assignments: Vec<(&String, &Value)> = changes
            .iter()
            .filter(|(column, _)| column.as_str() != table.primary_key)
            .collect();
        if assignments.is_empty() {
            return match self.fetch(table, id).await? {
                Some(_) => Ok(()),
                None => Err(BackendError::RowNotFound {
                    table: table.name.to_string(),
                    id,
                }
                .into()),
            };
        }

        let mut statement = Statement::new(format!("UPDATE {} SET ", quote(table.name)));
        for (i, (column, value)) in assignments.iter().enumerate() {
            if i > 0 {
                statement.push(", ");
            }
            statement.push(&quote(column)).push(" = ");
            match value {
                Value::Null => statement.push("NULL"),
                value => statement.bind((*value).clone()),
            };
        }
        statement.push(" WHERE ");
        statement.push_equals(table.primary_key, &Value::Integer(id));

        let context = format!("Failed to update {} {id}", table.name);
        if self.execute(&statement, &context).await? == 0 {
            return Err(BackendError::RowNotFound {
                table: table.name.to_string(),
                id,
            }
            .into());
        }
        Ok(())
    }

    async fn delete(&mut self, table: TableRef<'_>, id: RowId) -> Result<()> {
        self.ensure_writable("delete")?;
        let mut statement = Statement::new(format!("DELETE FROM {} WHERE ", quote(table.name)));
        statement.push_equals(table.primary_key, &Value::Integer(id));

        let context = format!("Failed to delete {} {id}", table.name);
        if self.execute(&statement, &context).await? == 0 {
            return Err(BackendError::RowNotFound {
                table: table.name.to_string(),
                id,
            }
            .into());
        }
        Ok(())
    }

    async fn count(&mut self, target: ScopeTarget<'_>) -> Result<i64> {
        let mut statement = Statement::new(format!(
            "SELECT COUNT({}) FROM {} WHERE ",
            quote(target.column),
            quote(target.table.name)
        ));
        statement.push_scope(target.scope);
        let row = statement
            .query()
            .fetch_one(&mut *self.tx)
            .await
            .sql_context(&format!("Failed to count {target}"))?;
        decode_count(&row)
    }

    async fn find_at(&mut self, target: ScopeTarget<'_>, position: i64) -> Result<Option<Row>> {
        let mut statement = Self::select_scope(target);
        statement
            .push(" AND ")
            .push_equals(target.column, &Value::Integer(position))
            .push(" LIMIT 1");
        Ok(self
            .fetch_rows(target.table.name, &statement)
            .await?
            .into_iter()
            .next())
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
        let table = quote(target.table.name);
        let column = quote(target.column);

        // Negate first so a unique index on (scope, position) never sees two
        // rows on the same slot, then restore with the delta applied.
        let mut negate = Statement::new(format!("UPDATE {table} SET {column} = {column} * -1 WHERE "));
        negate.push_scope(target.scope);
        negate
            .push(&format!(" AND {column} >= "))
            .bind(Value::Integer(range.start));
        if let Some(end) = range.end {
            negate
                .push(&format!(" AND {column} <= "))
                .bind(Value::Integer(end));
        }
        let moved = self
            .execute(&negate, &format!("Failed to shift {target}"))
            .await?;
        if moved == 0 {
            return Ok(0);
        }

        let mut restore = Statement::new(format!("UPDATE {table} SET {column} = {column} * -1 + "));
        restore.bind(Value::Integer(delta)).push(" WHERE ");
        restore.push_scope(target.scope);
        restore.push(&format!(" AND {column} < 0"));
        self.execute(&restore, &format!("Failed to shift {target}"))
            .await?;

        tracing::trace!(%target, %range, delta, moved, "Shifted positions");
        Ok(moved)
    }

    async fn rows_in_scope(&mut self, target: ScopeTarget<'_>) -> Result<Vec<Row>> {
        let column = quote(target.column);
        let mut statement = Self::select_scope(target);
        statement.push(&format!(
            " ORDER BY ({column} IS NULL), {column}, {}",
            quote(target.table.primary_key)
        ));
        self.fetch_rows(target.table.name, &statement).await
    }

    async fn scopes(&mut self, table: TableRef<'_>, columns: &[String]) -> Result<Vec<Scope>> {
        if columns.is_empty() {
            let statement = Statement::new(format!("SELECT 1 FROM {} LIMIT 1", quote(table.name)));
            let rows = statement
                .query()
                .fetch_all(&mut *self.tx)
                .await
                .sql_context(&format!("Failed to query {}", table.name))?;
            return Ok(if rows.is_empty() {
                Vec::new()
            } else {
                vec![Scope::default()]
            });
        }

        let names: Vec<String> = columns.iter().map(|column| quote(column)).collect();
        let statement = Statement::new(format!(
            "SELECT DISTINCT {} FROM {}",
            names.join(", "),
            quote(table.name)
        ));
        let mut scopes: Vec<Scope> = self
            .fetch_rows(table.name, &statement)
            .await?
            .iter()
            .map(|row| Scope::from_row(columns, row))
            .collect();
        scopes.sort();
        Ok(scopes)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .sql_context("Failed to commit transaction")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .sql_context("Failed to roll back transaction")
    }
}
