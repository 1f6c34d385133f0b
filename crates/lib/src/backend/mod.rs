//! Storage backends.
//!
//! This module defines the interface the positioning core needs from a
//! transactional relational store, and the implementations shipped with the
//! crate (see [`database`]).
//!
//! The core never talks to a store directly: every read and write goes through a
//! [`BackendTransaction`], and every ordering-relevant write happens while the
//! transaction holds the scope's lock (see [`crate::lock`]). Implementations
//! decide how the lock blocks and how isolation is provided, but they must all
//! guarantee that:
//!
//! - reads inside a transaction see committed data plus the transaction's own writes
//! - nothing written by a transaction is visible to others before it commits
//! - commit and rollback release every lock the transaction acquired, and dropping
//!   an unfinished transaction behaves like a rollback

pub mod database;
pub mod errors;

use std::any::Any;
use std::fmt;
use std::ops::RangeInclusive;

use async_trait::async_trait;

pub use errors::BackendError;

use crate::Result;
use crate::lock::LockKey;
use crate::record::{Row, RowId, Scope};

/// A table and its primary key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRef<'a> {
    pub name: &'a str,
    pub primary_key: &'a str,
}

impl<'a> TableRef<'a> {
    pub fn new(name: &'a str, primary_key: &'a str) -> Self {
        Self { name, primary_key }
    }
}

/// One scope of one position column of a table: the unit renumbering works on.
#[derive(Debug, Clone, Copy)]
pub struct ScopeTarget<'a> {
    pub table: TableRef<'a>,
    pub column: &'a str,
    pub scope: &'a Scope,
}

impl<'a> ScopeTarget<'a> {
    pub fn new(table: TableRef<'a>, column: &'a str, scope: &'a Scope) -> Self {
        Self {
            table,
            column,
            scope,
        }
    }
}

impl fmt::Display for ScopeTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.table.name, self.column, self.scope)
    }
}

/// An inclusive range of positions, open-ended when `end` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRange {
    pub start: i64,
    pub end: Option<i64>,
}

impl PositionRange {
    /// `start..` (every position from `start` up).
    pub fn from(start: i64) -> Self {
        Self { start, end: None }
    }

    /// `start..=end`.
    pub fn between(start: i64, end: i64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn contains(&self, position: i64) -> bool {
        position >= self.start && self.end.is_none_or(|end| position <= end)
    }

    pub fn is_empty(&self) -> bool {
        self.end.is_some_and(|end| end < self.start)
    }
}

impl From<RangeInclusive<i64>> for PositionRange {
    fn from(range: RangeInclusive<i64>) -> Self {
        Self::between(*range.start(), *range.end())
    }
}

impl fmt::Display for PositionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {}]", self.start, end),
            None => write!(f, "[{}, ..)", self.start),
        }
    }
}

/// A transactional relational store.
///
/// All implementations must be `Send` and `Sync` so one backend can be shared by
/// concurrent transactions, and implement `Any` to allow downcasting to the
/// concrete type (e.g. to persist an in-memory store on shutdown).
#[async_trait]
pub trait Backend: Send + Sync + Any {
    /// Starts a read-write transaction.
    async fn begin(&self) -> Result<Box<dyn BackendTransaction>>;

    /// Starts a transaction that only reads. Writes and lock acquisition are
    /// rejected with [`BackendError::ReadOnlyTransaction`].
    async fn begin_read(&self) -> Result<Box<dyn BackendTransaction>>;

    /// Short human-readable description, e.g. `"in-memory"` or `"sqlite"`.
    fn label(&self) -> &'static str;

    /// Returns a reference to the backend instance as a dynamic `Any` type.
    fn as_any(&self) -> &dyn Any;
}

/// One open transaction against a [`Backend`].
///
/// Positions passed to and returned from these methods are plain integers in
/// the named column; scopes are matched with NULL equal to NULL.
#[async_trait]
pub trait BackendTransaction: Send {
    /// Whether this transaction rejects writes.
    fn is_read_only(&self) -> bool;

    /// Blocks until this transaction holds the lock for `key`.
    ///
    /// Acquiring a key already held by this transaction returns immediately.
    /// The lock is held until commit or rollback.
    async fn acquire_lock(&mut self, key: LockKey) -> Result<()>;

    /// Reads a row by primary key.
    async fn fetch(&mut self, table: TableRef<'_>, id: RowId) -> Result<Option<Row>>;

    /// Inserts a row and returns its new primary key.
    async fn insert(&mut self, table: TableRef<'_>, row: &Row) -> Result<RowId>;

    /// Writes the given columns of an existing row.
    async fn update(&mut self, table: TableRef<'_>, id: RowId, changes: &Row) -> Result<()>;

    /// Deletes a row. Deleting a missing row is an error.
    async fn delete(&mut self, table: TableRef<'_>, id: RowId) -> Result<()>;

    /// Number of rows of the scope holding a position. Rows whose position is
    /// NULL are in the scope but occupy no slot.
    async fn count(&mut self, target: ScopeTarget<'_>) -> Result<i64>;

    /// The row of the scope at `position`, if any.
    async fn find_at(&mut self, target: ScopeTarget<'_>, position: i64) -> Result<Option<Row>>;

    /// Adds `delta` to every position of the scope inside `range`, returning the
    /// number of rows moved.
    ///
    /// Implementations backed by stores with unique indexes on (scope, position)
    /// must never produce an intermediate duplicate.
    async fn shift(
        &mut self,
        target: ScopeTarget<'_>,
        range: PositionRange,
        delta: i64,
    ) -> Result<u64>;

    /// Every row of the scope, ordered by position then primary key, rows
    /// without a position last.
    async fn rows_in_scope(&mut self, target: ScopeTarget<'_>) -> Result<Vec<Row>>;

    /// The distinct scopes present in a table, over the given columns.
    async fn scopes(&mut self, table: TableRef<'_>, columns: &[String]) -> Result<Vec<Scope>>;

    /// Makes every write of this transaction visible and releases its locks.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every write of this transaction and releases its locks.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
