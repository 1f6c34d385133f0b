//! Constants used throughout the positioning library.
//!
//! Central definitions for default column names and the names of the bookkeeping
//! tables the SQL backend creates next to the application's own tables.

/// Default name of the position column when a declaration does not name one.
pub const DEFAULT_POSITION_COLUMN: &str = "position";

/// Default primary key column of an entity's table.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Namespace mixed into every lock key so keys never collide with advisory
/// locks taken by unrelated code on the same database.
pub const LOCK_NAMESPACE: &str = "positioning";

/// Table holding the schema version of the SQL bookkeeping tables.
pub const SCHEMA_VERSION_TABLE: &str = "positioning_schema_version";

/// Table holding one row per serialization point for emulated advisory locks.
pub const LOCKS_TABLE: &str = "positioning_locks";

/// Key of the serialization row every SQLite read-write transaction claims on begin.
pub const GLOBAL_LOCK_KEY: i64 = 0;
