//! Concrete backend implementations
//!
//! - [`InMemory`]: process-local tables, mostly for tests and embedding
//! - [`SqlxBackend`] (features `sqlite` / `postgres`): the application's own
//!   tables in SQLite or PostgreSQL

mod in_memory;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

pub use in_memory::InMemory;
#[cfg(feature = "postgres")]
pub use sql::Postgres;
#[cfg(feature = "sqlite")]
pub use sql::Sqlite;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use sql::{DbKind, LockStrategy, SqlxBackend};
