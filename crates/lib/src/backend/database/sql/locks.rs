//! Scope locks on SQL stores.
//!
//! Both strategies tie the lock to the transaction, so it is released by the
//! database itself on commit, on rollback and when the connection dies.

use sqlx::AnyConnection;

use super::{DbKind, SqlxResultExt};
use crate::Result;
use crate::constants::{GLOBAL_LOCK_KEY, LOCKS_TABLE};
use crate::lock::LockKey;

/// The primitive used to take a scope lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStrategy {
    /// `pg_advisory_xact_lock` on the key (PostgreSQL only).
    Advisory,
    /// Upsert of the key's row in the locks table; the row lock is held until
    /// the transaction ends.
    SerializationRow,
}

impl LockStrategy {
    pub fn default_for(kind: DbKind) -> Self {
        match kind {
            DbKind::Postgres => LockStrategy::Advisory,
            DbKind::Sqlite => LockStrategy::SerializationRow,
        }
    }

    pub fn is_supported_by(&self, kind: DbKind) -> bool {
        match self {
            LockStrategy::Advisory => kind == DbKind::Postgres,
            LockStrategy::SerializationRow => true,
        }
    }
}

/// Blocks until the connection's transaction holds `key`.
pub(crate) async fn acquire(
    conn: &mut AnyConnection,
    strategy: LockStrategy,
    key: LockKey,
) -> Result<()> {
    match strategy {
        LockStrategy::Advisory => {
            sqlx::query("SELECT 1 FROM pg_advisory_xact_lock($1)")
                .bind(key.as_i64())
                .execute(conn)
                .await
                .sql_context(&format!("Failed to acquire advisory lock {key}"))?;
        }
        LockStrategy::SerializationRow => upsert(conn, key.as_i64()).await?,
    }
    Ok(())
}

/// Takes SQLite's database write lock by writing the global serialization row.
pub(crate) async fn claim_global(conn: &mut AnyConnection) -> Result<()> {
    upsert(conn, GLOBAL_LOCK_KEY).await
}

async fn upsert(conn: &mut AnyConnection, key: i64) -> Result<()> {
    let sql = format!(
        "INSERT INTO {LOCKS_TABLE} (lock_key) VALUES ($1) \
         ON CONFLICT (lock_key) DO UPDATE SET lock_key = excluded.lock_key"
    );
    sqlx::query(&sql)
        .bind(key)
        .execute(conn)
        .await
        .sql_context(&format!("Failed to lock serialization row {key}"))?;
    Ok(())
}
