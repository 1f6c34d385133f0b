//! Bookkeeping tables kept beside the application's tables.
//!
//! The same DDL runs on SQLite and PostgreSQL. Upgrades are Rust functions,
//! one per version step, dispatched from [`step`]; bump [`SCHEMA_VERSION`]
//! together with a new arm there.

use crate::Result;
use crate::backend::errors::BackendError;
use crate::constants::{LOCKS_TABLE, SCHEMA_VERSION_TABLE};

use super::{SqlxBackend, SqlxResultExt};

/// Version written by this build of the library.
pub const SCHEMA_VERSION: i64 = 1;

/// DDL for the bookkeeping tables. Keys are BIGINT on both dialects.
pub fn create_tables() -> [String; 2] {
    [
        format!(
            "CREATE TABLE IF NOT EXISTS {SCHEMA_VERSION_TABLE} (
                version BIGINT PRIMARY KEY
            )"
        ),
        // One row per lock key ever taken through the serialization-row strategy
        format!(
            "CREATE TABLE IF NOT EXISTS {LOCKS_TABLE} (
                lock_key BIGINT PRIMARY KEY NOT NULL
            )"
        ),
    ]
}

/// Creates missing tables, stamps a fresh database and upgrades an old one.
/// A database written by a newer library is refused.
pub async fn initialize(backend: &SqlxBackend) -> Result<()> {
    let pool = backend.pool();

    for statement in create_tables() {
        sqlx::query(&statement)
            .execute(pool)
            .await
            .sql_context(&format!("Failed to create bookkeeping table: {statement}"))?;
    }

    let row: Option<(i64,)> =
        sqlx::query_as(&format!("SELECT version FROM {SCHEMA_VERSION_TABLE}"))
            .fetch_optional(pool)
            .await
            .sql_context("Failed to check schema version")?;

    match row {
        None => {
            sqlx::query(&format!(
                "INSERT INTO {SCHEMA_VERSION_TABLE} (version) VALUES ($1)"
            ))
            .bind(SCHEMA_VERSION)
            .execute(pool)
            .await
            .sql_context("Failed to initialize schema version")?;
            tracing::info!(
                version = SCHEMA_VERSION,
                backend = backend.kind().label(),
                "Initialized positioning schema"
            );
        }
        Some((current,)) if current < SCHEMA_VERSION => {
            upgrade(backend, current).await?;
        }
        Some((current,)) if current > SCHEMA_VERSION => {
            return Err(BackendError::SqlxError {
                reason: format!(
                    "Database schema v{current} is newer than this library (v{SCHEMA_VERSION})"
                ),
                source: None,
            }
            .into());
        }
        Some(_) => {}
    }

    Ok(())
}

/// The stored schema version, if the schema was initialized.
pub async fn current_version(backend: &SqlxBackend) -> Result<Option<i64>> {
    let row: Option<(i64,)> =
        sqlx::query_as(&format!("SELECT version FROM {SCHEMA_VERSION_TABLE}"))
            .fetch_optional(backend.pool())
            .await
            .sql_context("Failed to read schema version")?;
    Ok(row.map(|(version,)| version))
}

/// Steps `from` up to [`SCHEMA_VERSION`], recording each version reached.
async fn upgrade(backend: &SqlxBackend, from: i64) -> Result<()> {
    for version in from..SCHEMA_VERSION {
        step(backend, version).await?;
        sqlx::query(&format!("UPDATE {SCHEMA_VERSION_TABLE} SET version = $1"))
            .bind(version + 1)
            .execute(backend.pool())
            .await
            .sql_context("Failed to record schema version")?;
        tracing::info!(from = version, to = version + 1, "Upgraded positioning schema");
    }
    Ok(())
}

/// Upgrades the schema from `version` to `version + 1`.
///
/// Version 1 is the first schema, so no step exists yet.
async fn step(_backend: &SqlxBackend, version: i64) -> Result<()> {
    Err(BackendError::SqlxError {
        reason: format!("No upgrade from schema v{version} to v{}", version + 1),
        source: None,
    }
    .into())
}
