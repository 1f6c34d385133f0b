//! Positioning over SQLite (`sqlite` feature) and PostgreSQL (`postgres`
//! feature) through one sqlx `AnyPool`.
//!
//! Rows live in the application's own tables; this module never creates them.
//! The only tables it owns are the bookkeeping ones in [`schema`], set up on
//! connect.
//!
//! A [`BackendTransaction`] pins one pooled connection until it finishes, and
//! scope locks are bound to that connection (see [`LockStrategy`]).

mod locks;
mod storage;

pub mod schema;

use std::any::Any;

use async_trait::async_trait;
use sqlx::AnyPool;
use sqlx::Executor;
use sqlx::any::AnyPoolOptions;

pub use locks::LockStrategy;

use crate::Result;
use crate::backend::errors::BackendError;
use crate::backend::{Backend, BackendTransaction};

use storage::SqlxTransaction;

/// Attaches a message to sqlx failures while keeping them as the source.
pub(crate) trait SqlxResultExt<T> {
    fn sql_context(self, context: &str) -> Result<T>;
}

impl<T> SqlxResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn sql_context(self, context: &str) -> Result<T> {
        self.map_err(|e| {
            BackendError::SqlxError {
                reason: format!("{context}: {e}"),
                source: Some(Box::new(e)),
            }
            .into()
        })
    }
}

/// Which SQL dialect a pool speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Sqlite,
    Postgres,
}

impl DbKind {
    pub fn label(&self) -> &'static str {
        match self {
            DbKind::Sqlite => "sqlite",
            DbKind::Postgres => "postgres",
        }
    }
}

/// A [`Backend`] over an application database.
///
/// Cloning the pool is cheap, but the backend itself is meant to be shared
/// behind an `Arc`. PostgreSQL test runs can give every backend a private
/// schema with [`SqlxBackend::connect_postgres_isolated`].
#[derive(Debug)]
pub struct SqlxBackend {
    pool: AnyPool,
    kind: DbKind,
    lock_strategy: LockStrategy,
}

impl SqlxBackend {
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn kind(&self) -> DbKind {
        self.kind
    }

    pub fn is_sqlite(&self) -> bool {
        self.kind == DbKind::Sqlite
    }

    pub fn is_postgres(&self) -> bool {
        self.kind == DbKind::Postgres
    }

    /// How scope locks are taken.
    pub fn lock_strategy(&self) -> LockStrategy {
        self.lock_strategy
    }

    /// Switches the lock primitive.
    ///
    /// [`LockStrategy::Advisory`] is only available on PostgreSQL.
    pub fn with_lock_strategy(mut self, strategy: LockStrategy) -> Result<Self> {
        if !strategy.is_supported_by(self.kind) {
            return Err(BackendError::SqlxError {
                reason: format!(
                    "Lock strategy {strategy:?} is not supported by {}",
                    self.kind.label()
                ),
                source: None,
            }
            .into());
        }
        self.lock_strategy = strategy;
        Ok(self)
    }

    /// Runs one statement outside of any positioning transaction, e.g. to
    /// create the application's tables. Returns the number of affected rows.
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let result = self
            .pool
            .execute(sql)
            .await
            .sql_context("Failed to execute statement")?;
        Ok(result.rows_affected())
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn transaction(&self, read_only: bool) -> Result<Box<dyn BackendTransaction>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .sql_context("Failed to begin transaction")?;

        match (self.kind, read_only) {
            (DbKind::Postgres, true) => {
                sqlx::query("SET TRANSACTION READ ONLY")
                    .execute(&mut *tx)
                    .await
                    .sql_context("Failed to start read-only transaction")?;
            }
            // A deferred SQLite transaction that reads before it writes fails
            // instead of waiting when another writer commits in between, so
            // writers take the database write lock up front.
            (DbKind::Sqlite, false) => {
                locks::claim_global(&mut tx).await?;
            }
            _ => {}
        }

        Ok(Box::new(SqlxTransaction::new(
            tx,
            self.kind,
            self.lock_strategy,
            read_only,
        )))
    }
}

/// Busy timeout for SQLite connections, in milliseconds.
#[cfg(feature = "sqlite")]
const SQLITE_BUSY_TIMEOUT_MS: u32 = 5000;

#[cfg(feature = "sqlite")]
impl SqlxBackend {
    /// Opens (creating if missing) the SQLite file at `path`.
    ///
    /// ```ignore
    /// let backend = positioning::backend::database::Sqlite::open_sqlite("app.db").await?;
    /// ```
    pub async fn open_sqlite<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        Self::connect_sqlite(&format!("sqlite:{}?mode=rwc", path.as_ref().display())).await
    }

    /// Connects to a SQLite URL such as `sqlite:./app.db`.
    pub async fn connect_sqlite(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let in_memory = url.contains("mode=memory");
        let mut options = AnyPoolOptions::new().max_connections(5);
        if in_memory {
            // The shared-cache database vanishes with its last connection.
            options = options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        // Pragmas are per connection. WAL does not apply to memory databases.
        let pragmas = if in_memory {
            format!("PRAGMA busy_timeout = {SQLITE_BUSY_TIMEOUT_MS};")
        } else {
            format!(
                "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; \
                 PRAGMA busy_timeout = {SQLITE_BUSY_TIMEOUT_MS};"
            )
        };
        let pool = options
            .after_connect(move |conn, _meta| {
                let pragmas = pragmas.clone();
                Box::pin(async move {
                    conn.execute(pragmas.as_str()).await?;
                    Ok(())
                })
            })
            .connect(url)
            .await
            .sql_context("Failed to connect to SQLite")?;

        Self::initialized(pool, DbKind::Sqlite).await
    }

    /// A private in-memory database that lives as long as this backend.
    ///
    /// Shared-cache databases fail lock conflicts immediately instead of
    /// waiting; tests with concurrent writers need a file.
    pub async fn sqlite_in_memory() -> Result<Self> {
        let name = uuid::Uuid::new_v4();
        Self::connect_sqlite(&format!("sqlite:file:mem_{name}?mode=memory&cache=shared")).await
    }
}

#[cfg(feature = "postgres")]
impl SqlxBackend {
    /// Connects to PostgreSQL using the server's default `search_path`.
    ///
    /// ```ignore
    /// let backend = positioning::backend::database::Postgres::connect_postgres(
    ///     "postgres://localhost/app",
    /// )
    /// .await?;
    /// ```
    pub async fn connect_postgres(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .sql_context("Failed to connect to PostgreSQL")?;
        Self::initialized(pool, DbKind::Postgres).await
    }

    /// Connects with a freshly created `test_<uuid>` schema as the
    /// `search_path` of every pooled connection, so parallel test runs never
    /// see each other's tables.
    pub async fn connect_postgres_isolated(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let schema = format!("test_{}", uuid::Uuid::new_v4().simple());

        let setup = AnyPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .sql_context("Failed to connect to PostgreSQL")?;
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
            .execute(&setup)
            .await
            .sql_context(&format!("Failed to create schema {schema}"))?;
        setup.close().await;

        // Small pools that wait for a connection keep parallel tests under
        // the server's max_connections.
        let search_path = format!("SET search_path TO {schema}");
        let pool = AnyPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .after_connect(move |conn, _meta| {
                let search_path = search_path.clone();
                Box::pin(async move {
                    conn.execute(search_path.as_str()).await?;
                    Ok(())
                })
            })
            .connect(url)
            .await
            .sql_context("Failed to connect to PostgreSQL")?;

        tracing::debug!(schema = %schema, "Connected to isolated PostgreSQL schema");
        Self::initialized(pool, DbKind::Postgres).await
    }
}

impl SqlxBackend {
    async fn initialized(pool: AnyPool, kind: DbKind) -> Result<Self> {
        let backend = Self {
            pool,
            kind,
            lock_strategy: LockStrategy::default_for(kind),
        };
        schema::initialize(&backend).await?;
        Ok(backend)
    }
}

#[async_trait]
impl Backend for SqlxBackend {
    async fn begin(&self) -> Result<Box<dyn BackendTransaction>> {
        self.transaction(false).await
    }

    async fn begin_read(&self) -> Result<Box<dyn BackendTransaction>> {
        self.transaction(true).await
    }

    fn label(&self) -> &'static str {
        self.kind.label()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// [`SqlxBackend`] under the name of the store it is opened on.
#[cfg(feature = "sqlite")]
pub type Sqlite = SqlxBackend;

#[cfg(feature = "postgres")]
pub type Postgres = SqlxBackend;
