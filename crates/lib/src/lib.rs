//!
//! Positioning: dense, scoped ordering of rows under concurrent writers.
//!
//! A positioned column holds the 1-based position of a row among its siblings,
//! the rows sharing the same values for a configured set of scope columns. Every
//! write made through a [`Transaction`] keeps each scope dense (positions are
//! exactly `1..=N`) by shifting siblings, and takes the scope's lock first so two
//! writers never renumber the same scope at once.
//!
//! ## Core Concepts
//!
//! * **Declarations (`config::Registry`)**: entity types and their positioned
//!   columns, resolved once at setup.
//! * **Records (`record::Record`)**: the in-memory view of a row, with dirty
//!   tracking and [`PositionRequest`]s (`At(n)`, `First`, `Last`, `Before`, `After`).
//! * **Locks (`lock::AdvisoryLock`)**: transaction-scoped mutual exclusion per
//!   scope, keyed by a stable [`LockKey`].
//! * **Mechanism (`mechanism::Mechanism`)**: the renumbering arithmetic.
//! * **Backends (`backend::Backend`)**: pluggable stores, in memory or SQL via `sqlx`.
//! * **Instance (`instance::Instance`)**: ties a backend to a registry and hands
//!   out transactions.
//!
//! ```
//! # #[tokio::main]
//! # async fn main() {
//! use positioning::backend::database::InMemory;
//! use positioning::config::{EntityType, PositionedOptions, Registry};
//! use positioning::{Instance, PositionRequest, Record};
//!
//! let mut registry = Registry::new();
//! registry
//!     .define(EntityType::new("Item").table("items").belongs_to("list"))
//!     .unwrap();
//! registry
//!     .positioned("Item", PositionedOptions::on("list"))
//!     .unwrap();
//! let instance = Instance::new(InMemory::new(), registry);
//!
//! let mut a = Record::new("Item").with("list_id", 1);
//! let mut b = Record::new("Item").with("list_id", 1);
//! instance.create(&mut a).await.unwrap();
//! instance.create(&mut b).await.unwrap();
//!
//! b.set_position("position", PositionRequest::First);
//! instance.update(&mut b).await.unwrap();
//! assert_eq!(b.position("position"), Some(1));
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod constants;
pub mod instance;
pub mod lock;
pub mod mechanism;
pub mod record;
pub mod transaction;

pub use config::Registry;
pub use instance::Instance;
pub use lock::LockKey;
pub use record::{PositionRequest, Record, Scope, Value};
pub use transaction::Transaction;

/// Result type used throughout the positioning library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the positioning library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured declaration errors from the config module
    #[error(transparent)]
    Config(config::ConfigError),

    /// Structured lock errors from the lock module
    #[error(transparent)]
    Lock(lock::LockError),

    /// Structured positioning errors from the mechanism module
    #[error(transparent)]
    Position(mechanism::PositionError),

    /// Structured storage errors from the backend module
    #[error(transparent)]
    Backend(backend::errors::BackendError),

    /// Structured lifecycle errors from the transaction module
    #[error(transparent)]
    Transaction(transaction::TransactionError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Lock(_) => "lock",
            Error::Position(_) => "mechanism",
            Error::Backend(_) => "backend",
            Error::Transaction(_) => "transaction",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Config(config_err) => config_err.is_not_found(),
            Error::Backend(backend_err) => backend_err.is_not_found(),
            Error::Transaction(tx_err) => tx_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error comes from an invalid declaration.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Check if this error indicates a lock could not be taken in time.
    pub fn is_timeout_error(&self) -> bool {
        match self {
            Error::Lock(lock_err) => lock_err.is_timeout(),
            _ => false,
        }
    }

    /// Check if this error is about a requested position.
    pub fn is_position_error(&self) -> bool {
        matches!(self, Error::Position(_))
    }

    /// Check if this error is database/backend-related.
    pub fn is_database_error(&self) -> bool {
        matches!(self, Error::Backend(_))
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Backend(backend_err) => backend_err.is_io_error(),
            _ => false,
        }
    }

    /// Check if this error is a misuse of the record lifecycle.
    pub fn is_state_error(&self) -> bool {
        match self {
            Error::Transaction(tx_err) => tx_err.is_state_error(),
            _ => false,
        }
    }

    /// Check if this error is validation-related.
    pub fn is_validation_error(&self) -> bool {
        match self {
            Error::Config(config_err) => config_err.is_declaration_error(),
            Error::Position(position_err) => position_err.is_relative_error(),
            Error::Backend(backend_err) => backend_err.is_logical_error(),
            _ => false,
        }
    }
}
