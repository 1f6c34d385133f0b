//! Backend error types.
//!
//! This module defines structured error types for storage operations. Errors
//! raised by the underlying store are kept as the `source` so callers see them
//! unmodified.

use thiserror::Error;

use crate::record::RowId;

/// Failures of a store. Match on the `is_*` helpers rather than on variants;
/// new variants may appear.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackendError {
    /// Row not found by primary key.
    #[error("Row {id} not found in table {table}")]
    RowNotFound {
        /// The table searched
        table: String,
        /// The primary key searched for
        id: RowId,
    },

    /// A row with the given primary key already exists.
    #[error("Row {id} already exists in table {table}")]
    RowExists {
        /// The table written
        table: String,
        /// The conflicting primary key
        id: RowId,
    },

    /// The transaction was opened read-only.
    #[error("Cannot {operation} in a read-only transaction")]
    ReadOnlyTransaction {
        /// The rejected operation
        operation: String,
    },

    /// SQL database error from sqlx.
    #[error("SQL error: {reason}")]
    SqlxError {
        /// Description of the error, with context
        reason: String,
        /// The underlying driver error, when there is one
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An in-memory snapshot could not be encoded.
    #[error("Failed to encode snapshot")]
    SerializationFailed {
        /// The underlying serialization error
        #[source]
        source: serde_json::Error,
    },

    /// An in-memory snapshot could not be decoded.
    #[error("Failed to decode snapshot")]
    DeserializationFailed {
        /// The underlying deserialization error
        #[source]
        source: serde_json::Error,
    },

    /// File I/O error.
    #[error("Snapshot file I/O failed")]
    FileIo {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl BackendError {
    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::RowNotFound { .. })
    }

    /// Check if this error is related to I/O operations.
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            BackendError::FileIo { .. }
                | BackendError::SerializationFailed { .. }
                | BackendError::DeserializationFailed { .. }
        )
    }

    /// Check if this error came from the SQL driver.
    pub fn is_sql_error(&self) -> bool {
        matches!(self, BackendError::SqlxError { .. })
    }

    /// Check if this error indicates a misuse of the transaction.
    pub fn is_logical_error(&self) -> bool {
        matches!(
            self,
            BackendError::ReadOnlyTransaction { .. }
                | BackendError::RowExists { .. }
        )
    }

    /// Get the row ID if this error is about a specific row.
    pub fn row_id(&self) -> Option<RowId> {
        match self {
            BackendError::RowNotFound { id, .. } | BackendError::RowExists { id, .. } => Some(*id),
            _ => None,
        }
    }
}

// Conversion from BackendError to the main Error type
impl From<BackendError> for crate::Error {
    fn from(err: BackendError) -> Self {
        crate::Error::Backend(err)
    }
}
