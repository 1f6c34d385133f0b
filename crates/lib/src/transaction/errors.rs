//! Transaction specific errors
//!
//! Misuse of the lifecycle: saving a record in the wrong state, or writing
//! through a transaction that cannot write.

use thiserror::Error;

use crate::record::RowId;

/// Errors that can occur while driving records through a transaction.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TransactionError {
    /// `create` called on a record that is already stored.
    #[error("{entity} {id} is already persisted")]
    AlreadyPersisted { entity: String, id: RowId },

    /// `update` or `destroy` called on a record that was never stored.
    #[error("{entity} record has not been persisted")]
    NotPersisted { entity: String },

    /// The record was destroyed and can no longer be saved.
    #[error("{entity} {id} has been destroyed")]
    RecordDestroyed { entity: String, id: RowId },

    /// The record's row no longer exists.
    #[error("{entity} {id} not found")]
    RecordNotFound { entity: String, id: RowId },

    /// A mutation was attempted through a read-only transaction.
    #[error("Cannot {operation} in a read-only transaction")]
    ReadOnly { operation: String },

    /// The stored scope of a record kept changing while its locks were taken.
    #[error("Scope of {entity} {id} did not settle after {attempts} attempts")]
    ScopeUnstable {
        entity: String,
        id: RowId,
        attempts: usize,
    },
}

impl TransactionError {
    /// Check if this error is about a record in the wrong lifecycle state.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            TransactionError::AlreadyPersisted { .. }
                | TransactionError::NotPersisted { .. }
                | TransactionError::RecordDestroyed { .. }
        )
    }

    /// Check if this error indicates a missing row.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransactionError::RecordNotFound { .. })
    }
}

impl From<TransactionError> for crate::Error {
    fn from(err: TransactionError) -> Self {
        crate::Error::Transaction(err)
    }
}
