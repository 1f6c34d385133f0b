//! Position computation error types.

use thiserror::Error;

use crate::record::RowId;

/// Errors raised while resolving a requested position.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PositionError {
    /// A `Before`/`After` request named a row outside the destination scope.
    #[error("Row {id} is not a sibling in the scope of `{column}`")]
    RelativeRecordNotInScope {
        /// The position column
        column: String,
        /// The row the request was relative to
        id: RowId,
    },

    /// A `Before`/`After` request named a sibling that has no position yet.
    #[error("Row {id} has no `{column}` to position relative to")]
    RelativeRecordUnpositioned {
        /// The position column
        column: String,
        /// The row the request was relative to
        id: RowId,
    },
}

impl PositionError {
    /// Check if this error is about the target of a relative request.
    pub fn is_relative_error(&self) -> bool {
        matches!(
            self,
            PositionError::RelativeRecordNotInScope { .. }
                | PositionError::RelativeRecordUnpositioned { .. }
        )
    }

    /// The row the failed request was relative to.
    pub fn id(&self) -> RowId {
        match self {
            PositionError::RelativeRecordNotInScope { id, .. }
            | PositionError::RelativeRecordUnpositioned { id, .. } => *id,
        }
    }
}

impl From<PositionError> for crate::Error {
    fn from(err: PositionError) -> Self {
        crate::Error::Position(err)
    }
}
