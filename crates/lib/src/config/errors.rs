//! Configuration error types.
//!
//! Errors raised while declaring entity types and positioned columns. They
//! surface at setup time and are not recoverable: a failed declaration must
//! abort building the [`Registry`](super::Registry).

use thiserror::Error;

/// Errors that can occur while declaring positioning.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Existing variants will not be removed in minor versions
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Positioning declared on an abstract type or on a subtype that shares
    /// another type's table.
    #[error("`{entity}` cannot configure positioning on a non-base type.")]
    NonBaseType {
        /// The offending entity type
        entity: String,
    },

    /// The position column was already declared on this entity type.
    #[error("The column `{column}` has already been used by the scope `{scope:?}` on `{entity}`.")]
    DuplicateColumn {
        /// The entity type
        entity: String,
        /// The position column declared twice
        column: String,
        /// The resolved scope columns of the existing declaration
        scope: Vec<String>,
    },

    /// An entity type with the same name is already registered.
    #[error("Entity type `{entity}` is already defined")]
    DuplicateEntity {
        /// The entity type name
        entity: String,
    },

    /// The entity type is not registered.
    #[error("Unknown entity type `{entity}`")]
    UnknownEntity {
        /// The entity type name
        entity: String,
    },

    /// A subtype names a base type that is not registered or is not a base type.
    #[error("Entity type `{entity}` inherits from `{base}`, which is not a registered base type")]
    InvalidBase {
        /// The subtype
        entity: String,
        /// The named base type
        base: String,
    },

    /// The column has no positioning declaration on this entity type.
    #[error("Column `{column}` is not positioned on `{entity}`")]
    NotPositioned {
        /// The entity type
        entity: String,
        /// The column name
        column: String,
    },
}

impl ConfigError {
    /// Check if this error is a rejected declaration.
    pub fn is_declaration_error(&self) -> bool {
        matches!(
            self,
            ConfigError::NonBaseType { .. }
                | ConfigError::DuplicateColumn { .. }
                | ConfigError::DuplicateEntity { .. }
                | ConfigError::InvalidBase { .. }
        )
    }

    /// Check if this error indicates a missing entity type or declaration.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ConfigError::UnknownEntity { .. } | ConfigError::NotPositioned { .. }
        )
    }

    /// Get the entity type this error is about.
    pub fn entity(&self) -> &str {
        match self {
            ConfigError::NonBaseType { entity }
            | ConfigError::DuplicateColumn { entity, .. }
            | ConfigError::DuplicateEntity { entity }
            | ConfigError::UnknownEntity { entity }
            | ConfigError::InvalidBase { entity, .. }
            | ConfigError::NotPositioned { entity, .. } => entity,
        }
    }
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err)
    }
}
