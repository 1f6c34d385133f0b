//! Scope configuration.
//!
//! Entity types are described once with [`EntityType`] and collected in a
//! [`Registry`]. Each positioned column is then declared with
//! [`Registry::positioned`], which validates the declaration and resolves the
//! scope identifiers to concrete columns. The registry is built during setup,
//! never mutated afterwards, and shared by reference (usually in an `Arc`) with
//! every transaction.
//!
//! ```
//! use positioning::config::{EntityType, PositionedOptions, Registry};
//!
//! let mut registry = Registry::new();
//! registry
//!     .define(EntityType::new("Item").table("items").belongs_to("list"))
//!     .unwrap();
//! let config = registry
//!     .positioned("Item", PositionedOptions::on("list"))
//!     .unwrap();
//! assert_eq!(config.scope_columns(), ["list_id"]);
//! ```

pub mod errors;

use std::collections::BTreeMap;

pub use errors::ConfigError;

use crate::Result;
use crate::constants::{DEFAULT_POSITION_COLUMN, DEFAULT_PRIMARY_KEY};
use crate::lock::LockKey;
use crate::record::{Record, Row, Scope, Value};

/// Whether an entity type owns its storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageIdentity {
    /// A concrete type backed by its own table.
    Base,
    /// A type with no table of its own.
    Abstract,
    /// A subtype stored in its base type's table, told apart by a discriminator column.
    Inherited {
        /// Name of the base entity type
        base: String,
        /// Column holding the type name
        discriminator: String,
    },
}

/// A belongs-to relation and the foreign key column it is stored in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: String,
    pub foreign_key: String,
}

/// Description of an entity type: its table, primary key and relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    name: String,
    table: String,
    primary_key: String,
    identity: StorageIdentity,
    relations: Vec<Relation>,
}

impl EntityType {
    /// A base type whose table defaults to its name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            table: name.clone(),
            name,
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            identity: StorageIdentity::Base,
            relations: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    /// Declares a belongs-to relation stored in `<name>_id`.
    pub fn belongs_to(self, name: impl Into<String>) -> Self {
        let name = name.into();
        let foreign_key = format!("{name}_id");
        self.belongs_to_with_key(name, foreign_key)
    }

    /// Declares a belongs-to relation stored in an explicit foreign key column.
    pub fn belongs_to_with_key(
        mut self,
        name: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relations.push(Relation {
            name: name.into(),
            foreign_key: foreign_key.into(),
        });
        self
    }

    /// Marks the type as abstract: it has no table of its own.
    pub fn abstract_type(mut self) -> Self {
        self.identity = StorageIdentity::Abstract;
        self
    }

    /// Marks the type as a subtype stored in `base`'s table.
    pub fn inherits(mut self, base: impl Into<String>, discriminator: impl Into<String>) -> Self {
        self.identity = StorageIdentity::Inherited {
            base: base.into(),
            discriminator: discriminator.into(),
        };
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn primary_key_column(&self) -> &str {
        &self.primary_key
    }

    pub fn identity(&self) -> &StorageIdentity {
        &self.identity
    }

    pub fn is_base(&self) -> bool {
        self.identity == StorageIdentity::Base
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Resolves a scope identifier: a belongs-to relation name becomes its
    /// foreign key, anything else is taken as a column name.
    fn resolve(&self, identifier: &str) -> String {
        self.relations
            .iter()
            .find(|relation| relation.name == identifier)
            .map(|relation| relation.foreign_key.clone())
            .unwrap_or_else(|| identifier.to_string())
    }
}

/// Arguments of a positioning declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionedOptions {
    /// Scope identifiers: relation names or column names.
    pub on: Vec<String>,
    /// The position column.
    pub column: String,
}

impl Default for PositionedOptions {
    fn default() -> Self {
        Self {
            on: Vec::new(),
            column: DEFAULT_POSITION_COLUMN.to_string(),
        }
    }
}

impl PositionedOptions {
    /// Scoped on a single identifier, default column.
    pub fn on(identifier: impl Into<String>) -> Self {
        Self::on_many([identifier])
    }

    /// Scoped on several identifiers, default column.
    pub fn on_many<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            on: identifiers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }
}

/// The resolved declaration of one positioned column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeConfiguration {
    entity: String,
    table: String,
    primary_key: String,
    column: String,
    scope_columns: Vec<String>,
}

impl ScopeConfiguration {
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// The position column.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Resolved scope columns in declaration order.
    pub fn scope_columns(&self) -> &[String] {
        &self.scope_columns
    }

    /// Scope of the record's current (possibly unsaved) attributes.
    pub fn scope_of(&self, record: &Record) -> Scope {
        Scope::from_row(&self.scope_columns, record.attributes())
    }

    /// Scope of a stored row.
    pub fn scope_of_row(&self, row: &Row) -> Scope {
        Scope::from_row(&self.scope_columns, row)
    }

    /// Whether any scope column was assigned a new value.
    pub fn scope_changed(&self, record: &Record) -> bool {
        self.scope_columns
            .iter()
            .any(|column| record.is_changed(column))
    }

    /// Whether saving the record requires renumbering for this column.
    pub fn affects_ordering(&self, record: &Record) -> bool {
        record.is_changed(&self.column) || self.scope_changed(record)
    }

    /// Lock key guarding the given scope of this column.
    pub fn lock_key(&self, scope: &Scope) -> LockKey {
        LockKey::derive(&self.entity, &self.column, scope)
    }
}

/// Declarations keyed by (entity type, column), plus the entity types they refer to.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entities: BTreeMap<String, EntityType>,
    columns: BTreeMap<(String, String), ScopeConfiguration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity type. Subtypes must name an already registered base type.
    pub fn define(&mut self, entity: EntityType) -> Result<&EntityType> {
        if self.entities.contains_key(entity.name()) {
            return Err(ConfigError::DuplicateEntity {
                entity: entity.name().to_string(),
            }
            .into());
        }
        if let StorageIdentity::Inherited { base, .. } = entity.identity()
            && !self.entities.get(base).is_some_and(EntityType::is_base)
        {
            return Err(ConfigError::InvalidBase {
                entity: entity.name().to_string(),
                base: base.clone(),
            }
            .into());
        }
        let name = entity.name().to_string();
        Ok(self.entities.entry(name).or_insert(entity))
    }

    /// Declares a positioned column on a base entity type.
    ///
    /// Scope identifiers are resolved here, once: a belongs-to relation becomes
    /// its foreign key column, any other identifier is used as a column name.
    pub fn positioned(
        &mut self,
        entity: &str,
        options: PositionedOptions,
    ) -> Result<&ScopeConfiguration> {
        let entity_type = self.entity(entity)?.clone();
        if !entity_type.is_base() {
            return Err(ConfigError::NonBaseType {
                entity: entity.to_string(),
            }
            .into());
        }

        let key = (entity.to_string(), options.column.clone());
        if let Some(existing) = self.columns.get(&key) {
            return Err(ConfigError::DuplicateColumn {
                entity: entity.to_string(),
                column: options.column,
                scope: existing.scope_columns.clone(),
            }
            .into());
        }

        let config = ScopeConfiguration {
            entity: entity.to_string(),
            table: entity_type.table_name().to_string(),
            primary_key: entity_type.primary_key_column().to_string(),
            scope_columns: options
                .on
                .iter()
                .map(|identifier| entity_type.resolve(identifier))
                .collect(),
            column: options.column,
        };
        tracing::debug!(
            entity,
            column = config.column(),
            scope = ?config.scope_columns(),
            "Declared positioned column"
        );
        Ok(self.columns.entry(key).or_insert(config))
    }

    /// Looks up an entity type by name.
    pub fn entity(&self, name: &str) -> Result<&EntityType> {
        self.entities.get(name).ok_or_else(|| {
            ConfigError::UnknownEntity {
                entity: name.to_string(),
            }
            .into()
        })
    }

    /// The type owning the storage of `name`: itself, or its base for a subtype.
    pub fn storage_entity(&self, name: &str) -> Result<&EntityType> {
        let entity = self.entity(name)?;
        match entity.identity() {
            StorageIdentity::Inherited { base, .. } => self.entity(base),
            _ => Ok(entity),
        }
    }

    /// The entity type of a row stored in `base`'s table: the subtype named by
    /// the row's discriminator, or `base` itself.
    pub fn entity_of_row<'r>(&'r self, base: &'r str, row: &Row) -> &'r str {
        self.entities
            .values()
            .find(|entity| match entity.identity() {
                StorageIdentity::Inherited {
                    base: owner,
                    discriminator,
                } => {
                    owner == base
                        && row.get(discriminator).and_then(Value::as_text) == Some(entity.name())
                }
                _ => false,
            })
            .map_or(base, EntityType::name)
    }

    /// The declaration of `column` on `entity` (or on its base type).
    pub fn configuration(&self, entity: &str, column: &str) -> Result<&ScopeConfiguration> {
        let owner = self.storage_entity(entity)?;
        self.columns
            .get(&(owner.name().to_string(), column.to_string()))
            .ok_or_else(|| {
                ConfigError::NotPositioned {
                    entity: entity.to_string(),
                    column: column.to_string(),
                }
                .into()
            })
    }

    /// Every positioned column of `entity` (or of its base type).
    pub fn configurations(&self, entity: &str) -> Result<Vec<&ScopeConfiguration>> {
        let owner = self.storage_entity(entity)?.name();
        Ok(self
            .columns
            .values()
            .filter(|config| config.entity == owner)
            .collect())
    }
}
