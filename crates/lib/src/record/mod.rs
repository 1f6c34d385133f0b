//! Rows, attribute values and dirty tracking.
//!
//! A [`Record`] is the application's in-memory view of one row of a positioned
//! entity. It tracks which attributes were assigned since it was last loaded or
//! saved, which is what the lifecycle integration uses to decide whether a write
//! affects ordering.

mod scope;

pub use scope::Scope;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a stored row (the value of its primary key column).
pub type RowId = i64;

/// Column name to value mapping, as read from or written to a backend.
pub type Row = BTreeMap<String, Value>;

/// A single attribute value.
///
/// Positions and foreign keys are integers; text covers string scope columns
/// such as a polymorphic type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Text(String),
}

impl Value {
    /// Returns the integer value, if this is an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the text value, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Where a row should be placed within its scope.
///
/// Assigning any request through [`Record::set_position`] marks the position as
/// changed, so the next save recomputes the arrangement even when the requested
/// slot is the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionRequest {
    /// An explicit slot, clamped into the valid range of the scope.
    At(i64),
    /// The head of the scope.
    First,
    /// The tail of the scope.
    Last,
    /// Immediately before the given sibling; `None` means the tail.
    Before(Option<RowId>),
    /// Immediately after the given sibling; `None` means the head.
    After(Option<RowId>),
}

impl From<i64> for PositionRequest {
    fn from(value: i64) -> Self {
        PositionRequest::At(value)
    }
}

impl From<i32> for PositionRequest {
    fn from(value: i32) -> Self {
        PositionRequest::At(value.into())
    }
}

impl fmt::Display for PositionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionRequest::At(p) => write!(f, "{p}"),
            PositionRequest::First => write!(f, "first"),
            PositionRequest::Last => write!(f, "last"),
            PositionRequest::Before(Some(id)) => write!(f, "before {id}"),
            PositionRequest::Before(None) => write!(f, "before nothing"),
            PositionRequest::After(Some(id)) => write!(f, "after {id}"),
            PositionRequest::After(None) => write!(f, "after nothing"),
        }
    }
}

/// In-memory view of a row of a named entity type.
///
/// # Dirty tracking
///
/// [`Record::set`] marks an attribute as changed only when the new value differs
/// from the stored one. [`Record::set_position`] always marks the column as
/// changed: a position assignment is a request to revalidate the arrangement of
/// the scope, not merely a field write.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity: String,
    id: Option<RowId>,
    attributes: Row,
    /// Values as last loaded from or written to the backend.
    original: Row,
    changed: BTreeSet<String>,
    position_requests: BTreeMap<String, PositionRequest>,
    destroyed: bool,
}

impl Record {
    /// Creates a new, unsaved record of the given entity type.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            id: None,
            attributes: Row::new(),
            original: Row::new(),
            changed: BTreeSet::new(),
            position_requests: BTreeMap::new(),
            destroyed: false,
        }
    }

    /// Builds a persisted record from a stored row.
    pub fn from_row(entity: impl Into<String>, id: RowId, row: Row) -> Self {
        Self {
            entity: entity.into(),
            id: Some(id),
            original: row.clone(),
            attributes: row,
            changed: BTreeSet::new(),
            position_requests: BTreeMap::new(),
            destroyed: false,
        }
    }

    /// Builder-style [`Record::set`].
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(attribute, value);
        self
    }

    /// Builder-style [`Record::set_position`].
    pub fn with_position(
        mut self,
        column: impl Into<String>,
        request: impl Into<PositionRequest>,
    ) -> Self {
        self.set_position(column, request);
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn id(&self) -> Option<RowId> {
        self.id
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some() && !self.destroyed
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Current value of an attribute; unset attributes read as NULL.
    pub fn get(&self, attribute: &str) -> &Value {
        const NULL: &Value = &Value::Null;
        self.attributes.get(attribute).unwrap_or(NULL)
    }

    /// Value of an attribute as last persisted.
    pub fn was(&self, attribute: &str) -> &Value {
        const NULL: &Value = &Value::Null;
        self.original.get(attribute).unwrap_or(NULL)
    }

    /// Current integer position held in `column`, if any.
    pub fn position(&self, column: &str) -> Option<i64> {
        self.get(column).as_integer()
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    /// Assigns an attribute, marking it changed when the value differs from the
    /// persisted one.
    ///
    /// On a positioned column this is a plain field write: putting back the
    /// stored slot leaves nothing to save. Use [`Record::set_position`] to have
    /// the arrangement revalidated regardless of the value.
    pub fn set(&mut self, attribute: impl Into<String>, value: impl Into<Value>) {
        let attribute = attribute.into();
        let value = value.into();
        if *self.was(&attribute) != value || self.id.is_none() {
            self.changed.insert(attribute.clone());
        } else {
            self.changed.remove(&attribute);
        }
        self.position_requests.remove(&attribute);
        self.attributes.insert(attribute, value);
    }

    /// Requests a placement for the position held in `column`.
    ///
    /// The column is unconditionally marked changed, so even reassigning the
    /// current slot triggers renumbering validation on the next save.
    pub fn set_position(&mut self, column: impl Into<String>, request: impl Into<PositionRequest>) {
        let column = column.into();
        let request = request.into();
        if let PositionRequest::At(p) = request {
            self.attributes.insert(column.clone(), Value::Integer(p));
        }
        self.changed.insert(column.clone());
        self.position_requests.insert(column, request);
    }

    /// Whether the attribute was assigned since the record was last persisted.
    pub fn is_changed(&self, attribute: &str) -> bool {
        self.changed.contains(attribute)
    }

    pub fn changed(&self) -> impl Iterator<Item = &str> {
        self.changed.iter().map(String::as_str)
    }

    /// The placement requested for `column`, if the column was assigned.
    ///
    /// A plain [`Record::set`] of an integer counts as an explicit slot, and a
    /// NULL assignment as a request for the tail.
    pub fn position_request(&self, column: &str) -> Option<PositionRequest> {
        if let Some(request) = self.position_requests.get(column) {
            return Some(request.clone());
        }
        if !self.is_changed(column) {
            return None;
        }
        match self.get(column) {
            Value::Integer(p) => Some(PositionRequest::At(*p)),
            _ => Some(PositionRequest::Last),
        }
    }

    /// Writes a solidified position without touching the request bookkeeping.
    pub(crate) fn assign_position(&mut self, column: &str, position: i64) {
        self.attributes
            .insert(column.to_string(), Value::Integer(position));
        self.changed.insert(column.to_string());
    }

    /// Changed attributes, ready for an update statement.
    pub(crate) fn changes(&self) -> Row {
        self.changed
            .iter()
            .map(|attribute| (attribute.clone(), self.get(attribute).clone()))
            .collect()
    }

    /// Attributes to write on insert. NULL attributes are left to the column default.
    pub(crate) fn insert_row(&self, primary_key: &str) -> Row {
        self.attributes
            .iter()
            .filter(|(name, value)| name.as_str() != primary_key && !value.is_null())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Marks the current attributes as persisted under `id`.
    pub(crate) fn mark_persisted(&mut self, primary_key: &str, id: RowId) {
        self.id = Some(id);
        self.attributes
            .insert(primary_key.to_string(), Value::Integer(id));
        self.original = self.attributes.clone();
        self.changed.clear();
        self.position_requests.clear();
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.destroyed = true;
        self.changed.clear();
        self.position_requests.clear();
    }
}
