//! Scope tuples.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Row, Value};

/// The concrete values of a configuration's scope columns for one row.
///
/// Two rows are siblings iff their scopes are equal. Column order follows the
/// declaration, and NULL compares equal to NULL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Scope(Vec<(String, Value)>);

impl Scope {
    /// Builds a scope from `(column, value)` pairs in declaration order.
    pub fn new(values: Vec<(String, Value)>) -> Self {
        Self(values)
    }

    /// Projects a row onto the given scope columns. Missing columns read as NULL.
    pub fn from_row<S: AsRef<str>>(columns: &[S], row: &Row) -> Self {
        Self(
            columns
                .iter()
                .map(|column| {
                    let column = column.as_ref();
                    (
                        column.to_string(),
                        row.get(column).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect(),
        )
    }

    /// An empty scope: the whole table is one sibling group.
    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(column, _)| column.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(column, value)| (column.as_str(), value))
    }

    /// Whether a row belongs to this scope.
    pub fn contains(&self, row: &Row) -> bool {
        self.0
            .iter()
            .all(|(column, value)| row.get(column).unwrap_or(&Value::Null) == value)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(global)");
        }
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(column, value)| format!("{column}={value}"))
            .collect();
        write!(f, "({})", parts.join(", "))
    }
}
