//! Model Types - schema bindings between record shapes and tables
//!
//! A `ModelType` binds a record shape to exactly one table and one identifier
//! field. Records carry their `ModelType` by value; the type is cheap to clone
//! and hashable so heterogeneous record collections can be grouped by type.

use serde::{Deserialize, Serialize};

/// A model type: one name, one table, one identifier field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelType {
    /// Model name, e.g. "User"
    pub name: String,
    /// Table the model maps to, e.g. "users"
    pub table: String,
    /// Identifier field, defaults to "id"
    pub primary_key: String,
}

impl ModelType {
    /// Create a model type with the default "id" identifier field.
    pub fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            primary_key: "id".to_string(),
        }
    }

    /// Override the identifier field.
    pub fn with_primary_key(mut self, primary_key: &str) -> Self {
        self.primary_key = primary_key.to_string();
        self
    }

    /// The identifier column qualified with the table name, e.g. "users.id".
    pub fn qualified_primary_key(&self) -> String {
        format!("{}.{}", self.table, self.primary_key)
    }
}
