//! Error types for the relation engine
//!
//! One crate-wide taxonomy: everything a caller can observe is an `OrmError`,
//! and collaborator failures (sqlx, serde_json) are wrapped into the `Database`
//! kind uniformly so callers never need to know the collaborator's native
//! error types.

use thiserror::Error;

/// Result type alias for relation-engine operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for relation and loading operations
#[derive(Debug, Clone, Error)]
pub enum OrmError {
    /// A value was used where a record of a specific model type was required
    #[error("not a model of the expected type: {0}")]
    NotAModel(String),

    /// A named relation is absent on a model type
    #[error("relation '{relation}' is not defined on model '{model}'{hint}")]
    RelationNotDefined {
        model: String,
        relation: String,
        hint: String,
    },

    /// A record lacks a field value the operation requires (e.g. an unsaved record)
    #[error("incorrect model: {0}")]
    IncorrectModel(String),

    /// An operation required a model-bound query but received a plain one
    #[error("incorrect query: {0}")]
    IncorrectQuery(String),

    /// Wrong shape or type for a constraint or configuration value
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The underlying query/execution layer failed
    #[error("database error: {0}")]
    Database(String),
}

impl OrmError {
    /// Build a `RelationNotDefined` error naming the model and the relation.
    pub fn relation_not_defined(model: &str, relation: &str) -> Self {
        OrmError::RelationNotDefined {
            model: model.to_string(),
            relation: relation.to_string(),
            hint: String::new(),
        }
    }

    /// Attach the cyclic-loader hint to a relation-resolution failure.
    ///
    /// Used when resolution fails past the first traversal level: the chain the
    /// caller asked to follow cyclically may simply not exist on the loaded
    /// relative's own model type, which is a configuration bug rather than a
    /// one-shot load misuse.
    pub fn with_cyclic_hint(self) -> Self {
        match self {
            OrmError::RelationNotDefined { model, relation, .. } => OrmError::RelationNotDefined {
                model,
                relation,
                hint: "; the relation chain may not be cyclic (the terminal relation \
                       does not exist on the loaded relative's model type)"
                    .to_string(),
            },
            other => other,
        }
    }
}

impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        OrmError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Database(err.to_string())
    }
}

impl From<anyhow::Error> for OrmError {
    fn from(err: anyhow::Error) -> Self {
        OrmError::Database(err.to_string())
    }
}
