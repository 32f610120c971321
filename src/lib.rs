//! # relatable: Relation Abstraction and Eager Loading
//!
//! A relation layer over tabular data sources: dynamic records with
//! identity-preserving relative tracking, declarative relations between
//! model types, query predicates derived from relations, batched eager
//! loading along dotted paths, and cycle-aware traversal loading.

pub mod error;
pub mod loading;
pub mod query;
pub mod record;
pub mod relations;
pub mod schema;
pub mod source;
pub mod support;

// Re-export core traits and types
pub use error::{OrmError, OrmResult};
pub use loading::{CyclicLoader, EagerLoader};
pub use query::{
    apply_relation_filter, Comparison, QueryBuilder, RelationFilter, Scope, WhereClause,
};
pub use record::{Key, Record, RelativeSlot, SharedRecord};
pub use relations::{
    default_registry, ColumnRelation, FieldRelation, PivotRelation, Relation, RelationKind,
    RelationRegistry,
};
pub use schema::ModelType;
pub use source::{DataSource, MemorySource, PostgresSource, Row};
pub use support::{group_by_field, group_by_type, index_by_field};
