//! Relation definitions, variants, and the registry

pub mod column;
pub mod definition;
pub mod field;
pub mod pivot;
pub mod registry;

pub use column::ColumnRelation;
pub use definition::{Relation, RelationKind};
pub use field::FieldRelation;
pub use pivot::{PivotRelation, PIVOT_PARENT_COLUMN};
pub use registry::{default_registry, RelationFactory, RelationRegistry};
