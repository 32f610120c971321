//! Query construction and relation scoping

pub mod builder;
pub mod scope;

pub use builder::{Comparison, JoinClause, OrderByClause, QueryBuilder, SelectItem, WhereClause};
pub use scope::{apply_relation_filter, RelationFilter, Scope};
