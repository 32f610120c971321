//! Relation scoping - relation-existence predicates on queries
//!
//! `apply_relation_filter` is the query-side half of the relation contract: it
//! narrows a model-bound query to the subjects related to something, to a
//! concrete record or set of records, or to whatever a sub-filter closure
//! keeps. Dotted paths nest: `"posts.category"` becomes an EXISTS over posts
//! whose own sub-filter is an EXISTS over categories.

use std::fmt;
use std::sync::Arc;

use crate::error::OrmResult;
use crate::query::builder::QueryBuilder;
use crate::record::SharedRecord;
use crate::relations::RelationRegistry;

/// A sub-filter closure: rewrites a query, composing under AND with whatever
/// predicates the relation itself adds.
pub type Scope = dyn Fn(QueryBuilder) -> OrmResult<QueryBuilder> + Send + Sync;

/// Constraint shapes a relation predicate can be scoped by.
///
/// An explicit tagged variant rather than runtime type inspection, so the
/// dispatch is exhaustive.
pub enum RelationFilter {
    /// Related to at least one record, unconstrained
    Any,
    /// Related to this record
    Record(SharedRecord),
    /// Related to at least one record in the list
    Records(Vec<SharedRecord>),
    /// Related to at least one record the closure's predicates keep
    Scope(Box<Scope>),
}

impl fmt::Debug for RelationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationFilter::Any => write!(f, "Any"),
            RelationFilter::Record(_) => write!(f, "Record(..)"),
            RelationFilter::Records(records) => write!(f, "Records({})", records.len()),
            RelationFilter::Scope(_) => write!(f, "Scope(..)"),
        }
    }
}

/// Narrow `query` to subjects related through `path`, scoped by `filter`.
///
/// The query must be model-bound; the first path segment is resolved on its
/// model type, later segments on each relation's target type. With `negate`
/// the predicate is inverted (subjects *not* related).
pub fn apply_relation_filter(
    registry: &RelationRegistry,
    query: QueryBuilder,
    path: &str,
    filter: RelationFilter,
    negate: bool,
) -> OrmResult<QueryBuilder> {
    apply_path(registry, query, path, &Arc::new(filter), negate)
}

fn apply_path(
    registry: &RelationRegistry,
    query: QueryBuilder,
    path: &str,
    filter: &Arc<RelationFilter>,
    negate: bool,
) -> OrmResult<QueryBuilder> {
    let model = query.require_model()?.clone();
    match path.split_once('.') {
        None => {
            let relation = registry.resolve(&model.name, path)?;
            relation.apply_to_query(query, filter.as_ref(), negate)
        }
        Some((head, rest)) => {
            let relation = registry.resolve(&model.name, head)?;
            let registry = registry.clone();
            let rest = rest.to_string();
            let inner = Arc::clone(filter);
            let nested: Box<Scope> =
                Box::new(move |sub| apply_path(&registry, sub, &rest, &inner, false));
            relation.apply_to_query(query, &RelationFilter::Scope(nested), negate)
        }
    }
}
