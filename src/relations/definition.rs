//! Relation contract and shared batched-load plumbing
//!
//! A relation is an immutable configuration object declared on an owner model
//! type, pointing at a target model type. Every variant supports the same two
//! operations: contributing a filter predicate to a query, and batch-loading
//! relatives for a set of same-type subject records.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::{OrmError, OrmResult};
use crate::query::{QueryBuilder, RelationFilter, Scope};
use crate::record::{Key, RelativeSlot, SharedRecord};
use crate::schema::ModelType;
use crate::source::DataSource;
use crate::support::group_by_field;

/// Cardinality on the relation's "many" side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    One,
    Many,
}

impl RelationKind {
    pub fn is_many(self) -> bool {
        matches!(self, RelationKind::Many)
    }
}

/// The relation capability: predicate contribution plus batched loading.
#[async_trait]
pub trait Relation: Send + Sync + fmt::Debug {
    /// The model type the relation is declared on.
    fn owner(&self) -> &ModelType;

    /// The related model type; may equal the owner for self-relations.
    fn target(&self) -> &ModelType;

    fn kind(&self) -> RelationKind;

    /// Add a predicate to `query` keeping only subjects related to at least
    /// one record satisfying `filter` (inverted with `negate`).
    fn apply_to_query(
        &self,
        query: QueryBuilder,
        filter: &RelationFilter,
        negate: bool,
    ) -> OrmResult<QueryBuilder>;

    /// Batch-load relatives for `subjects` (non-empty, all of the owner type)
    /// into their loaded-relatives entry named `relation_name`, issuing at
    /// most one query. The optional `scope` is applied to the fetch query
    /// before the relation's own predicates so both compose under AND.
    async fn load_relatives(
        &self,
        source: &dyn DataSource,
        relation_name: &str,
        subjects: &[SharedRecord],
        scope: Option<&Scope>,
    ) -> OrmResult<()>;
}

/// Distinct, non-null comparison keys across the subjects, in first-seen order.
pub(crate) fn comparison_keys(subjects: &[SharedRecord], field: &str) -> Vec<Key> {
    let mut seen = std::collections::HashSet::new();
    let mut keys = Vec::new();
    for subject in subjects {
        if let Some(key) = subject.field(field).as_ref().and_then(Key::from_value) {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
    }
    keys
}

/// Mark every subject's entry as loaded-with-nothing.
pub(crate) fn write_empty_slots(subjects: &[SharedRecord], relation_name: &str, kind: RelationKind) {
    for subject in subjects {
        subject.set_relative(relation_name, slot_for(kind, Vec::new()));
    }
}

/// Wrap a group of relatives into the slot shape the cardinality dictates.
pub(crate) fn slot_for(kind: RelationKind, mut records: Vec<SharedRecord>) -> RelativeSlot {
    match kind {
        RelationKind::Many => RelativeSlot::Many(records),
        RelationKind::One => match records.is_empty() {
            true => RelativeSlot::Null,
            false => RelativeSlot::One(records.remove(0)),
        },
    }
}

/// Verify a constraint record is an instance of the relation's target type.
pub(crate) fn check_target(record: &SharedRecord, target: &ModelType) -> OrmResult<()> {
    let model = record.model();
    if model.name != target.name {
        return Err(OrmError::NotAModel(format!(
            "expected a record of model '{}', got '{}'",
            target.name, model.name
        )));
    }
    Ok(())
}

/// Extract the comparison-field values of constraint records, verifying the
/// model type of each and requiring the value to be present.
pub(crate) fn constraint_values(
    records: &[SharedRecord],
    field: &str,
    target: &ModelType,
) -> OrmResult<Vec<serde_json::Value>> {
    let mut values = Vec::new();
    for record in records {
        check_target(record, target)?;
        let key = record.field(field).as_ref().and_then(Key::from_value).ok_or_else(|| {
            OrmError::IncorrectModel(format!(
                "constraint record of model '{}' has no value for field '{}'",
                target.name, field
            ))
        })?;
        values.push(key.to_value());
    }
    Ok(values)
}

/// The shared field-equality batch load: one IN query over the target table,
/// results grouped by the target-side field and written back onto each
/// subject's slot. Used by field relations and equality column relations.
pub(crate) async fn load_by_field_equality(
    source: &dyn DataSource,
    relation_name: &str,
    subjects: &[SharedRecord],
    owner_field: &str,
    target_field: &str,
    target: &ModelType,
    kind: RelationKind,
    scope: Option<&Scope>,
) -> OrmResult<()> {
    let keys = comparison_keys(subjects, owner_field);
    if keys.is_empty() {
        write_empty_slots(subjects, relation_name, kind);
        return Ok(());
    }

    let mut query = QueryBuilder::for_model(target);
    if let Some(scope) = scope {
        query = scope(query)?;
    }
    query = query.where_in(target_field, keys.iter().map(Key::to_value).collect());

    debug!(
        relation = relation_name,
        subjects = subjects.len(),
        keys = keys.len(),
        sql = %query.to_sql(),
        "batched relative fetch"
    );
    let relatives = source.fetch_records(&query).await?;
    let groups = group_by_field(&relatives, target_field);

    assign_groups(subjects, relation_name, owner_field, kind, &groups);
    Ok(())
}

/// Write each subject's slot from the fetched groups, keyed by the subject's
/// own comparison value. Subjects with no (or unkeyable) value get an empty
/// slot: they were loaded and found nothing.
pub(crate) fn assign_groups(
    subjects: &[SharedRecord],
    relation_name: &str,
    owner_field: &str,
    kind: RelationKind,
    groups: &HashMap<Key, Vec<SharedRecord>>,
) {
    for subject in subjects {
        let matched = subject
            .field(owner_field)
            .as_ref()
            .and_then(Key::from_value)
            .and_then(|key| groups.get(&key).cloned())
            .unwrap_or_default();
        trace!(
            relation = relation_name,
            matched = matched.len(),
            "assigning relative slot"
        );
        subject.set_relative(relation_name, slot_for(kind, matched));
    }
}
