//! Many-to-many relations through a pivot table

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{OrmError, OrmResult};
use crate::query::{QueryBuilder, RelationFilter, Scope};
use crate::record::{Key, RelativeSlot, SharedRecord};
use crate::schema::ModelType;
use crate::source::DataSource;

use super::definition::{check_target, comparison_keys, write_empty_slots, Relation, RelationKind};

/// Reserved projection alias carrying the pivot parent key alongside each
/// target row so fetched relatives can be routed back to their subjects.
pub const PIVOT_PARENT_COLUMN: &str = "__pivot_parent__";

/// Owner and target joined through `pivot_table`, where `parent_key`
/// references the owner's primary key and `child_key` the target's.
#[derive(Debug, Clone)]
pub struct PivotRelation {
    owner: ModelType,
    target: ModelType,
    pivot_table: String,
    parent_key: String,
    child_key: String,
}

impl PivotRelation {
    pub fn new(
        owner: &ModelType,
        target: &ModelType,
        pivot_table: &str,
        parent_key: &str,
        child_key: &str,
    ) -> Self {
        Self {
            owner: owner.clone(),
            target: target.clone(),
            pivot_table: pivot_table.to_string(),
            parent_key: parent_key.to_string(),
            child_key: child_key.to_string(),
        }
    }

    pub fn pivot_table(&self) -> &str {
        &self.pivot_table
    }

    fn qualified_parent_key(&self) -> String {
        format!("{}.{}", self.pivot_table, self.parent_key)
    }

    fn qualified_child_key(&self) -> String {
        format!("{}.{}", self.pivot_table, self.child_key)
    }

    /// Subjects related to specific records: an EXISTS over the bare pivot
    /// table constrained to the given child primary keys.
    fn pivot_membership(
        &self,
        query: QueryBuilder,
        records: &[SharedRecord],
        negate: bool,
    ) -> OrmResult<QueryBuilder> {
        let mut child_keys = Vec::new();
        for record in records {
            check_target(record, &self.target)?;
            let key = record.key().ok_or_else(|| {
                OrmError::IncorrectModel(format!(
                    "constraint record of model '{}' has no primary key value",
                    self.target.name
                ))
            })?;
            child_keys.push(key.to_value());
        }
        let sub = QueryBuilder::table(&self.pivot_table)
            .where_in(&self.qualified_child_key(), child_keys);
        let correlate = vec![(
            self.qualified_parent_key(),
            format!("{}.{}", query.effective_name(), self.owner.primary_key),
        )];
        Ok(match negate {
            false => query.where_exists(sub, correlate),
            true => query.where_not_exists(sub, correlate),
        })
    }

    /// Subjects related to any target satisfying `scope`: an EXISTS over the
    /// target joined to the pivot.
    fn pivot_exists(
        &self,
        query: QueryBuilder,
        scope: Option<&Scope>,
        negate: bool,
    ) -> OrmResult<QueryBuilder> {
        let mut sub = QueryBuilder::for_model(&self.target);
        // A self-pivot would otherwise correlate a column with itself.
        if sub.effective_name() == query.effective_name() {
            sub = sub.with_alias(&format!("{}_sub", self.target.table));
        }
        let target_key = format!("{}.{}", sub.effective_name(), self.target.primary_key);
        sub = sub.join(&self.pivot_table, &self.qualified_child_key(), &target_key);
        if let Some(scope) = scope {
            sub = scope(sub)?;
        }
        let correlate = vec![(
            self.qualified_parent_key(),
            format!("{}.{}", query.effective_name(), self.owner.primary_key),
        )];
        Ok(match negate {
            false => query.where_exists(sub, correlate),
            true => query.where_not_exists(sub, correlate),
        })
    }
}

#[async_trait]
impl Relation for PivotRelation {
    fn owner(&self) -> &ModelType {
        &self.owner
    }

    fn target(&self) -> &ModelType {
        &self.target
    }

    fn kind(&self) -> RelationKind {
        RelationKind::Many
    }

    fn apply_to_query(
        &self,
        query: QueryBuilder,
        filter: &RelationFilter,
        negate: bool,
    ) -> OrmResult<QueryBuilder> {
        match filter {
            RelationFilter::Record(record) => {
                self.pivot_membership(query, std::slice::from_ref(record), negate)
            }
            RelationFilter::Records(records) => self.pivot_membership(query, records, negate),
            RelationFilter::Any => self.pivot_exists(query, None, negate),
            RelationFilter::Scope(scope) => self.pivot_exists(query, Some(scope.as_ref()), negate),
        }
    }

    async fn load_relatives(
        &self,
        source: &dyn DataSource,
        relation_name: &str,
        subjects: &[SharedRecord],
        scope: Option<&Scope>,
    ) -> OrmResult<()> {
        let keys = comparison_keys(subjects, &self.owner.primary_key);
        if keys.is_empty() {
            write_empty_slots(subjects, relation_name, RelationKind::Many);
            return Ok(());
        }

        let mut query = QueryBuilder::for_model(&self.target);
        if let Some(scope) = scope {
            query = scope(query)?;
        }
        query = query
            .select(&format!("{}.*", self.target.table))
            .select_as(&self.qualified_parent_key(), PIVOT_PARENT_COLUMN)
            .join(
                &self.pivot_table,
                &self.qualified_child_key(),
                &self.target.qualified_primary_key(),
            )
            .where_in(
                &self.qualified_parent_key(),
                keys.iter().map(Key::to_value).collect(),
            );

        debug!(
            relation = relation_name,
            subjects = subjects.len(),
            keys = keys.len(),
            sql = %query.to_sql(),
            "batched pivot fetch"
        );
        let rows = source.fetch(&query).await?;

        // A target row reached from several subjects must resolve to one
        // shared instance, keyed by its primary key.
        let mut canonical: HashMap<Key, SharedRecord> = HashMap::new();
        let mut groups: HashMap<Key, Vec<SharedRecord>> = HashMap::new();
        for mut row in rows {
            let parent = match row.remove(PIVOT_PARENT_COLUMN).as_ref().and_then(Key::from_value) {
                Some(key) => key,
                None => continue,
            };
            let record = SharedRecord::from_row(self.target.clone(), row);
            let record = match record.key() {
                Some(child_key) => canonical.entry(child_key).or_insert_with(|| record).clone(),
                None => record,
            };
            groups.entry(parent).or_default().push(record);
        }

        for subject in subjects {
            let matched = subject
                .field(&self.owner.primary_key)
                .as_ref()
                .and_then(Key::from_value)
                .and_then(|key| groups.get(&key).cloned())
                .unwrap_or_default();
            subject.set_relative(relation_name, RelativeSlot::Many(matched));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap as StdHashMap;

    fn post_type() -> ModelType {
        ModelType::new("Post", "posts")
    }

    fn tag_type() -> ModelType {
        ModelType::new("Tag", "tags")
    }

    fn relation() -> PivotRelation {
        PivotRelation::new(&post_type(), &tag_type(), "post_tag", "post_id", "tag_id")
    }

    fn tag(id: i64) -> SharedRecord {
        let mut fields = StdHashMap::new();
        fields.insert("id".to_string(), json!(id));
        SharedRecord::from_row(tag_type(), fields)
    }

    #[test]
    fn record_filter_constrains_pivot_membership() {
        let query = relation()
            .apply_to_query(
                QueryBuilder::for_model(&post_type()),
                &RelationFilter::Record(tag(101)),
                false,
            )
            .unwrap();
        let sql = query.to_sql();
        assert!(sql.contains("EXISTS"), "sql: {sql}");
        assert!(sql.contains("post_tag.tag_id IN (101)"), "sql: {sql}");
        assert!(sql.contains("post_tag.post_id = posts.id"), "sql: {sql}");
    }

    #[test]
    fn record_filter_requires_persisted_target() {
        let unsaved = SharedRecord::from_row(tag_type(), StdHashMap::new());
        let err = relation()
            .apply_to_query(
                QueryBuilder::for_model(&post_type()),
                &RelationFilter::Record(unsaved),
                false,
            )
            .unwrap_err();
        assert!(matches!(err, OrmError::IncorrectModel(_)));
    }

    #[test]
    fn self_pivot_aliases_the_subquery_table() {
        let user = ModelType::new("User", "users");
        let follows = PivotRelation::new(&user, &user, "follows", "follower_id", "followed_id");
        let query = follows
            .apply_to_query(QueryBuilder::for_model(&user), &RelationFilter::Any, false)
            .unwrap();
        let sql = query.to_sql();
        assert!(sql.contains("FROM users AS users_sub"), "sql: {sql}");
        assert!(
            sql.contains("INNER JOIN follows ON follows.followed_id = users_sub.id"),
            "sql: {sql}"
        );
        // The correlation side named "users" must now be the outer table only.
        assert!(sql.contains("follows.follower_id = users.id"), "sql: {sql}");
    }

    #[test]
    fn any_filter_joins_target_through_pivot() {
        let query = relation()
            .apply_to_query(QueryBuilder::for_model(&post_type()), &RelationFilter::Any, false)
            .unwrap();
        let sql = query.to_sql();
        assert!(sql.contains("JOIN post_tag"), "sql: {sql}");
        assert!(sql.contains("post_tag.post_id = posts.id"), "sql: {sql}");
    }
}
