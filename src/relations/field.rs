//! Field-equality relations (has-one, has-many, belongs-to)
//!
//! Both directions of a foreign-key association reduce to the same shape: a
//! field on the owner compared for equality against a field on the target.
//! Construction chooses which side carries the foreign key.

use async_trait::async_trait;

use crate::error::{OrmError, OrmResult};
use crate::query::{QueryBuilder, RelationFilter, Scope};
use crate::schema::ModelType;
use crate::source::DataSource;

use super::definition::{
    check_target, constraint_values, load_by_field_equality, Relation, RelationKind,
};
use crate::record::SharedRecord;

/// A relation matching `owner.owner_field = target.target_field`.
#[derive(Debug, Clone)]
pub struct FieldRelation {
    owner: ModelType,
    target: ModelType,
    owner_field: String,
    target_field: String,
    kind: RelationKind,
}

impl FieldRelation {
    /// One owner row to many target rows carrying `foreign_key`.
    pub fn has_many(owner: &ModelType, target: &ModelType, foreign_key: &str) -> Self {
        Self {
            owner: owner.clone(),
            target: target.clone(),
            owner_field: owner.primary_key.clone(),
            target_field: foreign_key.to_string(),
            kind: RelationKind::Many,
        }
    }

    /// Like `has_many` but resolving to at most one target row.
    pub fn has_one(owner: &ModelType, target: &ModelType, foreign_key: &str) -> Self {
        Self {
            kind: RelationKind::One,
            ..Self::has_many(owner, target, foreign_key)
        }
    }

    /// The inverse direction: the owner carries `foreign_key` pointing at the
    /// target's primary key.
    pub fn belongs_to(owner: &ModelType, target: &ModelType, foreign_key: &str) -> Self {
        Self {
            owner: owner.clone(),
            target: target.clone(),
            owner_field: foreign_key.to_string(),
            target_field: target.primary_key.clone(),
            kind: RelationKind::One,
        }
    }

    pub fn owner_field(&self) -> &str {
        &self.owner_field
    }

    pub fn target_field(&self) -> &str {
        &self.target_field
    }

    fn exists_subquery(
        &self,
        outer: &QueryBuilder,
        scope: Option<&Scope>,
    ) -> OrmResult<(QueryBuilder, Vec<(String, String)>)> {
        let mut sub = QueryBuilder::for_model(&self.target);
        // A self-relation would otherwise correlate a column with itself.
        if sub.effective_name() == outer.effective_name() {
            let alias = format!("{}_sub", self.target.table);
            sub = sub.with_alias(&alias);
        }
        if let Some(scope) = scope {
            sub = scope(sub)?;
        }
        let correlate = vec![(
            format!("{}.{}", sub.effective_name(), self.target_field),
            format!("{}.{}", outer.effective_name(), self.owner_field),
        )];
        Ok((sub, correlate))
    }
}

#[async_trait]
impl Relation for FieldRelation {
    fn owner(&self) -> &ModelType {
        &self.owner
    }

    fn target(&self) -> &ModelType {
        &self.target
    }

    fn kind(&self) -> RelationKind {
        self.kind
    }

    fn apply_to_query(
        &self,
        query: QueryBuilder,
        filter: &RelationFilter,
        negate: bool,
    ) -> OrmResult<QueryBuilder> {
        match filter {
            RelationFilter::Record(record) => {
                check_target(record, &self.target)?;
                let values =
                    constraint_values(std::slice::from_ref(record), &self.target_field, &self.target)?;
                let column = self.owner_field.clone();
                Ok(match negate {
                    false => query.where_eq(&column, values.into_iter().next().ok_or_else(|| {
                        OrmError::IncorrectModel("constraint record has no comparison value".into())
                    })?),
                    true => query.where_not_in(&column, values),
                })
            }
            RelationFilter::Records(records) => {
                let values = constraint_values(records, &self.target_field, &self.target)?;
                let column = self.owner_field.clone();
                Ok(match negate {
                    false => query.where_in(&column, values),
                    true => query.where_not_in(&column, values),
                })
            }
            RelationFilter::Any => {
                let (sub, correlate) = self.exists_subquery(&query, None)?;
                Ok(match negate {
                    false => query.where_exists(sub, correlate),
                    true => query.where_not_exists(sub, correlate),
                })
            }
            RelationFilter::Scope(scope) => {
                let (sub, correlate) = self.exists_subquery(&query, Some(scope.as_ref()))?;
                Ok(match negate {
                    false => query.where_exists(sub, correlate),
                    true => query.where_not_exists(sub, correlate),
                })
            }
        }
    }

    async fn load_relatives(
        &self,
        source: &dyn DataSource,
        relation_name: &str,
        subjects: &[SharedRecord],
        scope: Option<&Scope>,
    ) -> OrmResult<()> {
        load_by_field_equality(
            source,
            relation_name,
            subjects,
            &self.owner_field,
            &self.target_field,
            &self.target,
            self.kind,
            scope,
        )
        .await
    }
}
