//! Generic column-comparison relations
//!
//! Relates two model types by comparing one column against another under an
//! arbitrary operator. Equality behaves exactly like a field relation; other
//! operators can still contribute query predicates but are not batchable.

use async_trait::async_trait;

use crate::error::{OrmError, OrmResult};
use crate::query::{Comparison, QueryBuilder, RelationFilter, Scope};
use crate::record::{Key, SharedRecord};
use crate::schema::ModelType;
use crate::source::DataSource;

use super::definition::{
    check_target, constraint_values, load_by_field_equality, Relation, RelationKind,
};

/// A relation matching `owner.owner_column <op> target.target_column`.
#[derive(Debug, Clone)]
pub struct ColumnRelation {
    owner: ModelType,
    target: ModelType,
    owner_column: String,
    target_column: String,
    operator: Comparison,
    kind: RelationKind,
}

impl ColumnRelation {
    pub fn new(
        owner: &ModelType,
        target: &ModelType,
        owner_column: &str,
        operator: Comparison,
        target_column: &str,
        kind: RelationKind,
    ) -> Self {
        Self {
            owner: owner.clone(),
            target: target.clone(),
            owner_column: owner_column.to_string(),
            target_column: target_column.to_string(),
            operator,
            kind,
        }
    }

    pub fn operator(&self) -> Comparison {
        self.operator
    }

    fn not_batchable(&self) -> OrmError {
        OrmError::InvalidArgument(format!(
            "relation comparing {}.{} {} {}.{} cannot be batch-loaded; only equality \
             column relations support loading",
            self.owner.table, self.owner_column, self.operator, self.target.table, self.target_column
        ))
    }

    fn exists_subquery(
        &self,
        outer: &QueryBuilder,
        scope: Option<&Scope>,
    ) -> OrmResult<QueryBuilder> {
        let mut sub = QueryBuilder::for_model(&self.target);
        if sub.effective_name() == outer.effective_name() {
            sub = sub.with_alias(&format!("{}_sub", self.target.table));
        }
        if let Some(scope) = scope {
            sub = scope(sub)?;
        }
        Ok(sub)
    }

    fn exists_correlation(&self, sub: &QueryBuilder, outer: &QueryBuilder) -> (QueryBuilder, Vec<(String, String)>) {
        let inner = format!("{}.{}", sub.effective_name(), self.target_column);
        let outer_col = format!("{}.{}", outer.effective_name(), self.owner_column);
        match self.operator {
            Comparison::Equal => (sub.clone(), vec![(inner, outer_col)]),
            // Non-equality correlation has no structured form; rendered raw.
            op => (
                sub.clone().where_raw(&format!("{inner} {op} {outer_col}")),
                Vec::new(),
            ),
        }
    }
}

#[async_trait]
impl Relation for ColumnRelation {
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
                let value = record
                    .field(&self.target_column)
                    .as_ref()
                    .and_then(Key::from_value)
                    .ok_or_else(|| {
                        OrmError::IncorrectModel(format!(
                            "constraint record of model '{}' has no value for column '{}'",
                            self.target.name, self.target_column
                        ))
                    })?
                    .to_value();
                let column = self.owner_column.clone();
                match (self.operator, negate) {
                    (_, false) => Ok(query.where_op(&column, self.operator, value)),
                    (Comparison::Equal, true) => Ok(query.where_not_in(&column, vec![value])),
                    (op, true) => Err(OrmError::InvalidArgument(format!(
                        "cannot negate a record constraint under operator {op}"
                    ))),
                }
            }
            RelationFilter::Records(records) => {
                if self.operator != Comparison::Equal {
                    return Err(OrmError::InvalidArgument(format!(
                        "a record-set constraint requires an equality relation, not {}",
                        self.operator
                    )));
                }
                let values = constraint_values(records, &self.target_column, &self.target)?;
                let column = self.owner_column.clone();
                Ok(match negate {
                    false => query.where_in(&column, values),
                    true => query.where_not_in(&column, values),
                })
            }
            RelationFilter::Any => {
                let sub = self.exists_subquery(&query, None)?;
                let (sub, correlate) = self.exists_correlation(&sub, &query);
                Ok(match negate {
                    false => query.where_exists(sub, correlate),
                    true => query.where_not_exists(sub, correlate),
                })
            }
            RelationFilter::Scope(scope) => {
                let sub = self.exists_subquery(&query, Some(scope.as_ref()))?;
                let (sub, correlate) = self.exists_correlation(&sub, &query);
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
        if self.operator != Comparison::Equal {
            return Err(self.not_batchable());
        }
        load_by_field_equality(
            source,
            relation_name,
            subjects,
            &self.owner_column,
            &self.target_column,
            &self.target,
            self.kind,
            scope,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use serde_json::json;
    use std::collections::HashMap;

    fn event_type() -> ModelType {
        ModelType::new("Event", "events")
    }

    fn session_type() -> ModelType {
        ModelType::new("Session", "sessions")
    }

    fn record(model: &ModelType, pairs: &[(&str, serde_json::Value)]) -> SharedRecord {
        let mut fields = HashMap::new();
        for (name, value) in pairs {
            fields.insert((*name).to_string(), value.clone());
        }
        SharedRecord::from_row(model.clone(), fields)
    }

    #[test]
    fn record_filter_uses_the_configured_operator() {
        let rel = ColumnRelation::new(
            &event_type(),
            &session_type(),
            "started_at",
            Comparison::GreaterThanOrEqual,
            "opened_at",
            RelationKind::Many,
        );
        let session = record(&session_type(), &[("opened_at", json!(100))]);
        let query = rel
            .apply_to_query(
                QueryBuilder::for_model(&event_type()),
                &RelationFilter::Record(session),
                false,
            )
            .unwrap();
        assert_eq!(query.to_sql(), "SELECT * FROM events WHERE started_at >= 100");
    }

    #[test]
    fn non_equality_negation_is_rejected() {
        let rel = ColumnRelation::new(
            &event_type(),
            &session_type(),
            "started_at",
            Comparison::GreaterThan,
            "opened_at",
            RelationKind::Many,
        );
        let session = record(&session_type(), &[("opened_at", json!(100))]);
        let err = rel
            .apply_to_query(
                QueryBuilder::for_model(&event_type()),
                &RelationFilter::Record(session),
                true,
            )
            .unwrap_err();
        assert!(matches!(err, OrmError::InvalidArgument(_)));
    }

    #[test]
    fn any_filter_renders_raw_comparison_for_non_equality() {
        let rel = ColumnRelation::new(
            &event_type(),
            &session_type(),
            "started_at",
            Comparison::GreaterThan,
            "opened_at",
            RelationKind::Many,
        );
        let query = rel
            .apply_to_query(QueryBuilder::for_model(&event_type()), &RelationFilter::Any, false)
            .unwrap();
        let sql = query.to_sql();
        assert!(sql.contains("sessions.opened_at > events.started_at"), "sql: {sql}");
    }

    #[tokio::test]
    async fn non_equality_relation_refuses_batch_loading() {
        let rel = ColumnRelation::new(
            &event_type(),
            &session_type(),
            "started_at",
            Comparison::LessThan,
            "opened_at",
            RelationKind::Many,
        );
        let source = MemorySource::new();
        let subject = record(&event_type(), &[("id", json!(1)), ("started_at", json!(5))]);
        let err = rel
            .load_relatives(&source, "sessions", &[subject], None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::InvalidArgument(_)));
    }
}
