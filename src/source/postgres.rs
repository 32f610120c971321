//! PostgreSQL data source backed by a sqlx connection pool

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, Pool, Postgres, Row as SqlxRow};
use tracing::debug;
use uuid::Uuid;

use super::{DataSource, Row};
use crate::error::OrmResult;
use crate::query::QueryBuilder;

/// Data source that renders queries to SQL and executes them on Postgres.
///
/// All sqlx failures surface as `OrmError::Database`.
pub struct PostgresSource {
    pool: Pool<Postgres>,
}

impl PostgresSource {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl DataSource for PostgresSource {
    async fn fetch(&self, query: &QueryBuilder) -> OrmResult<Vec<Row>> {
        let sql = query.to_sql();
        debug!(%sql, "executing relative-fetch query");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_map).collect())
    }
}

/// Convert a Postgres row into a field-value map, best-effort per column.
fn row_to_map(row: &PgRow) -> Row {
    let mut map = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
            v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
            v.map(|n| Value::Number(i64::from(n).into()))
                .unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
            v.map(Value::Bool).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
            v.and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<Uuid>, _>(index) {
            v.map(|u| Value::String(u.to_string())).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(index) {
            v.map(Value::String).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<Value>, _>(index) {
            v.unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        map.insert(column.name().to_string(), value);
    }
    map
}
