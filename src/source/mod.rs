//! Data Sources - the query-execution boundary
//!
//! The loaders never talk to a database directly; they hand a structured
//! `QueryBuilder` to a `DataSource` and get rows back as field-value maps.
//! `PostgresSource` renders to SQL and runs it through sqlx; `MemorySource`
//! interprets the query structurally, which is what the test suite runs on.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OrmResult;
use crate::query::QueryBuilder;
use crate::record::SharedRecord;

pub use memory::MemorySource;
pub use postgres::PostgresSource;

/// A fetched row as a field-value map.
pub type Row = HashMap<String, Value>;

/// A handle capable of running queries and returning rows.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Execute the query and return its rows.
    async fn fetch(&self, query: &QueryBuilder) -> OrmResult<Vec<Row>>;

    /// Execute a model-bound query and convert the rows to records.
    async fn fetch_records(&self, query: &QueryBuilder) -> OrmResult<Vec<SharedRecord>> {
        let model = query.require_model()?.clone();
        let rows = self.fetch(query).await?;
        Ok(rows
            .into_iter()
            .map(|row| SharedRecord::from_row(model.clone(), row))
            .collect())
    }
}
