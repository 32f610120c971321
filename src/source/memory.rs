//! In-memory data source
//!
//! Interprets the structured query clauses directly instead of rendering SQL,
//! so the full loading engine can run against seeded tables. Every fetch is
//! appended to a query log, which is how the test suite asserts the batched
//! query-count invariants.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{DataSource, Row};
use crate::error::{OrmError, OrmResult};
use crate::query::builder::{Comparison, QueryBuilder, WhereClause};

/// One candidate result during evaluation: the from-table row plus any joined
/// rows, each addressable under its table name or alias.
type Frame = Vec<(String, Row)>;

/// In-memory tables plus a query log.
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: HashMap<String, Vec<Row>>,
    log: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row given as a JSON object. Non-object values are ignored.
    pub fn insert(&mut self, table: &str, row: Value) {
        if let Value::Object(map) = row {
            self.insert_row(table, map.into_iter().collect());
        }
    }

    pub fn insert_row(&mut self, table: &str, row: Row) {
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    /// Every query issued so far, in order, rendered to SQL.
    pub fn query_log(&self) -> Vec<String> {
        self.lock_log().clone()
    }

    pub fn queries_issued(&self) -> usize {
        self.lock_log().len()
    }

    pub fn clear_log(&self) {
        self.lock_log().clear();
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Candidate frames for the query: base table rows crossed with the rows
    /// of each inner join whose on-condition holds.
    fn frames(&self, query: &QueryBuilder) -> Vec<Frame> {
        let base_name = query.effective_name().to_string();
        let base_rows = self
            .tables
            .get(query.table_name())
            .cloned()
            .unwrap_or_default();
        let mut frames: Vec<Frame> = base_rows
            .into_iter()
            .map(|row| vec![(base_name.clone(), row)])
            .collect();

        for join in query.joins() {
            let join_rows = self.tables.get(&join.table).cloned().unwrap_or_default();
            let mut joined = Vec::new();
            for frame in frames {
                for row in &join_rows {
                    let mut candidate = frame.clone();
                    candidate.push((join.table.clone(), row.clone()));
                    let left = resolve(&candidate, &join.left);
                    let right = resolve(&candidate, &join.right);
                    if !left.is_null() && !right.is_null() && values_equal(&left, &right) {
                        joined.push(candidate);
                    }
                }
            }
            frames = joined;
        }
        frames
    }

    fn matches(&self, query: &QueryBuilder, frame: &Frame, outer: &Frame) -> OrmResult<bool> {
        for clause in query.wheres() {
            if !self.eval_clause(clause, frame, outer)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn eval_clause(&self, clause: &WhereClause, frame: &Frame, outer: &Frame) -> OrmResult<bool> {
        match clause {
            WhereClause::Compare {
                column,
                operator,
                value,
            } => Ok(compare(&resolve(frame, column), *operator, value)),
            WhereClause::In {
                column,
                values,
                negated,
            } => {
                let left = resolve(frame, column);
                if left.is_null() {
                    return Ok(false);
                }
                let contained = values.iter().any(|v| values_equal(&left, v));
                Ok(contained != *negated)
            }
            WhereClause::Null { column, negated } => {
                Ok(resolve(frame, column).is_null() != *negated)
            }
            WhereClause::Raw(condition) => Err(OrmError::InvalidArgument(format!(
                "memory source cannot evaluate raw predicate '{}'",
                condition
            ))),
            WhereClause::Exists {
                query: sub,
                correlate,
                negated,
            } => {
                let mut context = frame.clone();
                context.extend(outer.iter().cloned());
                let found = self.exists(sub, correlate, &context)?;
                Ok(found != *negated)
            }
        }
    }

    fn exists(
        &self,
        sub: &QueryBuilder,
        correlate: &[(String, String)],
        context: &Frame,
    ) -> OrmResult<bool> {
        for frame in self.frames(sub) {
            if !self.matches(sub, &frame, context)? {
                continue;
            }
            let correlated = correlate.iter().all(|(inner_col, outer_col)| {
                let inner = resolve(&frame, inner_col);
                let outer = resolve(context, outer_col);
                !inner.is_null() && !outer.is_null() && values_equal(&inner, &outer)
            });
            if correlated {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn project(&self, query: &QueryBuilder, frame: &Frame) -> Row {
        if query.select_items().is_empty() {
            return frame
                .first()
                .map(|(_, row)| row.clone())
                .unwrap_or_default();
        }
        let mut out = Row::new();
        for item in query.select_items() {
            if item.expr == "*" {
                if let Some((_, row)) = frame.first() {
                    out.extend(row.clone());
                }
            } else if let Some(table) = item.expr.strip_suffix(".*") {
                if let Some((_, row)) = frame.iter().find(|(name, _)| name == table) {
                    out.extend(row.clone());
                }
            } else {
                let value = resolve(frame, &item.expr);
                let name = item.alias.clone().unwrap_or_else(|| {
                    item.expr
                        .rsplit('.')
                        .next()
                        .unwrap_or(item.expr.as_str())
                        .to_string()
                });
                out.insert(name, value);
            }
        }
        out
    }

    fn run(&self, query: &QueryBuilder) -> OrmResult<Vec<Row>> {
        let outer = Frame::new();
        let mut hits: Vec<Frame> = Vec::new();
        for frame in self.frames(query) {
            if self.matches(query, &frame, &outer)? {
                hits.push(frame);
            }
        }

        for clause in query.order_clauses().iter().rev() {
            hits.sort_by(|a, b| {
                let ordering = value_cmp(&resolve(a, &clause.column), &resolve(b, &clause.column));
                if clause.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let mut rows: Vec<Row> = hits
            .iter()
            .map(|frame| self.project(query, frame))
            .collect();

        if query.is_distinct() {
            let mut seen = std::collections::HashSet::new();
            rows.retain(|row| seen.insert(Value::Object(row.clone().into_iter().collect()).to_string()));
        }
        if let Some(offset) = query.offset_value() {
            let offset = offset.max(0) as usize;
            rows = rows.into_iter().skip(offset).collect();
        }
        if let Some(limit) = query.limit_value() {
            let limit = limit.max(0) as usize;
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn fetch(&self, query: &QueryBuilder) -> OrmResult<Vec<Row>> {
        self.lock_log().push(query.to_sql());
        self.run(query)
    }
}

/// Look a column up in a frame: qualified names address a specific table
/// entry, bare names hit the first table carrying the column.
fn resolve(frame: &Frame, column: &str) -> Value {
    match column.split_once('.') {
        Some((table, col)) => frame
            .iter()
            .find(|(name, _)| name == table)
            .and_then(|(_, row)| row.get(col))
            .cloned()
            .unwrap_or(Value::Null),
        None => frame
            .iter()
            .find_map(|(_, row)| row.get(column))
            .cloned()
            .unwrap_or(Value::Null),
    }
}

/// Loose equality: integers compare exactly, other numbers numerically,
/// everything else structurally. Going through f64 first would collapse
/// distinct integers beyond 2^53.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
    }
}

fn value_cmp(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn compare(left: &Value, operator: Comparison, right: &Value) -> bool {
    if left.is_null() || right.is_null() {
        return false;
    }
    match operator {
        Comparison::Equal => values_equal(left, right),
        Comparison::NotEqual => !values_equal(left, right),
        Comparison::Like => match (left.as_str(), right.as_str()) {
            (Some(text), Some(pattern)) => like_match(text, pattern),
            _ => false,
        },
        Comparison::GreaterThan => value_cmp(left, right) == Ordering::Greater,
        Comparison::GreaterThanOrEqual => value_cmp(left, right) != Ordering::Less,
        Comparison::LessThan => value_cmp(left, right) == Ordering::Less,
        Comparison::LessThanOrEqual => value_cmp(left, right) != Ordering::Greater,
    }
}

/// Minimal LIKE: '%' wildcards only.
fn like_match(text: &str, pattern: &str) -> bool {
    if !pattern.contains('%') {
        return text == pattern;
    }
    let parts: Vec<&str> = pattern.split('%').collect();
    let mut pos = 0;
    for (index, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if index == 0 {
            if !text.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if index == parts.len() - 1 && !pattern.ends_with('%') {
            return text.len() >= pos && text[pos..].ends_with(part);
        } else {
            match text[pos..].find(part) {
                Some(found) => pos += found + part.len(),
                None => return false,
            }
        }
    }
    true
}
