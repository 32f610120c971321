//! Query Builder - structured query construction over a model's table
//!
//! Queries are built as clause structures and rendered to SQL at the end, so
//! the same query can either be rendered for a SQL backend or interpreted
//! structurally (the in-memory source does the latter). A query is optionally
//! bound to a `ModelType`; operations that need to turn rows back into records
//! require the binding and fail with an incorrect-query error without it.

use std::fmt;

use serde_json::Value;

use crate::error::{OrmError, OrmResult};
use crate::schema::ModelType;

/// Comparison operators usable in where clauses and column relations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Equal => write!(f, "="),
            Comparison::NotEqual => write!(f, "!="),
            Comparison::GreaterThan => write!(f, ">"),
            Comparison::GreaterThanOrEqual => write!(f, ">="),
            Comparison::LessThan => write!(f, "<"),
            Comparison::LessThanOrEqual => write!(f, "<="),
            Comparison::Like => write!(f, "LIKE"),
        }
    }
}

/// One where clause
#[derive(Debug, Clone)]
pub enum WhereClause {
    Compare {
        column: String,
        operator: Comparison,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    Null {
        column: String,
        negated: bool,
    },
    Raw(String),
    /// Correlated EXISTS sub-query. Each correlation pair ties a column of the
    /// sub-query (left) to a column of the outer query (right), both possibly
    /// table-qualified.
    Exists {
        query: Box<QueryBuilder>,
        correlate: Vec<(String, String)>,
        negated: bool,
    },
}

/// Inner join clause: table joined on a (left column, right column) equality
#[derive(Debug, Clone)]
pub struct JoinClause {
    pub table: String,
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone)]
pub struct OrderByClause {
    pub column: String,
    pub descending: bool,
}

/// One select-list entry, optionally aliased
#[derive(Debug, Clone)]
pub struct SelectItem {
    pub expr: String,
    pub alias: Option<String>,
}

/// Query builder for constructing relative-fetch and scoping queries
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    model: Option<ModelType>,
    table: String,
    alias: Option<String>,
    select: Vec<SelectItem>,
    wheres: Vec<WhereClause>,
    joins: Vec<JoinClause>,
    order_by: Vec<OrderByClause>,
    limit: Option<i64>,
    offset: Option<i64>,
    distinct: bool,
}

impl QueryBuilder {
    /// Create a query over a bare table, not bound to any model type.
    pub fn table(table: &str) -> Self {
        Self {
            model: None,
            table: table.to_string(),
            alias: None,
            select: Vec::new(),
            wheres: Vec::new(),
            joins: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    /// Create a query scoped to a model type's table.
    pub fn for_model(model: &ModelType) -> Self {
        let mut query = Self::table(&model.table);
        query.model = Some(model.clone());
        query
    }

    pub fn model(&self) -> Option<&ModelType> {
        self.model.as_ref()
    }

    /// The bound model type, or an incorrect-query error for plain queries.
    pub fn require_model(&self) -> OrmResult<&ModelType> {
        self.model.as_ref().ok_or_else(|| {
            OrmError::IncorrectQuery(format!(
                "query over table '{}' is not bound to a model type",
                self.table
            ))
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The name the from-table is addressable under: the alias when set,
    /// otherwise the table name.
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    pub fn select_items(&self) -> &[SelectItem] {
        &self.select
    }

    pub fn wheres(&self) -> &[WhereClause] {
        &self.wheres
    }

    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    pub fn order_clauses(&self) -> &[OrderByClause] {
        &self.order_by
    }

    pub fn limit_value(&self) -> Option<i64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<i64> {
        self.offset
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Alias the from-table; needed when a sub-query targets the outer table.
    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn select(mut self, expr: &str) -> Self {
        self.select.push(SelectItem {
            expr: expr.to_string(),
            alias: None,
        });
        self
    }

    pub fn select_as(mut self, expr: &str, alias: &str) -> Self {
        self.select.push(SelectItem {
            expr: expr.to_string(),
            alias: Some(alias.to_string()),
        });
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn where_eq<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_op(column, Comparison::Equal, value)
    }

    pub fn where_ne<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_op(column, Comparison::NotEqual, value)
    }

    pub fn where_op<T: Into<Value>>(mut self, column: &str, operator: Comparison, value: T) -> Self {
        self.wheres.push(WhereClause::Compare {
            column: column.to_string(),
            operator,
            value: value.into(),
        });
        self
    }

    pub fn where_in(mut self, column: &str, values: Vec<Value>) -> Self {
        self.wheres.push(WhereClause::In {
            column: column.to_string(),
            values,
            negated: false,
        });
        self
    }

    pub fn where_not_in(mut self, column: &str, values: Vec<Value>) -> Self {
        self.wheres.push(WhereClause::In {
            column: column.to_string(),
            values,
            negated: true,
        });
        self
    }

    pub fn where_null(mut self, column: &str) -> Self {
        self.wheres.push(WhereClause::Null {
            column: column.to_string(),
            negated: false,
        });
        self
    }

    pub fn where_not_null(mut self, column: &str) -> Self {
        self.wheres.push(WhereClause::Null {
            column: column.to_string(),
            negated: true,
        });
        self
    }

    pub fn where_raw(mut self, condition: &str) -> Self {
        self.wheres.push(WhereClause::Raw(condition.to_string()));
        self
    }

    /// Attach a correlated EXISTS sub-query. Each pair in `correlate` is
    /// (sub-query column, outer column).
    pub fn where_exists(mut self, query: QueryBuilder, correlate: Vec<(String, String)>) -> Self {
        self.wheres.push(WhereClause::Exists {
            query: Box::new(query),
            correlate,
            negated: false,
        });
        self
    }

    pub fn where_not_exists(mut self, query: QueryBuilder, correlate: Vec<(String, String)>) -> Self {
        self.wheres.push(WhereClause::Exists {
            query: Box::new(query),
            correlate,
            negated: true,
        });
        self
    }

    pub fn join(mut self, table: &str, left: &str, right: &str) -> Self {
        self.joins.push(JoinClause {
            table: table.to_string(),
            left: left.to_string(),
            right: right.to_string(),
        });
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.push(OrderByClause {
            column: column.to_string(),
            descending: false,
        });
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_by.push(OrderByClause {
            column: column.to_string(),
            descending: true,
        });
        self
    }

    pub fn limit(mut self, count: i64) -> Self {
        self.limit = Some(count);
        self
    }

    pub fn offset(mut self, count: i64) -> Self {
        self.offset = Some(count);
        self
    }

    /// Render the query to SQL.
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();

        if self.distinct {
            sql.push_str("SELECT DISTINCT ");
        } else {
            sql.push_str("SELECT ");
        }

        if self.select.is_empty() {
            sql.push('*');
        } else {
            let items: Vec<String> = self
                .select
                .iter()
                .map(|item| match &item.alias {
                    Some(alias) => format!("{} AS {}", item.expr, alias),
                    None => item.expr.clone(),
                })
                .collect();
            sql.push_str(&items.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&self.table);
        if let Some(alias) = &self.alias {
            sql.push_str(&format!(" AS {}", alias));
        }

        for join in &self.joins {
            sql.push_str(&format!(
                " INNER JOIN {} ON {} = {}",
                join.table, join.left, join.right
            ));
        }

        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            let conditions: Vec<String> = self.wheres.iter().map(render_clause).collect();
            sql.push_str(&conditions.join(" AND "));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            let clauses: Vec<String> = self
                .order_by
                .iter()
                .map(|clause| {
                    if clause.descending {
                        format!("{} DESC", clause.column)
                    } else {
                        format!("{} ASC", clause.column)
                    }
                })
                .collect();
            sql.push_str(&clauses.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql
    }
}

fn render_clause(clause: &WhereClause) -> String {
    match clause {
        WhereClause::Compare {
            column,
            operator,
            value,
        } => format!("{} {} {}", column, operator, format_value(value)),
        WhereClause::In {
            column,
            values,
            negated,
        } => {
            // An empty IN list is a constant predicate: nothing is in the
            // empty set, everything is not in it.
            if values.is_empty() {
                return if *negated { "1 = 1" } else { "1 = 0" }.to_string();
            }
            let rendered: Vec<String> = values.iter().map(format_value).collect();
            let keyword = if *negated { "NOT IN" } else { "IN" };
            format!("{} {} ({})", column, keyword, rendered.join(", "))
        }
        WhereClause::Null { column, negated } => {
            if *negated {
                format!("{} IS NOT NULL", column)
            } else {
                format!("{} IS NULL", column)
            }
        }
        WhereClause::Raw(condition) => condition.clone(),
        WhereClause::Exists {
            query,
            correlate,
            negated,
        } => {
            let mut sub = (**query).clone();
            sub.select = vec![SelectItem {
                expr: "1".to_string(),
                alias: None,
            }];
            for (inner, outer) in correlate {
                sub = sub.where_raw(&format!("{} = {}", inner, outer));
            }
            let keyword = if *negated { "NOT EXISTS" } else { "EXISTS" };
            format!("{} ({})", keyword, sub.to_sql())
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "NULL".to_string(),
        Value::Array(_) | Value::Object(_) => "NULL".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_basic_select() {
        let sql = QueryBuilder::table("users")
            .where_eq("id", json!(1))
            .to_sql();
        assert_eq!(sql, "SELECT * FROM users WHERE id = 1");
    }

    #[test]
    fn renders_in_and_order() {
        let sql = QueryBuilder::table("posts")
            .where_in("author_id", vec![json!(1), json!(2)])
            .order_by_desc("id")
            .limit(10)
            .to_sql();
        assert_eq!(
            sql,
            "SELECT * FROM posts WHERE author_id IN (1, 2) ORDER BY id DESC LIMIT 10"
        );
    }

    #[test]
    fn empty_in_list_is_constant_false() {
        let sql = QueryBuilder::table("users")
            .where_in("id", Vec::new())
            .to_sql();
        assert_eq!(sql, "SELECT * FROM users WHERE 1 = 0");

        let sql = QueryBuilder::table("users")
            .where_not_in("id", Vec::new())
            .to_sql();
        assert_eq!(sql, "SELECT * FROM users WHERE 1 = 1");
    }

    #[test]
    fn renders_correlated_exists() {
        let sub = QueryBuilder::table("posts");
        let sql = QueryBuilder::table("users")
            .where_exists(sub, vec![("posts.author_id".into(), "users.id".into())])
            .to_sql();
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE EXISTS (SELECT 1 FROM posts WHERE posts.author_id = users.id)"
        );
    }

    #[test]
    fn aliases_the_from_table() {
        let sql = QueryBuilder::table("categories")
            .with_alias("categories_sub")
            .where_null("categories_sub.parent_id")
            .to_sql();
        assert_eq!(
            sql,
            "SELECT * FROM categories AS categories_sub WHERE categories_sub.parent_id IS NULL"
        );
    }

    #[test]
    fn escapes_string_values() {
        let sql = QueryBuilder::table("users")
            .where_eq("name", json!("O'Brien"))
            .to_sql();
        assert_eq!(sql, "SELECT * FROM users WHERE name = 'O''Brien'");
    }

    #[test]
    fn select_aliases_render() {
        let sql = QueryBuilder::table("tags")
            .select("tags.*")
            .select_as("post_tag.post_id", "pivot_parent")
            .join("post_tag", "post_tag.tag_id", "tags.id")
            .to_sql();
        assert_eq!(
            sql,
            "SELECT tags.*, post_tag.post_id AS pivot_parent FROM tags \
             INNER JOIN post_tag ON post_tag.tag_id = tags.id"
        );
    }

    #[test]
    fn require_model_rejects_plain_queries() {
        let query = QueryBuilder::table("users");
        assert!(matches!(
            query.require_model(),
            Err(crate::error::OrmError::IncorrectQuery(_))
        ));

        let model = crate::schema::ModelType::new("User", "users");
        let query = QueryBuilder::for_model(&model);
        assert_eq!(query.require_model().unwrap().name, "User");
    }
}
