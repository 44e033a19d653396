//! WHERE/JOIN/ORDER BY fragments collected by filter and ordering hooks

use crate::error::{Result, SearchError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use std::fmt;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

static COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("column pattern is valid")
});

/// Check a table name or alias before it is spliced into SQL
pub fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(SearchError::Configuration(format!(
            "invalid {} '{}'",
            kind, name
        )))
    }
}

/// Check a column reference (`column` or `alias.column`)
pub fn validate_column(name: &str) -> Result<()> {
    if COLUMN.is_match(name) {
        Ok(())
    } else {
        Err(SearchError::Configuration(format!("invalid column '{}'", name)))
    }
}

/// Prefix `column` with `alias` unless it is already qualified
pub fn qualify(alias: &str, column: &str) -> String {
    if column.contains('.') {
        column.to_string()
    } else {
        format!("{}.{}", alias, column)
    }
}

/// A value bound into a query
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn push_bind(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self.clone() {
            Self::Null => {
                qb.push("NULL");
            }
            Self::Bool(v) => {
                qb.push_bind(v);
            }
            Self::Integer(v) => {
                qb.push_bind(v);
            }
            Self::Real(v) => {
                qb.push_bind(v);
            }
            Self::Text(v) => {
                qb.push_bind(v);
            }
        }
    }
}

impl From<&serde_json::Value> for SqlValue {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Real))
                .unwrap_or(Self::Null),
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Binary comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    /// `LIKE` with `\` as the escape character
    LikeEscaped,
}

impl Comparison {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like | Self::LikeEscaped => "LIKE",
        }
    }
}

/// Escape `\`, `%` and `_` so `text` matches literally inside a LIKE pattern
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// One predicate of a WHERE clause
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        expr: String,
        op: Comparison,
        value: SqlValue,
    },
    In {
        expr: String,
        values: Vec<SqlValue>,
    },
    IsNull(String),
    IsNotNull(String),
    /// Trusted SQL, wrapped in parentheses
    Raw(String),
}

impl Condition {
    pub fn compare(expr: impl Into<String>, op: Comparison, value: impl Into<SqlValue>) -> Self {
        Self::Compare {
            expr: expr.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(expr: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(expr, Comparison::Eq, value)
    }

    pub fn like(expr: impl Into<String>, pattern: impl Into<SqlValue>) -> Self {
        Self::compare(expr, Comparison::Like, pattern)
    }

    /// Substring match; wildcards in `needle` are matched literally
    pub fn contains(expr: impl Into<String>, needle: &str) -> Self {
        Self::compare(
            expr,
            Comparison::LikeEscaped,
            format!("%{}%", escape_like(needle)),
        )
    }

    pub fn is_in(expr: impl Into<String>, values: Vec<SqlValue>) -> Self {
        Self::In {
            expr: expr.into(),
            values,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    fn push_to(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Self::Compare { expr, op, value } if value.is_null() => match op {
                Comparison::Eq => {
                    qb.push(expr).push(" IS NULL");
                }
                Comparison::Ne => {
                    qb.push(expr).push(" IS NOT NULL");
                }
                // ordering and LIKE against NULL are never true
                _ => {
                    qb.push("1 = 0");
                }
            },
            Self::Compare { expr, op, value } => {
                qb.push(expr).push(" ").push(op.as_sql()).push(" ");
                value.push_bind(qb);
                if *op == Comparison::LikeEscaped {
                    qb.push(" ESCAPE '\\'");
                }
            }
            // an empty IN list matches nothing
            Self::In { values, .. } if values.is_empty() => {
                qb.push("1 = 0");
            }
            Self::In { expr, values } => {
                qb.push(expr).push(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        qb.push(", ");
                    }
                    value.push_bind(qb);
                }
                qb.push(")");
            }
            Self::IsNull(expr) => {
                qb.push(expr).push(" IS NULL");
            }
            Self::IsNotNull(expr) => {
                qb.push(expr).push(" IS NOT NULL");
            }
            Self::Raw(sql) => {
                qb.push("(").push(sql).push(")");
            }
        }
    }
}

/// Joins and predicates accumulated for one query
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    joins: Vec<String>,
    conditions: Vec<Condition>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a JOIN fragment, e.g. `INNER JOIN authors a ON a.id = e.author_id`.
    /// Identical joins added by several hooks are kept once.
    pub fn join(&mut self, sql: impl Into<String>) -> &mut Self {
        let sql = sql.into();
        if !self.joins.contains(&sql) {
            self.joins.push(sql);
        }
        self
    }

    pub fn and_where(&mut self, condition: Condition) -> &mut Self {
        self.conditions.push(condition);
        self
    }

    pub fn joins(&self) -> &[String] {
        &self.joins
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty() && self.conditions.is_empty()
    }

    pub(crate) fn push_joins(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        for join in &self.joins {
            qb.push(" ").push(join);
        }
    }

    /// Append the conditions, opening with WHERE unless one is already open
    pub(crate) fn push_conditions(&self, qb: &mut QueryBuilder<'_, Sqlite>, where_open: bool) {
        for (i, condition) in self.conditions.iter().enumerate() {
            if i == 0 && !where_open {
                qb.push(" WHERE ");
            } else {
                qb.push(" AND ");
            }
            condition.push_to(qb);
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// Parse `asc`/`desc` in any case
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(Self::Asc),
            "desc" | "descending" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// ORDER BY terms accumulated by ordering hooks
#[derive(Debug, Clone, Default)]
pub struct OrderBy {
    terms: Vec<(String, Direction)>,
}

impl OrderBy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a term; a column that is already ordered on is ignored
    pub fn add(&mut self, expr: impl Into<String>, direction: Direction) -> &mut Self {
        let expr = expr.into();
        if !self.terms.iter().any(|(e, _)| *e == expr) {
            self.terms.push((expr, direction));
        }
        self
    }

    pub fn terms(&self) -> &[(String, Direction)] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub(crate) fn push_to(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        for (i, (expr, direction)) in self.terms.iter().enumerate() {
            qb.push(if i == 0 { " ORDER BY " } else { ", " });
            qb.push(expr).push(" ").push(direction.as_sql());
        }
    }
}
