//! Filter and ordering strategies plugged into a [`super::SqlSource`]

use super::criteria::{
    qualify, validate_column, Comparison, Condition, Criteria, Direction, OrderBy, SqlValue,
};
use crate::error::Result;
use crate::query::{Page, Params};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Adds joins and WHERE predicates derived from the params.
///
/// Any `Fn(&mut Criteria, &str, &Params)` closure is a filter; the `&str` is
/// the query alias.
pub trait Filter: Send + Sync {
    fn apply(&self, criteria: &mut Criteria, alias: &str, params: &Params) -> Result<()>;
}

impl<F> Filter for F
where
    F: Fn(&mut Criteria, &str, &Params) + Send + Sync,
{
    fn apply(&self, criteria: &mut Criteria, alias: &str, params: &Params) -> Result<()> {
        self(criteria, alias, params);
        Ok(())
    }
}

/// Adds ORDER BY terms to list queries
pub trait Order: Send + Sync {
    fn apply(&self, order: &mut OrderBy, alias: &str, page: Page, params: &Params) -> Result<()>;
}

/// Operators usable from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    #[default]
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    /// `LIKE` with the param used as the pattern
    Like,
    /// `LIKE '%value%'`
    Contains,
    /// `IN (...)` over an array param; a scalar becomes a one-element list
    In,
}

/// Compares `column` to the param named `param` when that param is present
#[derive(Debug, Clone)]
pub struct ParamFilter {
    param: String,
    column: String,
    operator: FilterOperator,
}

impl ParamFilter {
    pub fn new(
        param: impl Into<String>,
        column: impl Into<String>,
        operator: FilterOperator,
    ) -> Result<Self> {
        let column = column.into();
        validate_column(&column)?;
        Ok(Self {
            param: param.into(),
            column,
            operator,
        })
    }

    /// Equality filter where the param and column share a name
    pub fn equals(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::new(name.clone(), name, FilterOperator::Eq)
    }

    pub fn param(&self) -> &str {
        &self.param
    }
}

impl Filter for ParamFilter {
    fn apply(&self, criteria: &mut Criteria, alias: &str, params: &Params) -> Result<()> {
        let Some(value) = params.get(&self.param).filter(|v| !v.is_null()) else {
            return Ok(());
        };
        let expr = qualify(alias, &self.column);

        let condition = match self.operator {
            FilterOperator::Eq => Condition::compare(expr, Comparison::Eq, SqlValue::from(value)),
            FilterOperator::Ne => Condition::compare(expr, Comparison::Ne, SqlValue::from(value)),
            FilterOperator::Lt => Condition::compare(expr, Comparison::Lt, SqlValue::from(value)),
            FilterOperator::Lte => {
                Condition::compare(expr, Comparison::Lte, SqlValue::from(value))
            }
            FilterOperator::Gt => Condition::compare(expr, Comparison::Gt, SqlValue::from(value)),
            FilterOperator::Gte => {
                Condition::compare(expr, Comparison::Gte, SqlValue::from(value))
            }
            FilterOperator::Like => Condition::like(expr, SqlValue::from(value)),
            FilterOperator::Contains => {
                let needle = value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string());
                Condition::contains(expr, &needle)
            }
            FilterOperator::In => {
                let values = match value.as_array() {
                    Some(items) => items.iter().map(SqlValue::from).collect(),
                    None => vec![SqlValue::from(value)],
                };
                Condition::is_in(expr, values)
            }
        };

        criteria.and_where(condition);
        Ok(())
    }
}

/// Fixed ORDER BY term
#[derive(Debug, Clone)]
pub struct ColumnOrder {
    column: String,
    direction: Direction,
}

impl ColumnOrder {
    pub fn new(column: impl Into<String>, direction: Direction) -> Result<Self> {
        let column = column.into();
        validate_column(&column)?;
        Ok(Self { column, direction })
    }

    pub fn asc(column: impl Into<String>) -> Result<Self> {
        Self::new(column, Direction::Asc)
    }

    pub fn desc(column: impl Into<String>) -> Result<Self> {
        Self::new(column, Direction::Desc)
    }
}

impl Order for ColumnOrder {
    fn apply(&self, order: &mut OrderBy, alias: &str, _page: Page, _params: &Params) -> Result<()> {
        order.add(qualify(alias, &self.column), self.direction);
        Ok(())
    }
}

/// Caller-chosen ordering read from params, restricted to an allow-list.
///
/// Reads the column from `sort` and the direction from `order` by default.
/// Columns outside the allow-list are ignored, never spliced into SQL.
#[derive(Debug, Clone)]
pub struct ParamOrder {
    sort_param: String,
    direction_param: String,
    allowed: Vec<String>,
}

impl ParamOrder {
    pub fn new<I, S>(allowed: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: Vec<String> = allowed.into_iter().map(Into::into).collect();
        for column in &allowed {
            validate_column(column)?;
        }
        Ok(Self {
            sort_param: "sort".to_string(),
            direction_param: "order".to_string(),
            allowed,
        })
    }

    /// Read column and direction from differently named params
    pub fn with_params(
        mut self,
        sort_param: impl Into<String>,
        direction_param: impl Into<String>,
    ) -> Self {
        self.sort_param = sort_param.into();
        self.direction_param = direction_param.into();
        self
    }
}

impl Order for ParamOrder {
    fn apply(&self, order: &mut OrderBy, alias: &str, _page: Page, params: &Params) -> Result<()> {
        let Some(column) = params.get_str(&self.sort_param) else {
            return Ok(());
        };
        if !self.allowed.iter().any(|c| c == column) {
            debug!("ignoring sort on non-sortable column '{}'", column);
            return Ok(());
        }

        let direction = params
            .get_str(&self.direction_param)
            .and_then(Direction::parse)
            .unwrap_or_default();
        order.add(qualify(alias, column), direction);
        Ok(())
    }
}
