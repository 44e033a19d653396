//! SQLite data source
//!
//! Assembles COUNT and SELECT statements for one table from:
//!
//! - the table name and query alias,
//! - repository filters (every query), list filters (count and page queries)
//!   and individual filters (id lookups),
//! - ordering hooks (page queries only), falling back to the id column,
//! - `LIMIT`/`OFFSET` pagination.
//!
//! Every value coming from params is bound as a parameter.

mod criteria;
mod hooks;

pub use criteria::{
    escape_like, qualify, validate_column, validate_identifier, Comparison, Condition, Criteria,
    Direction, OrderBy, SqlValue,
};
pub use hooks::{ColumnOrder, Filter, FilterOperator, Order, ParamFilter, ParamOrder};

use super::traits::DataSource;
use crate::error::{Result, SearchError};
use crate::query::{Page, Params};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Encode, FromRow, QueryBuilder, Sqlite, SqlitePool, Type};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Data source reading entities of type `E` keyed by `I` from one table
pub struct SqlSource<E, I = i64> {
    pool: SqlitePool,
    table: String,
    alias: String,
    id_column: String,
    repo_filters: Vec<Arc<dyn Filter>>,
    list_filters: Vec<Arc<dyn Filter>>,
    individual_filters: Vec<Arc<dyn Filter>>,
    orders: Vec<Arc<dyn Order>>,
    _entity: PhantomData<fn() -> (E, I)>,
}

impl<E, I> SqlSource<E, I> {
    pub fn builder(pool: SqlitePool, table: impl Into<String>) -> SqlSourceBuilder<E, I> {
        SqlSourceBuilder {
            pool,
            table: table.into(),
            alias: "e".to_string(),
            id_column: "id".to_string(),
            repo_filters: Vec::new(),
            list_filters: Vec::new(),
            individual_filters: Vec::new(),
            orders: Vec::new(),
            _entity: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `property` qualified with this source's alias, e.g. `e.title`
    pub fn column(&self, property: &str) -> String {
        qualify(&self.alias, property)
    }

    fn list_criteria(&self, params: &Params) -> Result<Criteria> {
        let mut criteria = Criteria::new();
        for filter in self.repo_filters.iter().chain(&self.list_filters) {
            filter.apply(&mut criteria, &self.alias, params)?;
        }
        Ok(criteria)
    }

    fn individual_criteria(&self, params: &Params) -> Result<Criteria> {
        let mut criteria = Criteria::new();
        for filter in self.individual_filters.iter().chain(&self.repo_filters) {
            filter.apply(&mut criteria, &self.alias, params)?;
        }
        Ok(criteria)
    }

    fn order_by(&self, page: Page, params: &Params) -> Result<OrderBy> {
        let mut order = OrderBy::new();
        for hook in &self.orders {
            hook.apply(&mut order, &self.alias, page, params)?;
        }
        // id as the last key keeps page boundaries stable across queries
        order.add(self.column(&self.id_column), Direction::Asc);
        Ok(order)
    }

    fn select_from<'args>(&self, select: &str) -> QueryBuilder<'args, Sqlite> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(select)
            .push(" FROM ")
            .push(&self.table)
            .push(" ")
            .push(&self.alias);
        qb
    }

    pub(crate) fn count_query<'args>(&self, params: &Params) -> Result<QueryBuilder<'args, Sqlite>> {
        let criteria = self.list_criteria(params)?;
        let mut qb = self.select_from(&format!("COUNT({})", self.column(&self.id_column)));
        criteria.push_joins(&mut qb);
        criteria.push_conditions(&mut qb, false);
        Ok(qb)
    }

    pub(crate) fn page_query<'args>(
        &self,
        page: Page,
        params: &Params,
    ) -> Result<QueryBuilder<'args, Sqlite>> {
        let criteria = self.list_criteria(params)?;
        let order = self.order_by(page, params)?;

        let mut qb = self.select_from(&format!("{}.*", self.alias));
        criteria.push_joins(&mut qb);
        criteria.push_conditions(&mut qb, false);
        order.push_to(&mut qb);
        qb.push(" LIMIT ")
            .push_bind(i64::try_from(page.limit()).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
        Ok(qb)
    }
}

impl<E, I> SqlSource<E, I>
where
    I: for<'q> Encode<'q, Sqlite> + Type<Sqlite> + Clone + Send + Sync + 'static,
{
    pub(crate) fn individual_query<'args>(
        &self,
        id: &I,
        params: &Params,
    ) -> Result<QueryBuilder<'args, Sqlite>> {
        let criteria = self.individual_criteria(params)?;

        let mut qb = self.select_from(&format!("{}.*", self.alias));
        criteria.push_joins(&mut qb);
        qb.push(" WHERE ")
            .push(self.column(&self.id_column))
            .push(" = ")
            .push_bind(id.clone());
        criteria.push_conditions(&mut qb, true);
        // a second row means the lookup is ambiguous
        qb.push(" LIMIT 2");
        Ok(qb)
    }
}

#[async_trait]
impl<E, I> DataSource for SqlSource<E, I>
where
    E: for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'static,
    I: for<'q> Encode<'q, Sqlite> + Type<Sqlite> + Clone + Send + Sync + 'static,
{
    type Entity = E;
    type Id = I;

    fn alias(&self) -> &str {
        &self.alias
    }

    async fn count(&self, params: &Params) -> Result<u64> {
        let mut qb = self.count_query(params)?;
        debug!("count on {}: {}", self.table, qb.sql());

        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn fetch_page(&self, page: Page, params: &Params) -> Result<Vec<E>> {
        let mut qb = self.page_query(page, params)?;
        debug!(
            "page on {} (offset {}, limit {}): {}",
            self.table,
            page.offset(),
            page.limit(),
            qb.sql()
        );

        let rows = qb.build_query_as::<E>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn fetch_one(&self, id: &I, params: &Params) -> Result<Option<E>> {
        let mut qb = self.individual_query(id, params)?;
        debug!("lookup on {}: {}", self.table, qb.sql());

        let mut rows = qb.build_query_as::<E>().fetch_all(&self.pool).await?;
        if rows.len() > 1 {
            return Err(SearchError::NonUniqueResult(self.table.clone()));
        }
        Ok(rows.pop())
    }
}

/// Builder for [`SqlSource`]; identifiers are validated in [`build`](Self::build)
pub struct SqlSourceBuilder<E, I = i64> {
    pool: SqlitePool,
    table: String,
    alias: String,
    id_column: String,
    repo_filters: Vec<Arc<dyn Filter>>,
    list_filters: Vec<Arc<dyn Filter>>,
    individual_filters: Vec<Arc<dyn Filter>>,
    orders: Vec<Arc<dyn Order>>,
    _entity: PhantomData<fn() -> (E, I)>,
}

impl<E, I> SqlSourceBuilder<E, I> {
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    /// Filter applied to counts, pages and id lookups
    pub fn repo_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.repo_filters.push(Arc::new(filter));
        self
    }

    /// Filter applied to counts and pages only
    pub fn list_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.list_filters.push(Arc::new(filter));
        self
    }

    /// Filter applied to id lookups only, next to the id predicate
    pub fn individual_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.individual_filters.push(Arc::new(filter));
        self
    }

    /// Ordering for page queries; hooks apply in the order they were added
    pub fn order(mut self, order: impl Order + 'static) -> Self {
        self.orders.push(Arc::new(order));
        self
    }

    pub fn build(self) -> Result<SqlSource<E, I>> {
        validate_identifier("table", &self.table)?;
        validate_identifier("alias", &self.alias)?;
        validate_identifier("id column", &self.id_column)?;

        Ok(SqlSource {
            pool: self.pool,
            table: self.table,
            alias: self.alias,
            id_column: self.id_column,
            repo_filters: self.repo_filters,
            list_filters: self.list_filters,
            individual_filters: self.individual_filters,
            orders: self.orders,
            _entity: PhantomData,
        })
    }
}
