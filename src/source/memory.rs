//! In-memory data source

use super::traits::{DataSource, Identified};
use crate::error::Result;
use crate::query::{Page, Params};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Predicate deciding whether an entity matches the given params
pub type MemoryFilter<E> = Arc<dyn Fn(&E, &Params) -> bool + Send + Sync>;

/// Vec-backed data source. Insertion order is the result ordering.
pub struct MemorySource<E> {
    alias: String,
    items: RwLock<Vec<E>>,
    filter: Option<MemoryFilter<E>>,
}

impl<E> MemorySource<E>
where
    E: Identified + Clone + Send + Sync + 'static,
{
    pub fn new(items: Vec<E>) -> Self {
        Self {
            alias: "e".to_string(),
            items: RwLock::new(items),
            filter: None,
        }
    }

    /// Set the query alias reported by this source
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Restrict every count, page and lookup to entities accepted by `filter`
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&E, &Params) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Append an entity
    pub fn insert(&self, item: E) {
        self.items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(item);
    }

    /// Remove every entity with `id`, returning how many were removed
    pub fn remove(&self, id: &E::Id) -> usize {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        let before = items.len();
        items.retain(|item| item.id() != id);
        before - items.len()
    }

    /// Number of stored entities, ignoring filters
    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matches(&self, item: &E, params: &Params) -> bool {
        self.filter
            .as_ref()
            .map(|filter| filter(item, params))
            .unwrap_or(true)
    }
}

#[async_trait]
impl<E> DataSource for MemorySource<E>
where
    E: Identified + Clone + Send + Sync + 'static,
{
    type Entity = E;
    type Id = E::Id;

    fn alias(&self) -> &str {
        &self.alias
    }

    async fn count(&self, params: &Params) -> Result<u64> {
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        let count = items.iter().filter(|item| self.matches(item, params)).count();
        Ok(count as u64)
    }

    async fn fetch_page(&self, page: Page, params: &Params) -> Result<Vec<E>> {
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
        let batch: Vec<E> = items
            .iter()
            .filter(|item| self.matches(item, params))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        debug!(
            "memory source '{}' returned {} items at offset {}",
            self.alias,
            batch.len(),
            page.offset()
        );
        Ok(batch)
    }

    async fn fetch_one(&self, id: &E::Id, params: &Params) -> Result<Option<E>> {
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        Ok(items
            .iter()
            .find(|item| item.id() == id && self.matches(item, params))
            .cloned())
    }
}
