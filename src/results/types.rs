//! Result envelope definitions

use crate::query::Page;
use serde::{Deserialize, Serialize};

/// Items returned for one page, the page that produced them and the number
/// of entities that matched the filters when the count was taken.
///
/// `total` is not re-validated against `items`; under concurrent writes it can
/// be stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult<E> {
    /// Entities in data-source order, never more than `page.limit()`
    pub items: Vec<E>,
    /// Window used for the query
    pub page: Page,
    /// Filtered match count
    pub total: u64,
}

impl<E> SearchResult<E> {
    pub fn new(items: Vec<E>, page: Page, total: u64) -> Self {
        Self { items, page, total }
    }

    /// No matches for `page`
    pub fn empty(page: Page) -> Self {
        Self {
            items: Vec::new(),
            page,
            total: 0,
        }
    }

    /// Exactly one match, as returned by single-entity lookups
    pub fn single(entity: E) -> Self {
        Self {
            items: vec![entity],
            page: Page::single(),
            total: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// First item, for single-entity lookups
    pub fn first(&self) -> Option<&E> {
        self.items.first()
    }

    /// Consume the envelope, keeping only the first item
    pub fn into_first(self) -> Option<E> {
        self.items.into_iter().next()
    }

    /// Whether pages beyond this one hold further matches
    pub fn has_more(&self) -> bool {
        self.page.has_more(self.total)
    }

    /// Page following this one, if any matches remain
    pub fn next_page(&self) -> Option<Page> {
        self.has_more().then(|| self.page.next())
    }

    /// Number of pages of this size needed to cover `total`
    pub fn page_count(&self) -> u64 {
        self.total.div_ceil(self.page.limit())
    }

    /// Convert the items while keeping page and total
    pub fn map<T>(self, f: impl FnMut(E) -> T) -> SearchResult<T> {
        SearchResult {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            total: self.total,
        }
    }
}

impl<E> IntoIterator for SearchResult<E> {
    type Item = E;
    type IntoIter = std::vec::IntoIter<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
