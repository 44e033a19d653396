//! Data source contract consumed by the search service

use crate::error::Result;
use crate::query::{Page, Params};
use async_trait::async_trait;

/// Something that can count, page through and look up filtered entities.
///
/// How `Params` turn into filters and which ordering keeps pages stable is
/// entirely up to the implementation. The search service only relies on:
///
/// - `count` returning the number of entities the same `params` would page over,
/// - `fetch_page` returning at most `page.limit()` entities for
///   `[page.offset(), page.end())` under a stable ordering,
/// - `fetch_one` returning `Ok(None)` for a miss rather than an error.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Entity type produced by this source
    type Entity: Send;
    /// Identifier used for single-entity lookups
    type Id: Send + Sync + ?Sized;

    /// Name used to refer to the entity inside queries (e.g. `e` in `e.id`)
    fn alias(&self) -> &str {
        "e"
    }

    /// Number of entities matching `params`
    async fn count(&self, params: &Params) -> Result<u64>;

    /// Entities matching `params` within `page`
    async fn fetch_page(&self, page: Page, params: &Params) -> Result<Vec<Self::Entity>>;

    /// Entity with `id`, further constrained by `params`
    async fn fetch_one(&self, id: &Self::Id, params: &Params) -> Result<Option<Self::Entity>>;
}

/// Entities that expose an identifier, used by [`super::MemorySource`]
pub trait Identified {
    type Id: PartialEq + Send + Sync;

    fn id(&self) -> &Self::Id;
}

#[async_trait]
impl<S> DataSource for std::sync::Arc<S>
where
    S: DataSource + ?Sized,
{
    type Entity = S::Entity;
    type Id = S::Id;

    fn alias(&self) -> &str {
        (**self).alias()
    }

    async fn count(&self, params: &Params) -> Result<u64> {
        (**self).count(params).await
    }

    async fn fetch_page(&self, page: Page, params: &Params) -> Result<Vec<Self::Entity>> {
        (**self).fetch_page(page, params).await
    }

    async fn fetch_one(&self, id: &Self::Id, params: &Params) -> Result<Option<Self::Entity>> {
        (**self).fetch_one(id, params).await
    }
}
