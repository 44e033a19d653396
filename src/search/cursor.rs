//! Chunk-by-chunk cursor over a filtered result set

use crate::error::Result;
use crate::query::{Page, Params};
use crate::source::DataSource;
use tracing::{debug, warn};

/// Walks a result set one page at a time.
///
/// The total is counted once, on the first call to [`next_chunk`](Self::next_chunk)
/// or [`total`](Self::total); chunks are then fetched until the offset
/// reaches that total. Rows inserted or deleted by concurrent writers while
/// the cursor advances can shift later chunks, so items may be skipped or
/// seen twice.
pub struct ChunkCursor<'a, S: DataSource + ?Sized> {
    source: &'a S,
    params: &'a Params,
    page: Page,
    total: Option<u64>,
}

impl<'a, S: DataSource + ?Sized> ChunkCursor<'a, S> {
    pub(crate) fn new(source: &'a S, params: &'a Params, chunk_size: u64) -> Result<Self> {
        Ok(Self {
            source,
            params,
            page: Page::first(chunk_size)?,
            total: None,
        })
    }

    /// Page the next call will fetch
    pub fn page(&self) -> Page {
        self.page
    }

    /// Filtered count, taken on first use
    pub async fn total(&mut self) -> Result<u64> {
        match self.total {
            Some(total) => Ok(total),
            None => {
                let total = self.source.count(self.params).await?;
                debug!(
                    "cursor over '{}' counted {} entities",
                    self.source.alias(),
                    total
                );
                self.total = Some(total);
                Ok(total)
            }
        }
    }

    /// Whether another chunk will be fetched
    pub async fn has_next(&mut self) -> Result<bool> {
        Ok(self.page.offset() < self.total().await?)
    }

    /// Fetch the next chunk together with the page that produced it
    pub async fn next_chunk(&mut self) -> Result<Option<(Page, Vec<S::Entity>)>> {
        if !self.has_next().await? {
            return Ok(None);
        }

        let page = self.page;
        let mut batch = self.source.fetch_page(page, self.params).await?;
        enforce_limit(&mut batch, page, self.source.alias());
        self.page = page.next();
        Ok(Some((page, batch)))
    }
}

/// Drop anything beyond `page.limit()` a misbehaving source returned
pub(crate) fn enforce_limit<E>(batch: &mut Vec<E>, page: Page, alias: &str) {
    let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
    if batch.len() > limit {
        warn!(
            "data source '{}' returned {} items for a page of {}, truncating",
            alias,
            batch.len(),
            limit
        );
        batch.truncate(limit);
    }
}
