//! Search service: listing, single lookups and chunked traversal

use super::cursor::{enforce_limit, ChunkCursor};
use crate::error::{Result, SearchError};
use crate::query::{Page, Params};
use crate::results::SearchResult;
use crate::source::DataSource;
use futures::stream::{self, Stream, TryStreamExt};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Paginated search over one data source
pub struct SearchService<S> {
    /// Data source answering counts and page queries
    source: S,
    /// Chunk size used by [`traverse`](Self::traverse)
    chunk_size: u64,
}

impl<S: DataSource> SearchService<S> {
    /// Create a new search service over `source`
    pub fn new(source: S) -> Self {
        Self {
            source,
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the default traversal chunk size; zero is raised to one
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Alias the data source uses for the entity in its queries
    pub fn alias(&self) -> &str {
        self.source.alias()
    }

    /// One page of entities matching `params`, with the filtered total.
    ///
    /// When nothing matches, the page query is skipped and an empty result
    /// is returned.
    pub async fn get_list(&self, page: Page, params: &Params) -> Result<SearchResult<S::Entity>> {
        let total = self.source.count(params).await?;
        if total < 1 {
            debug!("no '{}' entities match, skipping page query", self.alias());
            return Ok(SearchResult::empty(page));
        }

        let mut items = self.source.fetch_page(page, params).await?;
        enforce_limit(&mut items, page, self.alias());
        debug!(
            "listed {} of {} '{}' entities at offset {}",
            items.len(),
            total,
            self.alias(),
            page.offset()
        );
        Ok(SearchResult::new(items, page, total))
    }

    /// The entity with `id`, constrained by `params` when given.
    ///
    /// A miss is an empty result with a total of 0, not an error.
    pub async fn get_individual(
        &self,
        id: &S::Id,
        params: Option<&Params>,
    ) -> Result<SearchResult<S::Entity>> {
        let default = Params::default();
        let params = params.unwrap_or(&default);

        match self.source.fetch_one(id, params).await? {
            Some(entity) => Ok(SearchResult::single(entity)),
            None => {
                debug!("no '{}' entity matched the lookup", self.alias());
                Ok(SearchResult::empty(Page::single()))
            }
        }
    }

    /// Cursor fetching `chunk_size` entities per step
    pub fn chunks<'a>(&'a self, params: &'a Params, chunk_size: u64) -> Result<ChunkCursor<'a, S>> {
        ChunkCursor::new(&self.source, params, chunk_size)
    }

    /// Call `callback(entity, index)` for every entity matching `params`,
    /// holding at most `chunk_size` entities in memory at a time.
    ///
    /// `index` is the entity's absolute position in the result set. The
    /// first callback error aborts the traversal; entities already handed to
    /// the callback stay processed.
    pub async fn traverse_results<F>(
        &self,
        params: &Params,
        callback: F,
        chunk_size: u64,
    ) -> Result<&Self>
    where
        F: FnMut(S::Entity, u64) -> anyhow::Result<()>,
    {
        self.run_traversal(params, callback, chunk_size, None).await
    }

    /// [`traverse_results`](Self::traverse_results) with the service's chunk size
    pub async fn traverse<F>(&self, params: &Params, callback: F) -> Result<&Self>
    where
        F: FnMut(S::Entity, u64) -> anyhow::Result<()>,
    {
        self.run_traversal(params, callback, self.chunk_size, None)
            .await
    }

    /// [`traverse_results`](Self::traverse_results) that checks `token`
    /// before every chunk fetch and stops with [`SearchError::Cancelled`]
    /// once it is cancelled.
    pub async fn traverse_results_until<F>(
        &self,
        params: &Params,
        callback: F,
        chunk_size: u64,
        token: &CancellationToken,
    ) -> Result<&Self>
    where
        F: FnMut(S::Entity, u64) -> anyhow::Result<()>,
    {
        self.run_traversal(params, callback, chunk_size, Some(token))
            .await
    }

    async fn run_traversal<F>(
        &self,
        params: &Params,
        mut callback: F,
        chunk_size: u64,
        token: Option<&CancellationToken>,
    ) -> Result<&Self>
    where
        F: FnMut(S::Entity, u64) -> anyhow::Result<()>,
    {
        let start = Instant::now();
        let mut cursor = self.chunks(params, chunk_size)?;
        let total = cursor.total().await?;
        info!(
            "Traversing {} '{}' entities in chunks of {}",
            total,
            self.alias(),
            chunk_size
        );

        let mut chunks = 0u64;
        loop {
            if let Some(token) = token {
                if token.is_cancelled() {
                    let offset = cursor.page().offset();
                    info!("Traversal of '{}' cancelled at offset {}", self.alias(), offset);
                    return Err(SearchError::Cancelled { offset });
                }
            }

            let Some((page, batch)) = cursor.next_chunk().await? else {
                break;
            };
            chunks += 1;

            for (i, entity) in batch.into_iter().enumerate() {
                let index = page.offset() + i as u64;
                callback(entity, index).map_err(|source| SearchError::Callback { index, source })?;
            }
        }

        info!(
            "Traversed '{}' in {} chunks ({:?})",
            self.alias(),
            chunks,
            start.elapsed()
        );
        Ok(self)
    }

    /// Matching entities as a stream of `(index, entity)`, fetched lazily
    /// `chunk_size` at a time
    pub fn stream<'a>(
        &'a self,
        params: &'a Params,
        chunk_size: u64,
    ) -> Result<impl Stream<Item = Result<(u64, S::Entity)>> + 'a> {
        let cursor = self.chunks(params, chunk_size)?;

        let chunks = stream::try_unfold(cursor, |mut cursor| async move {
            let next = cursor.next_chunk().await?;
            Ok::<_, SearchError>(next.map(|chunk| (chunk, cursor)))
        });

        Ok(chunks
            .map_ok(|(page, batch)| {
                stream::iter(
                    batch
                        .into_iter()
                        .enumerate()
                        .map(move |(i, entity)| {
                            Ok::<_, SearchError>((page.offset() + i as u64, entity))
                        }),
                )
            })
            .try_flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Identified, MemorySource};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: u64,
        even: bool,
    }

    impl Identified for Item {
        type Id = u64;

        fn id(&self) -> &u64 {
            &self.id
        }
    }

    /// Records every call made to the wrapped source
    struct Counting<S> {
        inner: S,
        counts: AtomicUsize,
        fetch_offsets: Mutex<Vec<u64>>,
        extra_items: usize,
    }

    impl<S> Counting<S> {
        fn new(inner: S) -> Self {
            Self {
                inner,
                counts: AtomicUsize::new(0),
                fetch_offsets: Mutex::new(Vec::new()),
                extra_items: 0,
            }
        }

        fn fetches(&self) -> Vec<u64> {
            self.fetch_offsets.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl<S: DataSource> DataSource for Counting<S>
    where
        S::Entity: Clone,
    {
        type Entity = S::Entity;
        type Id = S::Id;

        async fn count(&self, params: &Params) -> Result<u64> {
            self.counts.fetch_add(1, Ordering::SeqCst);
            self.inner.count(params).await
        }

        async fn fetch_page(&self, page: Page, params: &Params) -> Result<Vec<S::Entity>> {
            self.fetch_offsets.lock().unwrap().push(page.offset());
            let mut items = self.inner.fetch_page(page, params).await?;
            if let Some(last) = items.last().cloned() {
                items.extend(std::iter::repeat(last).take(self.extra_items));
            }
            Ok(items)
        }

        async fn fetch_one(&self, id: &S::Id, params: &Params) -> Result<Option<S::Entity>> {
            self.inner.fetch_one(id, params).await
        }
    }

    struct Broken;

    #[async_trait]
    impl DataSource for Broken {
        type Entity = Item;
        type Id = u64;

        async fn count(&self, _params: &Params) -> Result<u64> {
            Err(SearchError::data_source(anyhow::anyhow!("connection refused")))
        }

        async fn fetch_page(&self, _page: Page, _params: &Params) -> Result<Vec<Item>> {
            unreachable!("count fails first")
        }

        async fn fetch_one(&self, _id: &u64, _params: &Params) -> Result<Option<Item>> {
            Err(SearchError::data_source(anyhow::anyhow!("connection refused")))
        }
    }

    fn items(n: u64) -> MemorySource<Item> {
        MemorySource::new(
            (0..n)
                .map(|id| Item {
                    id,
                    even: id % 2 == 0,
                })
                .collect(),
        )
        .with_filter(|item, params| {
            params
                .get_bool("even")
                .map(|even| item.even == even)
                .unwrap_or(true)
        })
    }

    fn service(n: u64) -> SearchService<Counting<MemorySource<Item>>> {
        SearchService::new(Counting::new(items(n)))
    }

    #[tokio::test]
    async fn test_empty_list_skips_fetch() {
        let search = service(0);
        let page = Page::first(10).unwrap();

        let result = search.get_list(page, &Params::new()).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(result.total, 0);
        assert_eq!(result.page, page);
        assert!(search.source().fetches().is_empty());
    }

    #[tokio::test]
    async fn test_list_lengths() {
        let search = service(25);
        for (offset, limit, expected) in [(0, 10, 10), (20, 10, 5), (25, 10, 0), (40, 10, 0), (3, 100, 22)] {
            let page = Page::new(offset, limit).unwrap();
            let result = search.get_list(page, &Params::new()).await.unwrap();
            assert_eq!(result.len(), expected, "offset {} limit {}", offset, limit);
            assert_eq!(result.total, 25);
        }
    }

    #[tokio::test]
    async fn test_list_applies_params() {
        let search = service(10);
        let params = Params::new().with("even", true);
        let result = search.get_list(Page::first(3).unwrap(), &params).await.unwrap();

        assert_eq!(result.total, 5);
        let ids: Vec<u64> = result.items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![0, 2, 4]);
        assert_eq!(result.next_page(), Some(Page::new(3, 3).unwrap()));
    }

    #[tokio::test]
    async fn test_list_is_idempotent() {
        let search = service(12);
        let page = Page::new(4, 4).unwrap();
        let first = search.get_list(page, &Params::new()).await.unwrap();
        let second = search.get_list(page, &Params::new()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_individual_lookup() {
        let search = service(5);

        let found = search.get_individual(&3, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found.total, 1);
        assert_eq!(found.page, Page::single());
        assert_eq!(found.first().map(|i| i.id), Some(3));

        let missing = search.get_individual(&42, None).await.unwrap();
        assert!(missing.is_empty());
        assert_eq!(missing.total, 0);
        assert_eq!(missing.page, Page::single());

        let filtered = search
            .get_individual(&3, Some(&Params::new().with("even", true)))
            .await
            .unwrap();
        assert_eq!(filtered.total, 0);
    }

    #[tokio::test]
    async fn test_traverse_visits_every_index_once() {
        let search = service(25);
        let mut seen = Vec::new();

        search
            .traverse_results(
                &Params::new(),
                |item, index| {
                    assert_eq!(item.id, index);
                    seen.push(index);
                    Ok(())
                },
                10,
            )
            .await
            .unwrap();

        assert_eq!(seen, (0..25).collect::<Vec<_>>());
        assert_eq!(search.source().fetches(), vec![0, 10, 20]);
        assert_eq!(search.source().counts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_traverse_empty() {
        let search = service(0);
        let mut calls = 0;
        search
            .traverse_results(&Params::new(), |_, _| {
                calls += 1;
                Ok(())
            }, 10)
            .await
            .unwrap();

        assert_eq!(calls, 0);
        assert!(search.source().fetches().is_empty());
    }

    #[tokio::test]
    async fn test_traverse_exact_multiple() {
        let search = service(100);
        let mut calls = 0;
        search
            .traverse(&Params::new(), |_, _| {
                calls += 1;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(calls, 100);
        assert_eq!(search.source().fetches(), vec![0]);
    }

    #[tokio::test]
    async fn test_traverse_filtered_indices_are_dense() {
        let search = service(9).with_chunk_size(2);
        let params = Params::new().with("even", false);
        let mut seen = Vec::new();
        search
            .traverse(&params, |item, index| {
                seen.push((index, item.id));
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![(0, 1), (1, 3), (2, 5), (3, 7)]);
    }

    #[tokio::test]
    async fn test_zero_chunk_size_rejected() {
        let search = service(3);
        let err = search
            .traverse_results(&Params::new(), |_, _| Ok(()), 0)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SearchError::InvalidPage(_)));
        assert_eq!(search.source().counts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_callback_error_aborts() {
        let search = service(30);
        let mut calls = 0;
        let err = search
            .traverse_results(
                &Params::new(),
                |_, index| {
                    calls += 1;
                    if index == 7 {
                        anyhow::bail!("disk full");
                    }
                    Ok(())
                },
                5,
            )
            .await
            .err()
            .unwrap();

        assert!(matches!(err, SearchError::Callback { index: 7, .. }));
        assert_eq!(calls, 8);
        assert_eq!(search.source().fetches(), vec![0, 5]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let search = service(30);
        let token = CancellationToken::new();
        token.cancel();

        let err = search
            .traverse_results_until(&Params::new(), |_, _| Ok(()), 10, &token)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SearchError::Cancelled { offset: 0 }));
        assert!(search.source().fetches().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_between_chunks() {
        let search = service(50);
        let token = CancellationToken::new();
        let mut seen = 0;

        let err = search
            .traverse_results_until(
                &Params::new(),
                |_, index| {
                    seen += 1;
                    if index == 12 {
                        token.cancel();
                    }
                    Ok(())
                },
                10,
                &token,
            )
            .await
            .err()
            .unwrap();

        // the chunk in flight finishes, the next one is never fetched
        assert!(matches!(err, SearchError::Cancelled { offset: 20 }));
        assert_eq!(seen, 20);
        assert_eq!(search.source().fetches(), vec![0, 10]);
    }

    #[tokio::test]
    async fn test_concurrent_deletes_skip_items() {
        let search = service(30);
        let mut seen = Vec::new();

        search
            .traverse_results(
                &Params::new(),
                |item, _| {
                    if item.id == 9 {
                        for id in 0..5 {
                            search.source().inner.remove(&id);
                        }
                    }
                    seen.push(item.id);
                    Ok(())
                },
                10,
            )
            .await
            .unwrap();

        // rows shifted left by five, so ids 10..15 were never delivered
        let expected: Vec<u64> = (0..10).chain(15..30).collect();
        assert_eq!(seen, expected);
        assert_eq!(search.source().fetches(), vec![0, 10, 20]);
    }

    #[tokio::test]
    async fn test_oversized_pages_truncated() {
        let mut source = Counting::new(items(10));
        source.extra_items = 3;
        let search = SearchService::new(source);

        let result = search.get_list(Page::first(4).unwrap(), &Params::new()).await.unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(result.total, 10);

        let params = Params::new();
        let mut cursor = search.chunks(&params, 4).unwrap();
        let (_, batch) = cursor.next_chunk().await.unwrap().unwrap();
        assert_eq!(batch.len(), 4);
    }

    #[tokio::test]
    async fn test_data_source_failure_passes_through() {
        let search = SearchService::new(Broken);
        let err = search
            .get_list(Page::first(5).unwrap(), &Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Source(_)));
        assert_eq!(err.to_string(), "connection refused");

        let err = search.get_individual(&1, None).await.unwrap_err();
        assert!(err.is_data_source());
    }

    #[tokio::test]
    async fn test_stream_yields_absolute_indices() {
        let search = service(7);
        let params = Params::new();
        let collected: Vec<(u64, u64)> = search
            .stream(&params, 3)
            .unwrap()
            .map(|r| r.map(|(index, item)| (index, item.id)))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(collected, (0..7).map(|i| (i, i)).collect::<Vec<_>>());
        assert_eq!(search.source().fetches(), vec![0, 3, 6]);
    }

    #[tokio::test]
    async fn test_cursor_steps() {
        let search = service(5);
        let params = Params::new();
        let mut cursor = search.chunks(&params, 2).unwrap();

        assert_eq!(cursor.total().await.unwrap(), 5);
        let mut sizes = Vec::new();
        while let Some((page, batch)) = cursor.next_chunk().await.unwrap() {
            sizes.push((page.offset(), batch.len()));
        }
        assert_eq!(sizes, vec![(0, 2), (2, 2), (4, 1)]);
        assert_eq!(search.source().counts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_alias_comes_from_source() {
        let search = SearchService::new(items(1).with_alias("item"));
        assert_eq!(search.alias(), "item");
        assert_eq!(search.chunk_size(), crate::DEFAULT_CHUNK_SIZE);
    }
}
