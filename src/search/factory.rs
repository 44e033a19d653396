//! Factory building search services for configured repositories

use super::service::SearchService;
use crate::config::{RepositoryConfig, SearchSettings, Settings};
use crate::db;
use crate::error::{Result, SearchError};
use crate::source::sql::{ColumnOrder, ParamFilter, ParamOrder, SqlSource, SqlSourceBuilder};
use crate::source::DataSource;
use sqlx::sqlite::SqliteRow;
use sqlx::{Encode, FromRow, Sqlite, SqlitePool, Type};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Resolves repository names to search services sharing one pool
pub struct SearchFactory {
    pool: SqlitePool,
    search: SearchSettings,
    repositories: HashMap<String, RepositoryConfig>,
}

impl SearchFactory {
    /// Create a factory over an existing pool
    pub fn new(pool: SqlitePool, settings: &Settings) -> Self {
        let mut factory = Self {
            pool,
            search: settings.search.clone(),
            repositories: HashMap::new(),
        };
        for config in &settings.repositories {
            factory.register(config.clone());
        }
        info!("Search factory configured with {} repositories", factory.len());
        factory
    }

    /// Open the configured database and create a factory over it
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let pool = db::connect(&settings.database).await?;
        Ok(Self::new(pool, settings))
    }

    /// Register or replace a repository configuration
    pub fn register(&mut self, config: RepositoryConfig) {
        if self.repositories.contains_key(&config.name) {
            warn!("Replacing configuration for repository: {}", config.name);
        }
        self.repositories.insert(config.name.clone(), config);
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get repository config by name
    pub fn get_config(&self, name: &str) -> Option<&RepositoryConfig> {
        self.repositories.get(name)
    }

    /// Names of all enabled repositories, sorted
    pub fn repositories(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .repositories
            .values()
            .filter(|config| !config.disabled)
            .map(|config| config.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Check if a repository is configured
    pub fn contains(&self, name: &str) -> bool {
        self.repositories.contains_key(name)
    }

    /// Get number of configured repositories
    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    /// Check if no repository is configured
    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    /// Source builder pre-wired with the repository's configured filters and
    /// ordering, for callers that add their own hooks before building
    pub fn source_for<E, I>(&self, name: &str) -> Result<SqlSourceBuilder<E, I>> {
        let config = self.enabled_config(name)?;

        let mut builder = SqlSource::builder(self.pool.clone(), config.table_name())
            .alias(config.alias.as_str())
            .id_column(config.id_column.as_str());

        for filter in &config.filters {
            let column = filter.column.as_deref().unwrap_or(&filter.param);
            builder = builder.list_filter(ParamFilter::new(
                filter.param.as_str(),
                column,
                filter.operator,
            )?);
        }

        if !config.sortable.is_empty() {
            builder = builder.order(ParamOrder::new(config.sortable.iter().cloned())?);
        }
        for order in &config.order_by {
            builder = builder.order(ColumnOrder::new(order.column.as_str(), order.direction)?);
        }

        debug!(
            "Wired repository {} ({} filters, {} orderings)",
            name,
            config.filters.len(),
            config.order_by.len() + usize::from(!config.sortable.is_empty())
        );
        Ok(builder)
    }

    /// Search service for the named repository
    pub fn for_repository<E, I>(&self, name: &str) -> Result<SearchService<SqlSource<E, I>>>
    where
        E: for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'static,
        I: for<'q> Encode<'q, Sqlite> + Type<Sqlite> + Clone + Send + Sync + 'static,
    {
        let source = self.source_for::<E, I>(name)?.build()?;
        let chunk_size = self.chunk_size_for(name);
        info!("Created search service for repository: {}", name);
        Ok(SearchService::new(source).with_chunk_size(chunk_size))
    }

    /// Search service over any data source, using the configured chunk size
    pub fn for_source<S: DataSource>(&self, source: S) -> SearchService<S> {
        SearchService::new(source).with_chunk_size(self.search.chunk_size)
    }

    /// Effective traversal chunk size for a repository
    pub fn chunk_size_for(&self, name: &str) -> u64 {
        self.repositories
            .get(name)
            .and_then(|config| config.chunk_size)
            .unwrap_or(self.search.chunk_size)
    }

    fn enabled_config(&self, name: &str) -> Result<&RepositoryConfig> {
        let config = self
            .repositories
            .get(name)
            .ok_or_else(|| SearchError::UnknownRepository(name.to_string()))?;
        if config.disabled {
            return Err(SearchError::Configuration(format!(
                "repository '{}' is disabled",
                name
            )));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Page, Params};
    use crate::source::sql::tests::{library, Book};
    use crate::source::sql::{qualify, Condition, Criteria};
    use crate::source::{Identified, MemorySource};

    const SETTINGS: &str = r#"
search:
  chunk_size: 10
repositories:
  - name: books
    filters:
      - param: author
      - param: q
        column: title
        operator: contains
      - param: since
        column: year
        operator: gte
    order_by:
      - column: year
        direction: desc
    sortable: [title]
  - name: classics
    table: books
    alias: c
    chunk_size: 4
  - name: archive
    table: books
    disabled: true
"#;

    async fn factory(books: usize) -> SearchFactory {
        let settings = Settings::from_yaml(SETTINGS).unwrap();
        SearchFactory::new(library(books).await, &settings)
    }

    #[tokio::test]
    async fn test_configured_filters_and_ordering() {
        let factory = factory(12).await;
        let books = factory.for_repository::<Book, i64>("books").unwrap();

        let params = Params::new().with("author", "Herbert");
        let result = books.get_list(Page::first(2).unwrap(), &params).await.unwrap();
        assert_eq!(result.total, 4);
        let ids: Vec<i64> = result.items.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![11, 8]);

        let params = Params::new().with("q", "10").with("since", 1965);
        let result = books.get_list(Page::first(10).unwrap(), &params).await.unwrap();
        let titles: Vec<&str> = result.items.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["Book 010"]);

        // caller sort applies before the configured year ordering
        let params = Params::new().with("sort", "title").with("order", "desc");
        let result = books.get_list(Page::first(1).unwrap(), &params).await.unwrap();
        assert_eq!(result.items[0].title, "Book 012");
        assert_eq!(books.alias(), "e");
    }

    #[tokio::test]
    async fn test_individual_lookup() {
        let factory = factory(3).await;
        let books = factory.for_repository::<Book, i64>("classics").unwrap();

        let found = books.get_individual(&2, None).await.unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.items[0].author, "Herbert");

        let missing = books.get_individual(&99, None).await.unwrap();
        assert_eq!(missing.total, 0);
        assert!(missing.is_empty());
        assert_eq!(books.alias(), "c");
    }

    #[tokio::test]
    async fn test_traverse_sqlite_in_chunks() {
        let factory = factory(25).await;
        let books = factory.for_repository::<Book, i64>("books").unwrap();
        assert_eq!(books.chunk_size(), 10);

        let mut seen = Vec::new();
        books
            .traverse(&Params::new(), |book, index| {
                seen.push((index, book.year));
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(seen.len(), 25);
        let indices: Vec<u64> = seen.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, (0..25).collect::<Vec<_>>());
        // configured ordering is year descending
        assert_eq!(seen[0].1, 1984);
        assert_eq!(seen[24].1, 1960);
    }

    #[tokio::test]
    async fn test_unknown_and_disabled_repositories() {
        let factory = factory(0).await;

        let err = factory.for_repository::<Book, i64>("magazines").err().unwrap();
        assert!(matches!(err, SearchError::UnknownRepository(name) if name == "magazines"));

        let err = factory.for_repository::<Book, i64>("archive").err().unwrap();
        assert!(matches!(err, SearchError::Configuration(_)));

        assert_eq!(factory.repositories(), vec!["books", "classics"]);
        assert!(factory.contains("archive"));
        assert_eq!(factory.len(), 3);
    }

    #[tokio::test]
    async fn test_bad_configuration_fails_fast() {
        let mut factory = factory(0).await;

        let mut config = RepositoryConfig::new("broken");
        config.table = Some("books; DROP TABLE books".to_string());
        factory.register(config);
        assert!(matches!(
            factory.for_repository::<Book, i64>("broken").err(),
            Some(SearchError::Configuration(_))
        ));

        let mut config = RepositoryConfig::new("unsortable");
        config.table = Some("books".to_string());
        config.sortable = vec!["title desc".to_string()];
        factory.register(config);
        assert!(factory.for_repository::<Book, i64>("unsortable").is_err());
    }

    #[tokio::test]
    async fn test_chunk_size_override() {
        let factory = factory(0).await;
        assert_eq!(factory.chunk_size_for("classics"), 4);
        assert_eq!(factory.chunk_size_for("books"), 10);
        assert_eq!(
            factory
                .for_repository::<Book, i64>("classics")
                .unwrap()
                .chunk_size(),
            4
        );
    }

    #[tokio::test]
    async fn test_custom_hooks_on_top_of_configuration() {
        let factory = factory(10).await;
        let source = factory
            .source_for::<Book, i64>("books")
            .unwrap()
            .repo_filter(|criteria: &mut Criteria, alias: &str, _: &Params| {
                criteria.and_where(Condition::eq(qualify(alias, "published"), true));
            })
            .build()
            .unwrap();
        let books = factory.for_source(source);

        let result = books.get_list(Page::first(20).unwrap(), &Params::new()).await.unwrap();
        assert_eq!(result.total, 8);
        assert!(books.get_individual(&5, None).await.unwrap().is_empty());
    }

    #[derive(Debug, Clone)]
    struct Tag(u32);

    impl Identified for Tag {
        type Id = u32;

        fn id(&self) -> &u32 {
            &self.0
        }
    }

    #[tokio::test]
    async fn test_for_source_uses_configured_chunk_size() {
        let factory = factory(0).await;
        let tags = factory.for_source(MemorySource::new((0..3).map(Tag).collect()));
        assert_eq!(tags.chunk_size(), 10);

        let result = tags.get_list(Page::first(2).unwrap(), &Params::new()).await.unwrap();
        assert_eq!(result.total, 3);
        assert_eq!(result.len(), 2);
    }
}
