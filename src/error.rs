//! Error types shared by the search service, data sources and factory

use thiserror::Error;

/// Errors produced while building or running a search
#[derive(Debug, Error)]
pub enum SearchError {
    /// A collaborator or setting is unusable; raised while wiring, not while querying
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The factory was asked for a repository it has no configuration for
    #[error("unknown repository: {0}")]
    UnknownRepository(String),

    /// Page with a zero limit or otherwise unusable bounds
    #[error("invalid page: {0}")]
    InvalidPage(String),

    /// A single-entity lookup matched more than one row
    #[error("lookup on '{0}' matched more than one entity")]
    NonUniqueResult(String),

    /// Traversal stopped by its cancellation token before `offset` was fetched
    #[error("traversal cancelled at offset {offset}")]
    Cancelled { offset: u64 },

    /// Traversal callback failed on the item at `index`
    #[error("traversal callback failed at index {index}: {source}")]
    Callback {
        index: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// Failure reported by a custom data source, passed through untouched
    #[error(transparent)]
    Source(anyhow::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    /// Wrap an arbitrary data-source failure
    pub fn data_source(err: impl Into<anyhow::Error>) -> Self {
        Self::Source(err.into())
    }

    /// Whether the error came from the backing store rather than from this crate
    pub fn is_data_source(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Source(_))
    }
}
