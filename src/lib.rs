//! entity-search: paginated, filterable entity search
//!
//! A search service counts and pages through the entities of a data source,
//! looks up single entities by id and traverses large result sets in bounded
//! chunks. The SQLite data source assembles its queries from an alias,
//! filter hooks, ordering hooks and LIMIT/OFFSET pagination; the factory
//! builds those sources from configuration.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod query;
pub mod results;
pub mod search;
pub mod source;

pub use config::Settings;
pub use error::{Result, SearchError};
pub use query::{Page, Params};
pub use results::SearchResult;
pub use search::{ChunkCursor, SearchFactory, SearchService};
pub use source::{DataSource, Identified, MemorySource, SqlSource};
pub use tokio_util::sync::CancellationToken;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entities fetched per round trip during traversal unless configured otherwise
pub const DEFAULT_CHUNK_SIZE: u64 = 100;

/// Page size used when a caller gives none
pub const DEFAULT_PAGE_LIMIT: u64 = 20;
