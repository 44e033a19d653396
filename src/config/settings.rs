//! Settings structures for entity-search configuration

use crate::query::{Page, Params};
use crate::source::sql::{Direction, FilterOperator};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure, loaded from `settings.yml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub search: SearchSettings,
    pub database: DatabaseSettings,
    pub repositories: Vec<RepositoryConfig>,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse settings from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)?;
        Ok(settings)
    }

    /// Merge with environment variables (ENTITY_SEARCH_* prefix)
    pub fn merge_env(&mut self) {
        self.merge_vars(|key| std::env::var(key).ok());
    }

    fn merge_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("ENTITY_SEARCH_DEBUG") {
            self.general.debug = val.parse().unwrap_or(false);
        }
        if let Some(val) = var("ENTITY_SEARCH_LOG") {
            self.general.log_level = val;
        }
        if let Some(val) = var("ENTITY_SEARCH_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = var("ENTITY_SEARCH_CHUNK_SIZE") {
            if let Ok(size) = val.parse::<u64>() {
                if size > 0 {
                    self.search.chunk_size = size;
                }
            }
        }
    }

    /// Get repository config by name
    pub fn get_repository(&self, name: &str) -> Option<&RepositoryConfig> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Get all enabled repositories
    pub fn enabled_repositories(&self) -> Vec<&RepositoryConfig> {
        self.repositories.iter().filter(|r| !r.disabled).collect()
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Enable debug logging regardless of `log_level`
    pub debug: bool,
    /// Tracing filter directive, e.g. `info` or `entity_search=debug`
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "info".to_string(),
        }
    }
}

/// Paging defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Page size when the caller gives none
    pub default_limit: u64,
    /// Largest page size a caller may request
    pub max_limit: u64,
    /// Entities loaded per round trip during traversal
    pub chunk_size: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: crate::DEFAULT_PAGE_LIMIT,
            max_limit: 500,
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
        }
    }
}

impl SearchSettings {
    /// Build a page from request params.
    ///
    /// `offset`/`limit` win over `page`/`per_page`; the limit is clamped to
    /// `[1, max_limit]`.
    pub fn page_from_params(&self, params: &Params) -> Page {
        let limit = params
            .get_u64("limit")
            .or_else(|| params.get_u64("per_page"))
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1));

        let offset = match params.get_u64("offset") {
            Some(offset) => offset,
            None => params
                .get_u64("page")
                .map(|n| n.max(1).saturating_sub(1).saturating_mul(limit))
                .unwrap_or(0),
        };

        Page::new(offset, limit).unwrap_or_default()
    }
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite URL, e.g. `sqlite://data/app.db` or `sqlite::memory:`
    pub url: String,
    pub max_connections: u32,
    /// Create the database file when it does not exist
    pub create_if_missing: bool,
    /// How long a connection waits on a locked database
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://entity-search.db".to_string(),
            max_connections: 5,
            create_if_missing: true,
            busy_timeout_ms: 5000,
        }
    }
}

impl DatabaseSettings {
    /// Private in-memory database
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Default::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

/// One searchable table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Name the factory resolves (unique)
    pub name: String,
    /// Table name; defaults to `name`
    pub table: Option<String>,
    /// Query alias
    pub alias: String,
    pub id_column: String,
    pub disabled: bool,
    /// Traversal chunk size overriding `search.chunk_size`
    pub chunk_size: Option<u64>,
    /// Params mapped onto WHERE predicates
    pub filters: Vec<FilterConfig>,
    /// Fixed ordering applied after caller-chosen sorting
    pub order_by: Vec<OrderConfig>,
    /// Columns a caller may sort on through the `sort`/`order` params
    pub sortable: Vec<String>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            table: None,
            alias: "e".to_string(),
            id_column: "id".to_string(),
            disabled: false,
            chunk_size: None,
            filters: Vec::new(),
            order_by: Vec::new(),
            sortable: Vec::new(),
        }
    }
}

impl RepositoryConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Table to query
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }
}

/// Param-to-column filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub param: String,
    /// Column to compare; defaults to `param`
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub operator: FilterOperator,
}

/// Fixed ordering term
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfig {
    pub column: String,
    #[serde(default)]
    pub direction: Direction,
}
