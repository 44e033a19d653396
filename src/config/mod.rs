//! Configuration module for entity-search
//!
//! Handles loading settings from YAML files and environment variables.

mod settings;

pub use settings::*;

use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

/// Environment variable naming an explicit settings file
pub const SETTINGS_PATH_VAR: &str = "ENTITY_SEARCH_SETTINGS_PATH";

/// Load settings from the first file found, or defaults.
///
/// Looks at `ENTITY_SEARCH_SETTINGS_PATH`, then `settings.yml`,
/// `config/settings.yml` and `<config dir>/entity-search/settings.yml`.
/// Environment overrides are merged last.
pub fn load() -> Result<Settings> {
    let explicit = std::env::var(SETTINGS_PATH_VAR).ok().map(PathBuf::from);
    let mut settings = load_from(explicit.into_iter().chain(default_paths()))?;
    settings.merge_env();
    Ok(settings)
}

/// Candidate settings locations, in lookup order
pub fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("settings.yml"),
        PathBuf::from("config/settings.yml"),
    ];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("entity-search/settings.yml"));
    }
    paths
}

fn load_from(paths: impl IntoIterator<Item = PathBuf>) -> Result<Settings> {
    for path in paths {
        if path.exists() {
            info!("Loading settings from: {}", path.display());
            return Settings::from_file(&path);
        }
    }

    info!("No settings file found, using defaults");
    Ok(Settings::default())
}
