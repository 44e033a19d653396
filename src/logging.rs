//! Tracing subscriber setup

use crate::config::GeneralSettings;
use tracing_subscriber::EnvFilter;

/// Filter built from the settings; `debug` overrides `log_level`.
/// An unparsable directive falls back to `info`.
pub fn env_filter(settings: &GeneralSettings) -> EnvFilter {
    let directive = if settings.debug {
        "debug"
    } else {
        settings.log_level.as_str()
    };
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a global fmt subscriber. Fails if one is already installed.
pub fn init(settings: &GeneralSettings) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(settings))
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
