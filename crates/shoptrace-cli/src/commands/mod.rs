pub mod capture;
pub mod completions;
pub mod config;
pub mod flush;
pub mod logs;
pub mod metrics;
pub mod pending;

use std::path::Path;

use anyhow::{Context, Result};
use shoptrace_core::config::Config;
use shoptrace_telemetry::ErrorTracker;
use tracing::debug;

/// Loads configuration and opens the tracker over its storage directory
pub fn open_tracker(config_path: &Path) -> Result<(Config, ErrorTracker)> {
    let config = Config::load_or_default(config_path);
    debug!(
        config_path = %config_path.display(),
        storage_dir = %config.storage.dir.display(),
        "Opening error tracker"
    );
    let tracker = ErrorTracker::from_config(&config).context("Failed to open error tracker")?;
    Ok((config, tracker))
}
