//! Metrics command - Print the telemetry counters in Prometheus text format
//!
//! Counters are per process, so this shows what opening the buffer found:
//! the pending-batch gauge and any storage errors hit while reloading.

use std::path::Path;

use anyhow::Result;
use clap::Args;

use super::open_tracker;
use crate::output::{get_formatter, OutputFormat};

/// Arguments for the metrics command
#[derive(Debug, Args)]
pub struct MetricsCommand {}

impl MetricsCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let text = render(config_path)?;

        if format.is_json() {
            formatter.print_json(&serde_json::json!({ "metrics": text }));
        } else {
            print!("{text}");
        }
        Ok(())
    }
}

fn render(config_path: &Path) -> Result<String> {
    let (_config, tracker) = open_tracker(config_path)?;
    tracker.shutdown();
    tracker.metrics().encode()
}
