//! Pending command - Show the batch awaiting a deferred retry

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use super::open_tracker;
use crate::output::{get_formatter, OutputFormat};

/// Arguments for the pending command
#[derive(Debug, Args)]
pub struct PendingCommand {
    /// List the entries in the pending batch
    #[arg(long)]
    pub entries: bool,
}

impl PendingCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let (config, tracker) = open_tracker(config_path)?;
        let pending = tracker.pending_batch();
        tracker.shutdown();

        if format.is_json() {
            let json = serde_json::to_value(&pending).context("Failed to serialize pending batch")?;
            formatter.print_json(&json);
            return Ok(());
        }

        let Some(batch) = pending else {
            formatter.success("No pending batch");
            return Ok(());
        };

        formatter.warn(&format!(
            "{} error(s) awaiting deferred retry",
            batch.len()
        ));
        formatter.info(&format!(
            "Deferred attempts made: {} of {}",
            batch.retry_count(),
            config.delivery.max_retries
        ));
        formatter.info(&format!(
            "Queued at: {}",
            batch.queued_at().format("%Y-%m-%d %H:%M:%S UTC")
        ));

        if self.entries {
            formatter.info("");
            for entry in batch.entries() {
                formatter.info(&format!(
                    "{}  {:<8}  {}",
                    entry.id(),
                    entry.severity(),
                    entry.message()
                ));
            }
        }

        Ok(())
    }
}
