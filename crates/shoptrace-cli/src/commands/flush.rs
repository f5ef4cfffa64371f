//! Flush command - Send buffered errors to the collector
//!
//! Runs one delivery with the configured in-call retries. A batch that
//! still fails is moved to the pending record for a later deferred retry.
//! With `--watch`, keeps flushing on `delivery.flush_interval_secs` until
//! interrupted.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use shoptrace_core::config::Config;
use shoptrace_telemetry::ErrorTracker;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::open_tracker;
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Arguments for the flush command
#[derive(Debug, Args)]
pub struct FlushCommand {
    /// Keep flushing on the configured interval until Ctrl-C
    #[arg(long)]
    pub watch: bool,
}

impl FlushCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);

        if self.watch {
            let config = Config::load_or_default(config_path);
            return watch(&config, formatter.as_ref()).await;
        }

        let (config, tracker) = open_tracker(config_path)?;

        let Some(collector_url) = config.delivery.collector_url.as_deref() else {
            formatter.error("No collector configured (set delivery.collector_url)");
            return Ok(());
        };

        let buffered = tracker.get_logs().len();
        info!(buffered, collector_url, "Flushing buffered errors");

        let delivered = tracker.flush().await;
        let remaining = tracker.get_logs().len();
        let pending = tracker.pending_batch();
        tracker.shutdown();

        if format.is_json() {
            let json = serde_json::json!({
                "success": delivered,
                "buffered": buffered,
                "remaining": remaining,
                "pending": pending.as_ref().map(|p| p.len()).unwrap_or(0),
            });
            formatter.print_json(&json);
            return Ok(());
        }

        if delivered {
            if buffered == 0 {
                formatter.success("Nothing to flush");
            } else {
                formatter.success(&format!(
                    "Delivered {} error(s) to {}",
                    buffered, collector_url
                ));
            }
        } else {
            formatter.warn("Collector unreachable, errors queued for a deferred retry");
        }

        if let Some(pending) = pending {
            formatter.info(&format!(
                "{} error(s) awaiting deferred retry (attempt {} of {})",
                pending.len(),
                pending.retry_count() + 1,
                config.delivery.max_retries
            ));
        }

        Ok(())
    }
}

async fn watch(config: &Config, formatter: &dyn OutputFormatter) -> Result<()> {
    if config.delivery.collector_url.is_none() {
        formatter.error("No collector configured (set delivery.collector_url)");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let tracker =
        ErrorTracker::start(config, shutdown.clone()).context("Failed to start error tracker")?;
    formatter.info(&format!(
        "Flushing every {}s, press Ctrl-C to stop",
        config.delivery.flush_interval_secs
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    shutdown.cancel();
    tracker.shutdown();
    formatter.success(&format!(
        "Stopped, {} error(s) still buffered",
        tracker.get_logs().len()
    ));
    Ok(())
}
