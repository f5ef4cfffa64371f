//! Capture command - Record an error by hand
//!
//! Useful for checking the pipeline end to end: the entry goes through the
//! same classification and escalation as one captured in the storefront.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use shoptrace_core::domain::{Category, Severity};
use shoptrace_telemetry::CaptureOptions;

use super::open_tracker;
use crate::output::{get_formatter, OutputFormat};

/// Time given to escalation sends before the process exits
const ESCALATION_GRACE: Duration = Duration::from_secs(2);

/// Arguments for the capture command
#[derive(Debug, Args)]
pub struct CaptureCommand {
    /// Error message
    pub message: String,

    /// Severity: low, medium, high or critical
    #[arg(long)]
    pub severity: Option<Severity>,

    /// Category: javascript, network, ui, auth, payment or other
    #[arg(long)]
    pub category: Option<Category>,

    /// Free-text context label
    #[arg(long)]
    pub context: Option<String>,
}

impl CaptureCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let (_config, tracker) = open_tracker(config_path)?;
        let mut escalations = tracker.subscribe_escalations();

        let Some(id) = tracker.capture(self.message.as_str(), self.options()) else {
            formatter.error("Capture was not recorded");
            return Ok(());
        };

        let escalated = escalations.try_recv().is_ok();
        if escalated {
            // Let the detached critical and admin sends finish
            tokio::time::sleep(ESCALATION_GRACE).await;
        }
        tracker.shutdown();

        if format.is_json() {
            let json = serde_json::json!({
                "success": true,
                "id": id.as_str(),
                "escalated": escalated,
            });
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Captured {}", id));
            if escalated {
                formatter.info("Critical error escalated");
            }
        }

        Ok(())
    }

    fn options(&self) -> CaptureOptions {
        let mut options = CaptureOptions::new();
        if let Some(severity) = self.severity {
            options = options.with_severity(severity);
        }
        if let Some(category) = self.category {
            options = options.with_category(category);
        }
        if let Some(context) = &self.context {
            options = options.with_context(context);
        }
        options
    }
}
