//! Logs command - Inspect the local error buffer
//!
//! Provides the `shoptrace logs` CLI command with subcommands:
//! - `list`: Show buffered entries, newest last
//! - `stats`: Summary counts and most frequent messages
//! - `export`: Write the full export document to a file or stdout
//! - `clear`: Drop every buffered entry

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use shoptrace_core::domain::{Category, ErrorStats, LogEntry, Severity};
use tracing::info;

use super::open_tracker;
use crate::output::{get_formatter, truncate, OutputFormat};

const MESSAGE_WIDTH: usize = 60;

/// Log inspection subcommands
#[derive(Debug, Subcommand)]
pub enum LogsCommand {
    /// List buffered error entries
    List {
        /// Only show the N most recent entries
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },
    /// Show summary statistics
    Stats,
    /// Export entries and statistics as JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Remove every buffered entry
    Clear,
}

impl LogsCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let (_config, tracker) = open_tracker(config_path)?;

        match self {
            LogsCommand::List { limit } => {
                let logs = tail(tracker.get_logs(), *limit);

                if format.is_json() {
                    let json = serde_json::to_value(&logs).context("Failed to serialize logs")?;
                    formatter.print_json(&json);
                    return Ok(());
                }

                if logs.is_empty() {
                    formatter.info("No buffered errors.");
                    return Ok(());
                }

                println!(
                    "{:<20} {:<9} {:<11} {:<27} Message",
                    "Timestamp", "Severity", "Category", "ID"
                );
                println!("{}", "-".repeat(130));
                for entry in &logs {
                    println!("{}", format_row(entry));
                }
                println!();
                println!("Total: {} error(s)", logs.len());
            }

            LogsCommand::Stats => {
                let stats = tracker.get_stats();
                if format.is_json() {
                    let json =
                        serde_json::to_value(&stats).context("Failed to serialize statistics")?;
                    formatter.print_json(&json);
                } else {
                    print_stats(&stats);
                }
            }

            LogsCommand::Export { output } => {
                let document = tracker.export_logs();
                match output {
                    Some(path) => {
                        std::fs::write(path, &document).with_context(|| {
                            format!("Failed to write export to {}", path.display())
                        })?;
                        info!(path = %path.display(), "Exported error logs");
                        formatter.success(&format!("Exported to {}", path.display()));
                    }
                    None => println!("{document}"),
                }
            }

            LogsCommand::Clear => {
                let count = tracker.get_logs().len();
                tracker.clear_logs();
                formatter.success(&format!("Cleared {} buffered error(s)", count));
            }
        }

        Ok(())
    }
}

/// Keeps the last `limit` entries
fn tail(mut logs: Vec<LogEntry>, limit: Option<usize>) -> Vec<LogEntry> {
    if let Some(limit) = limit {
        let skip = logs.len().saturating_sub(limit);
        logs.drain(..skip);
    }
    logs
}

fn format_row(entry: &LogEntry) -> String {
    format!(
        "{:<20} {:<9} {:<11} {:<27} {}",
        entry.timestamp().format("%Y-%m-%d %H:%M:%S"),
        entry.severity(),
        entry.category(),
        entry.id().as_str(),
        truncate(entry.message(), MESSAGE_WIDTH),
    )
}

fn print_stats(stats: &ErrorStats) {
    println!("Total errors: {}", stats.total_errors);
    println!();

    println!("By severity:");
    for severity in Severity::ALL.iter().rev() {
        println!("  {:<10} {}", severity, stats.severity_count(*severity));
    }
    println!();

    println!("By category:");
    for category in Category::ALL {
        println!("  {:<10} {}", category, stats.category_count(category));
    }

    if !stats.top_errors.is_empty() {
        println!();
        println!("Most frequent:");
        for top in &stats.top_errors {
            println!("  {:>4}  {}", top.count, truncate(&top.message, MESSAGE_WIDTH));
        }
    }
}
