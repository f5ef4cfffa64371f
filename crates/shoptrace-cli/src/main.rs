//! ShopTrace CLI - Inspect and operate the local error telemetry buffer
//!
//! Provides commands for:
//! - Listing, summarizing, exporting and clearing buffered errors
//! - Flushing buffered errors to the collector
//! - Recording a test capture
//! - Inspecting the batch awaiting a deferred retry
//! - Printing telemetry metrics
//! - Viewing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use shoptrace_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    capture::CaptureCommand, completions::CompletionsCommand, config::ConfigCommand,
    flush::FlushCommand, logs::LogsCommand, metrics::MetricsCommand, pending::PendingCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "shoptrace", version, about = "Storefront error telemetry pipeline")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Inspect buffered error logs
    #[command(subcommand)]
    Logs(LogsCommand),
    /// Send buffered errors to the collector
    Flush(FlushCommand),
    /// Record an error by hand
    Capture(CaptureCommand),
    /// Show the batch awaiting a deferred retry
    Pending(PendingCommand),
    /// Print telemetry metrics in Prometheus text format
    Metrics(MetricsCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    // Setup tracing
    let filter = match cli.verbose {
        0 => Config::load_or_default(&config_path).logging.level,
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Logs(cmd) => cmd.execute(format, &config_path).await,
        Commands::Flush(cmd) => cmd.execute(format, &config_path).await,
        Commands::Capture(cmd) => cmd.execute(format, &config_path).await,
        Commands::Pending(cmd) => cmd.execute(format, &config_path).await,
        Commands::Metrics(cmd) => cmd.execute(format, &config_path).await,
        Commands::Config(cmd) => cmd.execute(format, &config_path).await,
        Commands::Completions(cmd) => cmd.execute(format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["shoptrace", "logs", "list", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Logs(LogsCommand::List { limit: None })));
    }

    #[test]
    fn test_config_path_flag() {
        let cli =
            Cli::try_parse_from(["shoptrace", "--config", "/tmp/shoptrace.yaml", "pending"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/shoptrace.yaml")));
    }

    #[test]
    fn test_flush_watch_and_metrics_parse() {
        let cli = Cli::try_parse_from(["shoptrace", "flush", "--watch"]).unwrap();
        assert!(matches!(cli.command, Commands::Flush(FlushCommand { watch: true })));

        let cli = Cli::try_parse_from(["shoptrace", "metrics", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Metrics(_)));
    }
}
