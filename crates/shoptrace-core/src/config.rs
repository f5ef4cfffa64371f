//! Configuration module for ShopTrace.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for the telemetry pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub delivery: DeliveryConfig,
    pub logging: LoggingConfig,
}

/// Durable buffer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the `error_logs` and `pending_error_logs` records.
    pub dir: PathBuf,
    /// Maximum number of entries kept in the live log list.
    pub max_logs: usize,
    /// Optional byte quota for a single record; `None` means unlimited.
    pub quota_bytes: Option<u64>,
}

/// Remote collector and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Base URL of the collector, e.g. `https://telemetry.example.com`.
    /// `None` disables delivery; entries stay buffered locally.
    pub collector_url: Option<String>,
    /// Path of the batch endpoint.
    pub batch_path: String,
    /// Path of the high-priority single-entry endpoint.
    pub critical_path: String,
    /// Path of the admin alert endpoint.
    pub admin_alert_path: String,
    /// Retries per batch, both in-call and deferred.
    pub max_retries: u32,
    /// First in-call backoff delay (milliseconds); doubles on each retry.
    pub base_delay_ms: u64,
    /// Cooldown before the first deferred retry of a pending batch (seconds).
    pub first_cooldown_secs: u64,
    /// Cooldown before every later deferred retry (seconds).
    pub later_cooldown_secs: u64,
    /// Seconds between periodic flushes.
    pub flush_interval_secs: u64,
    /// Source tag sent with every batch.
    pub source: String,
    /// Client version sent with every batch.
    pub client_version: String,
    /// Environment variable holding the collector bearer token.
    pub token_env: String,
    /// Optional request timeout (seconds); `None` leaves it to the transport.
    pub request_timeout_secs: Option<u64>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/shoptrace/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("shoptrace")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("shoptrace")
                .join("telemetry"),
            max_logs: 100,
            quota_bytes: None,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            collector_url: None,
            batch_path: "/api/errors/batch".to_string(),
            critical_path: "/api/errors/critical".to_string(),
            admin_alert_path: "/api/admin/alerts".to_string(),
            max_retries: 3,
            base_delay_ms: 1000,
            first_cooldown_secs: 300,
            later_cooldown_secs: 600,
            flush_interval_secs: 60,
            source: "web-client".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            token_env: "SHOPTRACE_TOKEN".to_string(),
            request_timeout_secs: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"storage.max_logs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut require_positive = |field: &str, value: u64| {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        };

        // --- storage ---
        require_positive("storage.max_logs", self.storage.max_logs as u64);
        if let Some(quota) = self.storage.quota_bytes {
            require_positive("storage.quota_bytes", quota);
        }

        // --- delivery ---
        require_positive("delivery.max_retries", u64::from(self.delivery.max_retries));
        require_positive("delivery.base_delay_ms", self.delivery.base_delay_ms);
        require_positive(
            "delivery.first_cooldown_secs",
            self.delivery.first_cooldown_secs,
        );
        require_positive(
            "delivery.later_cooldown_secs",
            self.delivery.later_cooldown_secs,
        );
        require_positive(
            "delivery.flush_interval_secs",
            self.delivery.flush_interval_secs,
        );

        if let Some(url) = &self.delivery.collector_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(ValidationError {
                    field: "delivery.collector_url".into(),
                    message: format!("must be an http(s) URL, got '{url}'"),
                });
            }
        }

        for (field, path) in [
            ("delivery.batch_path", &self.delivery.batch_path),
            ("delivery.critical_path", &self.delivery.critical_path),
            ("delivery.admin_alert_path", &self.delivery.admin_alert_path),
        ] {
            if !path.starts_with('/') {
                errors.push(ValidationError {
                    field: field.into(),
                    message: format!("must start with '/', got '{path}'"),
                });
            }
        }

        if self.delivery.source.trim().is_empty() {
            errors.push(ValidationError {
                field: "delivery.source".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use shoptrace_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .storage_dir(PathBuf::from("/var/lib/shop/telemetry"))
///     .collector_url("https://telemetry.example.com")
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- storage ---

    pub fn storage_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.dir = dir;
        self
    }

    pub fn max_logs(mut self, max_logs: usize) -> Self {
        self.config.storage.max_logs = max_logs;
        self
    }

    pub fn quota_bytes(mut self, quota: u64) -> Self {
        self.config.storage.quota_bytes = Some(quota);
        self
    }

    // --- delivery ---

    pub fn collector_url(mut self, url: impl Into<String>) -> Self {
        self.config.delivery.collector_url = Some(url.into());
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.delivery.max_retries = n;
        self
    }

    pub fn base_delay_ms(mut self, ms: u64) -> Self {
        self.config.delivery.base_delay_ms = ms;
        self
    }

    pub fn cooldowns_secs(mut self, first: u64, later: u64) -> Self {
        self.config.delivery.first_cooldown_secs = first;
        self.config.delivery.later_cooldown_secs = later;
        self
    }

    pub fn flush_interval_secs(mut self, seconds: u64) -> Self {
        self.config.delivery.flush_interval_secs = seconds;
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.config.delivery.source = source.into();
        self
    }

    pub fn client_version(mut self, version: impl Into<String>) -> Self {
        self.config.delivery.client_version = version.into();
        self
    }

    pub fn token_env(mut self, var: impl Into<String>) -> Self {
        self.config.delivery.token_env = var.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
