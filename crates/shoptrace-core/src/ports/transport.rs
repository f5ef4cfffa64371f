//! Collector transport port (driven/secondary port)
//!
//! This module defines the interface for shipping telemetry to the remote
//! collector. Three endpoints exist: the bulk batch endpoint used by the
//! delivery pipeline, and the high-priority and admin-alert endpoints used by
//! escalation.
//!
//! ## Design Notes
//!
//! - A call either succeeds (the collector acknowledged every entry it was
//!   given) or fails as a whole; there is no partial acknowledgement.
//! - Retries are the caller's concern, never the transport's.

use thiserror::Error;

use crate::domain::{AdminAlert, BatchPayload, LogEntry};

/// Errors raised while talking to the collector
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request never produced a response (DNS, connect, TLS, reset)
    #[error("Request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },

    /// The collector answered with a non-success status
    #[error("Collector returned HTTP {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },
}

/// Port trait for outbound delivery to the remote collector
#[async_trait::async_trait]
pub trait ICollectorTransport: Send + Sync {
    /// Sends a batch of entries to the bulk endpoint
    async fn send_batch(&self, payload: &BatchPayload) -> Result<(), TransportError>;

    /// Sends one critical entry to the high-priority endpoint
    async fn send_critical(&self, entry: &LogEntry) -> Result<(), TransportError>;

    /// Sends an alert to the admin endpoint
    async fn send_admin_alert(&self, alert: &AdminAlert) -> Result<(), TransportError>;
}

// ============================================================================
// Bearer credential lookup
// ============================================================================

/// Source of the bearer credential attached to collector requests.
///
/// Looked up per request so a token refreshed by the host is picked up
/// without rebuilding the transport.
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token (or none)
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl TokenSource for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Reads the token from an environment variable on every request
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl TokenSource for EnvToken {
    fn bearer_token(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|t| !t.is_empty())
    }
}
