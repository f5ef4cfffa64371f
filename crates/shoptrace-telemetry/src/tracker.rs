//! Capture facade
//!
//! [`ErrorTracker`] is the only type application code needs. Every capture
//! is synchronous from the caller's side: classify, stamp with the client
//! environment, append to the bounded store, and escalate if critical.
//! Nothing here returns an error or panics on internal failure; a capture
//! that could not be recorded yields `None`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use shoptrace_core::{
    config::Config,
    domain::{
        Category, EntryId, ErrorStats, ExportDocument, LogEntry, Metadata, PendingBatch, RawError,
        Severity,
    },
    ports::{IClientEnvironment, ICollectorTransport, IKeyValueStore},
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::classifier::{classify, CaptureOrigin};
use crate::delivery::{DeliveryPipeline, RetryPolicy};
use crate::escalation::{EscalationEvent, EscalationNotifier};
use crate::http::HttpCollector;
use crate::metrics::TelemetryMetrics;
use crate::origin::HostEnvironment;
use crate::storage::{FileKeyValueStore, MemoryKeyValueStore};
use crate::store::{BoundedLogStore, DEFAULT_MAX_LOGS};

/// Context label of payment captures
pub const PAYMENT_CONTEXT: &str = "Payment Processing";
const UI_CONTEXT: &str = "UI Component";
const NETWORK_CONTEXT: &str = "Network Request";
const AUTH_CONTEXT: &str = "Authentication";

// ============================================================================
// Capture inputs
// ============================================================================

/// Optional fields of a generic capture
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    pub context: Option<String>,
    pub severity: Option<Severity>,
    pub category: Option<Category>,
    pub metadata: Metadata,
}

impl CaptureOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Replaces the metadata bag
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Adds one metadata field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The request behind a network failure
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    pub url: String,
    pub method: String,
    /// HTTP status, absent when no response arrived
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl NetworkRequest {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// The payment behind a payment failure
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub order_id: String,
    pub amount: f64,
    pub payment_method: String,
    pub currency: String,
}

/// Folds a typed helper into the open metadata bag
fn to_metadata<T: Serialize>(value: &T) -> Metadata {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Metadata::new(),
    }
}

// ============================================================================
// ErrorTracker
// ============================================================================

/// Capture facade over the store, escalation and delivery
pub struct ErrorTracker {
    store: Arc<BoundedLogStore>,
    escalation: EscalationNotifier,
    delivery: Option<Arc<DeliveryPipeline>>,
    environment: Arc<dyn IClientEnvironment>,
    metrics: Arc<TelemetryMetrics>,
}

impl ErrorTracker {
    pub fn builder() -> ErrorTrackerBuilder {
        ErrorTrackerBuilder::default()
    }

    /// Wires file storage, the HTTP collector (when a URL is configured)
    /// and the host environment, then re-arms any pending batch left by a
    /// previous session.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut storage = FileKeyValueStore::new(config.storage.dir.clone());
        if let Some(quota) = config.storage.quota_bytes {
            storage = storage.with_quota(quota);
        }

        let mut builder = Self::builder()
            .storage(Arc::new(storage))
            .max_logs(config.storage.max_logs)
            .retry_policy(RetryPolicy::from_config(&config.delivery))
            .client_info(&config.delivery.source, &config.delivery.client_version);

        if let Some(collector) = HttpCollector::from_config(&config.delivery)? {
            builder = builder.transport(Arc::new(collector));
        } else {
            debug!("No collector URL configured, errors will only be kept locally");
        }

        let tracker = builder.build()?;
        tracker.resume_pending();
        Ok(tracker)
    }

    /// [`from_config`](Self::from_config), then flushes every
    /// `delivery.flush_interval_secs` until `shutdown` fires.
    ///
    /// Fails outside a tokio runtime.
    pub fn start(config: &Config, shutdown: CancellationToken) -> anyhow::Result<Self> {
        tokio::runtime::Handle::try_current()
            .context("Starting the error tracker requires a tokio runtime")?;

        let tracker = Self::from_config(config)?;
        let interval = Duration::from_secs(config.delivery.flush_interval_secs);
        if tracker.spawn_periodic_flush(interval, shutdown).is_some() {
            info!(interval_secs = interval.as_secs(), "Periodic flush started");
        }
        Ok(tracker)
    }

    // ------------------------------------------------------------------------
    // Capture
    // ------------------------------------------------------------------------

    /// Records a failure with optional context, severity, category and
    /// metadata. Defaults to `medium`/`javascript`.
    pub fn capture(&self, error: impl Into<RawError>, options: CaptureOptions) -> Option<EntryId> {
        self.record(error.into(), CaptureOrigin::Generic, options, None)
    }

    /// Records a render failure as `high`/`ui`. `render_context` is the
    /// component trail that led to it.
    pub fn capture_ui_error(
        &self,
        error: impl Into<RawError>,
        render_context: impl Into<String>,
        context: Option<&str>,
    ) -> Option<EntryId> {
        let render_context = render_context.into();
        let options = CaptureOptions::new()
            .with_context(context.unwrap_or(UI_CONTEXT))
            .with_field("componentStack", render_context.clone());
        self.record(error.into(), CaptureOrigin::Ui, options, Some(render_context))
    }

    /// Records a failed request; `high` for 5xx, `medium` otherwise.
    pub fn capture_network_error(
        &self,
        error: impl Into<RawError>,
        request: &NetworkRequest,
        context: Option<&str>,
    ) -> Option<EntryId> {
        let options = CaptureOptions::new()
            .with_context(context.unwrap_or(NETWORK_CONTEXT))
            .with_metadata(to_metadata(request));
        let origin = CaptureOrigin::Network {
            status: request.status,
        };
        self.record(error.into(), origin, options, None)
    }

    /// Records a login, session or permission failure as `high`/`auth`.
    pub fn capture_auth_error(
        &self,
        error: impl Into<RawError>,
        context: Option<&str>,
    ) -> Option<EntryId> {
        let options = CaptureOptions::new().with_context(context.unwrap_or(AUTH_CONTEXT));
        self.record(error.into(), CaptureOrigin::Auth, options, None)
    }

    /// Records a payment failure. Always `critical`/`payment`, so it is
    /// escalated immediately.
    pub fn capture_payment_error(
        &self,
        error: impl Into<RawError>,
        payment: &PaymentDetails,
    ) -> Option<EntryId> {
        let options = CaptureOptions::new()
            .with_context(PAYMENT_CONTEXT)
            .with_metadata(to_metadata(payment));
        self.record(error.into(), CaptureOrigin::Payment, options, None)
    }

    /// Capture path of the process-wide hooks
    pub(crate) fn capture_from_hook(
        &self,
        error: RawError,
        origin: CaptureOrigin,
        context: &str,
    ) -> Option<EntryId> {
        self.record(error, origin, CaptureOptions::new().with_context(context), None)
    }

    fn record(
        &self,
        error: RawError,
        origin: CaptureOrigin,
        options: CaptureOptions,
        component_context: Option<String>,
    ) -> Option<EntryId> {
        let (severity, category) = classify(origin, options.severity, options.category);

        let mut entry = LogEntry::new(error, severity, category, self.environment.origin())
            .with_metadata(options.metadata);
        if let Some(context) = options.context {
            entry = entry.with_context(context);
        }
        if let Some(component_context) = component_context {
            entry = entry.with_component_context(component_context);
        }
        if let Some(actor_id) = self.environment.current_actor() {
            entry = entry.with_actor_id(actor_id);
        }

        let id = entry.id().clone();
        let escalate = severity.is_critical().then(|| entry.clone());

        if !self.store.append(entry) {
            return None;
        }
        self.metrics.record_capture(category, severity);
        debug!(id = %id, %severity, %category, "Captured error");

        if let Some(entry) = escalate {
            self.escalation.notify_if_critical(&entry);
        }
        Some(id)
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Every buffered entry, oldest first
    pub fn get_logs(&self) -> Vec<LogEntry> {
        self.store.all()
    }

    pub fn get_stats(&self) -> ErrorStats {
        aggregate::stats(&self.store.all())
    }

    pub fn clear_logs(&self) {
        self.store.clear();
        info!("Cleared buffered error logs");
    }

    pub fn export_document(&self) -> ExportDocument {
        aggregate::export(self.store.all(), Utc::now())
    }

    /// Pretty-printed `{ exportDate, stats, logs }` document
    pub fn export_logs(&self) -> String {
        match serde_json::to_string_pretty(&self.export_document()) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize error log export");
                String::new()
            }
        }
    }

    pub fn subscribe_escalations(&self) -> broadcast::Receiver<EscalationEvent> {
        self.escalation.subscribe()
    }

    pub fn metrics(&self) -> &Arc<TelemetryMetrics> {
        &self.metrics
    }

    // ------------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------------

    /// Sends everything buffered to the collector.
    ///
    /// Returns `false` without a configured collector.
    pub async fn flush(&self) -> bool {
        match &self.delivery {
            Some(delivery) => delivery.flush().await,
            None => {
                debug!("No collector configured, nothing flushed");
                false
            }
        }
    }

    /// The batch awaiting a deferred retry, if any
    pub fn pending_batch(&self) -> Option<PendingBatch> {
        self.delivery.as_ref().and_then(|d| d.pending())
    }

    pub fn has_scheduled_retry(&self) -> bool {
        self.delivery
            .as_ref()
            .is_some_and(|d| d.has_scheduled_retry())
    }

    /// Re-arms the deferred retry of a persisted pending batch.
    pub fn resume_pending(&self) -> bool {
        self.delivery
            .as_ref()
            .is_some_and(|d| d.resume_pending())
    }

    /// Flushes every `interval` until `shutdown` fires. `None` without a
    /// configured collector.
    pub fn spawn_periodic_flush(
        &self,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        self.delivery
            .as_ref()
            .map(|d| d.spawn_periodic_flush(interval, shutdown))
    }

    /// Cancels the deferred retry timer. Buffered and pending entries stay
    /// persisted for the next session.
    pub fn shutdown(&self) {
        if let Some(delivery) = &self.delivery {
            delivery.shutdown();
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles an [`ErrorTracker`] from its ports
pub struct ErrorTrackerBuilder {
    storage: Option<Arc<dyn IKeyValueStore>>,
    transport: Option<Arc<dyn ICollectorTransport>>,
    environment: Option<Arc<dyn IClientEnvironment>>,
    metrics: Option<Arc<TelemetryMetrics>>,
    max_logs: usize,
    policy: RetryPolicy,
    source: Option<String>,
    version: Option<String>,
}

impl Default for ErrorTrackerBuilder {
    fn default() -> Self {
        Self {
            storage: None,
            transport: None,
            environment: None,
            metrics: None,
            max_logs: DEFAULT_MAX_LOGS,
            policy: RetryPolicy::default(),
            source: None,
            version: None,
        }
    }
}

impl ErrorTrackerBuilder {
    /// Durable storage; in-memory when unset
    pub fn storage(mut self, storage: Arc<dyn IKeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Collector; without one entries are only kept locally
    pub fn transport(mut self, transport: Arc<dyn ICollectorTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn environment(mut self, environment: Arc<dyn IClientEnvironment>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn metrics(mut self, metrics: Arc<TelemetryMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn max_logs(mut self, max_logs: usize) -> Self {
        self.max_logs = max_logs;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn client_info(mut self, source: impl Into<String>, version: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self.version = Some(version.into());
        self
    }

    pub fn build(self) -> anyhow::Result<ErrorTracker> {
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(TelemetryMetrics::new()?),
        };
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryKeyValueStore::new()));
        let environment = self
            .environment
            .unwrap_or_else(|| Arc::new(HostEnvironment::new()));

        let store = Arc::new(BoundedLogStore::open(
            Arc::clone(&storage),
            self.max_logs,
            Arc::clone(&metrics),
        ));

        let delivery = self.transport.as_ref().map(|transport| {
            let mut pipeline = DeliveryPipeline::new(
                Arc::clone(&store),
                Arc::clone(&storage),
                Arc::clone(transport),
                Arc::clone(&metrics),
            )
            .with_policy(self.policy);
            if let (Some(source), Some(version)) = (&self.source, &self.version) {
                pipeline = pipeline.with_client_info(source, version);
            }
            Arc::new(pipeline)
        });

        let escalation = EscalationNotifier::new(self.transport, Arc::clone(&metrics));

        debug!(
            capacity = store.capacity(),
            buffered = store.len(),
            delivery = delivery.is_some(),
            "Error tracker ready"
        );

        Ok(ErrorTracker {
            store,
            escalation,
            delivery,
            environment,
            metrics,
        })
    }
}
