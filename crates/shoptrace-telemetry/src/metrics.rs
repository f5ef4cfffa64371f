//! Prometheus metrics for the telemetry pipeline itself
//!
//! Counts what the pipeline did with entries (captured, evicted, delivered,
//! dropped) and how its side paths fared. Once a pending batch is abandoned,
//! these counters are the only evidence its entries existed.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use shoptrace_core::domain::{Category, Severity};

/// Registry holding every pipeline metric.
///
/// Each instance owns a private registry, so several trackers in one process
/// (or one per test) never collide.
pub struct TelemetryMetrics {
    registry: Registry,
    /// Counter: captured entries by (category, severity)
    pub entries_captured_total: IntCounterVec,
    /// Counter: entries evicted from the live store by the capacity cap
    pub entries_evicted_total: IntCounter,
    /// Counter: persistence failures absorbed by the store
    pub storage_errors_total: IntCounter,
    /// Counter: batch sends by result (success, failure)
    pub delivery_attempts_total: IntCounterVec,
    /// Counter: entries acknowledged by the collector
    pub entries_delivered_total: IntCounter,
    /// Counter: entries given up on after the deferred retry budget ran out
    pub entries_dropped_total: IntCounter,
    /// Gauge: 1 while a pending batch awaits a deferred retry
    pub pending_batches: IntGauge,
    /// Counter: escalation side actions by (action, result)
    pub escalations_total: IntCounterVec,
}

impl TelemetryMetrics {
    /// Creates a new `TelemetryMetrics` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("shoptrace".to_string()), None)?;

        let entries_captured_total = IntCounterVec::new(
            Opts::new("entries_captured_total", "Captured log entries"),
            &["category", "severity"],
        )?;
        registry.register(Box::new(entries_captured_total.clone()))?;

        let entries_evicted_total = IntCounter::with_opts(Opts::new(
            "entries_evicted_total",
            "Entries evicted by the store capacity cap",
        ))?;
        registry.register(Box::new(entries_evicted_total.clone()))?;

        let storage_errors_total = IntCounter::with_opts(Opts::new(
            "storage_errors_total",
            "Persistence failures absorbed by the pipeline",
        ))?;
        registry.register(Box::new(storage_errors_total.clone()))?;

        let delivery_attempts_total = IntCounterVec::new(
            Opts::new("delivery_attempts_total", "Batch sends to the collector"),
            &["result"],
        )?;
        registry.register(Box::new(delivery_attempts_total.clone()))?;

        let entries_delivered_total = IntCounter::with_opts(Opts::new(
            "entries_delivered_total",
            "Entries acknowledged by the collector",
        ))?;
        registry.register(Box::new(entries_delivered_total.clone()))?;

        let entries_dropped_total = IntCounter::with_opts(Opts::new(
            "entries_dropped_total",
            "Entries abandoned after exhausting deferred retries",
        ))?;
        registry.register(Box::new(entries_dropped_total.clone()))?;

        let pending_batches = IntGauge::with_opts(Opts::new(
            "pending_batches",
            "Pending batches awaiting a deferred retry",
        ))?;
        registry.register(Box::new(pending_batches.clone()))?;

        let escalations_total = IntCounterVec::new(
            Opts::new("escalations_total", "Escalation side actions"),
            &["action", "result"],
        )?;
        registry.register(Box::new(escalations_total.clone()))?;

        Ok(Self {
            registry,
            entries_captured_total,
            entries_evicted_total,
            storage_errors_total,
            delivery_attempts_total,
            entries_delivered_total,
            entries_dropped_total,
            pending_batches,
            escalations_total,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    pub fn record_capture(&self, category: Category, severity: Severity) {
        self.entries_captured_total
            .with_label_values(&[category.as_str(), severity.as_str()])
            .inc();
    }

    pub fn record_evictions(&self, count: usize) {
        self.entries_evicted_total.inc_by(count as u64);
    }

    pub fn record_storage_error(&self) {
        self.storage_errors_total.inc();
    }

    /// Record one batch send and, on success, how many entries it carried.
    pub fn record_delivery(&self, success: bool, entries: usize) {
        let result = if success { "success" } else { "failure" };
        self.delivery_attempts_total
            .with_label_values(&[result])
            .inc();
        if success {
            self.entries_delivered_total.inc_by(entries as u64);
        }
    }

    pub fn record_dropped(&self, count: usize) {
        self.entries_dropped_total.inc_by(count as u64);
    }

    pub fn set_pending(&self, pending: bool) {
        self.pending_batches.set(i64::from(pending));
    }

    pub fn record_escalation(&self, action: &str, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.escalations_total
            .with_label_values(&[action, result])
            .inc();
    }

    // ========================================================================
    // Reading helpers
    // ========================================================================

    pub fn captured(&self, category: Category, severity: Severity) -> u64 {
        self.entries_captured_total
            .with_label_values(&[category.as_str(), severity.as_str()])
            .get()
    }

    pub fn delivery_attempts(&self, success: bool) -> u64 {
        let result = if success { "success" } else { "failure" };
        self.delivery_attempts_total
            .with_label_values(&[result])
            .get()
    }

    pub fn escalations(&self, action: &str, success: bool) -> u64 {
        let result = if success { "success" } else { "failure" };
        self.escalations_total
            .with_label_values(&[action, result])
            .get()
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
