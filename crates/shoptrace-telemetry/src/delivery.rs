//! Batch delivery with in-call backoff and deferred retry
//!
//! A flush snapshots the live store and POSTs it as one [`BatchPayload`].
//! Each flush goes through these states:
//!
//! ```text
//! Idle -> Sending -> Delivered
//!            |          ^
//!            v          |
//!        Retrying{n} ---+
//!            |
//!            v
//!        Abandoned  (batch demoted to the pending record)
//! ```
//!
//! - On success exactly the ids that were sent leave the store; entries
//!   appended while the request was in flight stay for the next flush.
//! - On failure the batch is retried in-call up to `max_retries` times with
//!   exponential backoff (1s, 2s, 4s with the defaults).
//! - Once those are spent the batch leaves the live store and is merged into
//!   the single pending batch persisted under `pending_error_logs`. A
//!   cancellable timer retries it after 5 minutes, then every 10 minutes,
//!   one send per window. After `max_retries` failed windows the batch is
//!   dropped and counted in `entries_dropped_total`.
//!
//! Concurrent flushes are coalesced: a flush started while another is in
//! flight waits for and returns that flush's result instead of sending the
//! same entries twice.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;

use shoptrace_core::{
    config::DeliveryConfig,
    domain::{BatchPayload, EntryId, LogEntry, PendingBatch},
    ports::{ICollectorTransport, IKeyValueStore},
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::TelemetryMetrics;
use crate::store::BoundedLogStore;

/// Record key of the pending batch
pub const PENDING_KEY: &str = "pending_error_logs";

/// Retry budget and timings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// In-call retries after the first send, and also the number of
    /// deferred windows a pending batch gets
    pub max_retries: u32,
    /// Backoff before in-call retry `n` is `base_delay * 2^(n-1)`
    pub base_delay: Duration,
    /// Wait before the first deferred attempt
    pub first_cooldown: Duration,
    /// Wait before each later deferred attempt
    pub later_cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            first_cooldown: Duration::from_secs(300),
            later_cooldown: Duration::from_secs(600),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            first_cooldown: Duration::from_secs(config.first_cooldown_secs),
            later_cooldown: Duration::from_secs(config.later_cooldown_secs),
        }
    }

    /// Delay before in-call retry `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Where the most recent flush got to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Idle,
    Sending,
    /// Waiting out the backoff after failed attempt `attempt`
    Retrying { attempt: u32 },
    Delivered,
    /// In-call retries spent; the batch went to the pending record
    Abandoned,
}

/// Flushes the live store to the collector
pub struct DeliveryPipeline {
    store: Arc<BoundedLogStore>,
    storage: Arc<dyn IKeyValueStore>,
    transport: Arc<dyn ICollectorTransport>,
    metrics: Arc<TelemetryMetrics>,
    policy: RetryPolicy,
    source: String,
    version: String,
    state: Mutex<DeliveryState>,
    /// Result channel of the flush currently in flight
    in_flight: Mutex<Option<watch::Receiver<Option<bool>>>>,
    /// Serializes read-modify-write of the pending record
    pending_lock: tokio::sync::Mutex<()>,
    retry_timer: Mutex<Option<CancellationToken>>,
}

enum FlushRole {
    Leader(watch::Sender<Option<bool>>),
    Follower(watch::Receiver<Option<bool>>),
}

/// Clears the in-flight slot when the leading flush ends, even if its
/// future is dropped mid-send.
struct InFlightGuard<'a> {
    slot: &'a Mutex<Option<watch::Receiver<Option<bool>>>>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl DeliveryPipeline {
    pub fn new(
        store: Arc<BoundedLogStore>,
        storage: Arc<dyn IKeyValueStore>,
        transport: Arc<dyn ICollectorTransport>,
        metrics: Arc<TelemetryMetrics>,
    ) -> Self {
        Self {
            store,
            storage,
            transport,
            metrics,
            policy: RetryPolicy::default(),
            source: "web-client".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: Mutex::new(DeliveryState::Idle),
            in_flight: Mutex::new(None),
            pending_lock: tokio::sync::Mutex::new(()),
            retry_timer: Mutex::new(None),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the `source` and `version` stamped on every batch
    pub fn with_client_info(mut self, source: impl Into<String>, version: impl Into<String>) -> Self {
        self.source = source.into();
        self.version = version.into();
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn state(&self) -> DeliveryState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Flush
    // ========================================================================

    /// Delivers everything currently in the store.
    ///
    /// Returns `true` if the store was empty or the batch was acknowledged,
    /// `false` if it was demoted to the pending record. Never errors.
    pub async fn flush(self: &Arc<Self>) -> bool {
        let role = {
            let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some(rx) => FlushRole::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx);
                    FlushRole::Leader(tx)
                }
            }
        };

        match role {
            FlushRole::Follower(mut rx) => {
                debug!("Flush already in flight, joining it");
                match rx.wait_for(|result| result.is_some()).await {
                    Ok(result) => (*result).unwrap_or(false),
                    // Leader was dropped before finishing
                    Err(_) => false,
                }
            }
            FlushRole::Leader(tx) => {
                let _guard = InFlightGuard {
                    slot: &self.in_flight,
                };
                let delivered = self.deliver_snapshot().await;
                tx.send_replace(Some(delivered));
                delivered
            }
        }
    }

    async fn deliver_snapshot(self: &Arc<Self>) -> bool {
        let entries = self.store.all();
        if entries.is_empty() {
            debug!("Nothing to flush");
            return true;
        }

        let payload = BatchPayload::new(entries, &self.source, &self.version);
        let ids = payload.ids();
        self.set_state(DeliveryState::Sending);
        debug!(count = payload.len(), "Flushing error batch");

        if self.send_with_backoff(&payload).await {
            let removed = self.store.remove(&ids);
            self.set_state(DeliveryState::Delivered);
            info!(delivered = payload.len(), removed, "Error batch delivered");

            // The collector is reachable again; don't wait for the timer
            if self.pending().is_some() {
                self.retry_pending_now().await;
            }
            true
        } else {
            self.set_state(DeliveryState::Abandoned);
            self.demote(payload.logs, ids).await;
            false
        }
    }

    /// One initial send plus up to `max_retries` retries with backoff.
    async fn send_with_backoff(&self, payload: &BatchPayload) -> bool {
        let attempts = self.policy.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            match self.transport.send_batch(payload).await {
                Ok(()) => {
                    self.metrics.record_delivery(true, payload.len());
                    if attempt > 1 {
                        info!(attempt, "Error batch delivered after retry");
                    }
                    return true;
                }
                Err(e) => {
                    self.metrics.record_delivery(false, payload.len());
                    if attempt == attempts {
                        warn!(attempts, error = %e, "Error batch delivery failed, retries exhausted");
                        break;
                    }

                    let delay = self.policy.backoff(attempt);
                    self.set_state(DeliveryState::Retrying { attempt });
                    info!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Error batch delivery failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        false
    }

    /// Moves a failed batch out of the live store into the pending record.
    async fn demote(self: &Arc<Self>, entries: Vec<LogEntry>, ids: HashSet<EntryId>) {
        let _pending = self.pending_lock.lock().await;

        let batch = match self.load_pending() {
            Some(mut existing) => {
                let dropped = existing.merge(entries, self.store.capacity());
                if dropped > 0 {
                    self.metrics.record_dropped(dropped);
                    warn!(dropped, "Pending batch full, dropped oldest entries");
                }
                existing
            }
            None => PendingBatch::new(entries),
        };

        if !self.save_pending(&batch) {
            // Entries stay in the live store and ride the next flush
            return;
        }
        self.store.remove(&ids);
        self.metrics.set_pending(true);
        info!(
            count = batch.len(),
            retry_count = batch.retry_count(),
            "Error batch queued for deferred retry"
        );

        if !self.has_scheduled_retry() {
            self.schedule_retry(self.delay_for(&batch), batch.retry_count());
        }
    }

    // ========================================================================
    // Pending batch
    // ========================================================================

    /// The batch awaiting a deferred retry, if any
    pub fn pending(&self) -> Option<PendingBatch> {
        self.load_pending()
    }

    /// True while a deferred retry timer is armed
    pub fn has_scheduled_retry(&self) -> bool {
        self.timer_slot()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Sends the pending batch once, outside the timer schedule.
    ///
    /// A failure here does not count against the deferred retry budget.
    /// Returns `true` if no pending batch remains.
    pub async fn retry_pending_now(self: &Arc<Self>) -> bool {
        let _pending = self.pending_lock.lock().await;
        let Some(batch) = self.load_pending() else {
            return true;
        };

        let payload = BatchPayload::new(batch.into_entries(), &self.source, &self.version);
        match self.transport.send_batch(&payload).await {
            Ok(()) => {
                self.metrics.record_delivery(true, payload.len());
                self.finish_pending();
                info!(delivered = payload.len(), "Pending error batch delivered");
                true
            }
            Err(e) => {
                self.metrics.record_delivery(false, payload.len());
                debug!(error = %e, "Pending error batch still undeliverable");
                false
            }
        }
    }

    /// Re-arms the deferred retry for a pending batch left by a previous
    /// session. Returns whether one was found.
    pub fn resume_pending(self: &Arc<Self>) -> bool {
        let Some(batch) = self.load_pending() else {
            return false;
        };
        self.metrics.set_pending(true);
        let delay = self.delay_for(&batch);
        info!(
            count = batch.len(),
            retry_count = batch.retry_count(),
            delay_secs = delay.as_secs(),
            "Resuming pending error batch"
        );
        if !self.has_scheduled_retry() {
            self.schedule_retry(delay, batch.retry_count());
        }
        true
    }

    /// Cancels the deferred retry timer. The pending record is kept.
    pub fn shutdown(&self) {
        self.cancel_timer();
        debug!("Delivery pipeline shut down");
    }

    /// Arms the deferred retry timer.
    ///
    /// `retry_floor` is the attempt count already reached in memory; the
    /// timer never trusts a stored record below it.
    fn schedule_retry(self: &Arc<Self>, delay: Duration, retry_floor: u32) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime available, deferred retry not scheduled");
                return;
            }
        };

        let token = CancellationToken::new();
        if let Some(previous) = self.timer_slot().replace(token.clone()) {
            previous.cancel();
        }

        let pipeline: Weak<Self> = Arc::downgrade(self);
        handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Deferred retry cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    if let Some(pipeline) = pipeline.upgrade() {
                        pipeline.run_deferred_retry(&token, retry_floor).await;
                    }
                }
            }
        });

        info!(delay_secs = delay.as_secs(), "Deferred retry scheduled");
    }

    async fn run_deferred_retry(self: &Arc<Self>, token: &CancellationToken, retry_floor: u32) {
        let pending = self.pending_lock.lock().await;
        if token.is_cancelled() {
            return;
        }

        let Some(mut batch) = self.load_pending() else {
            self.finish_pending();
            return;
        };
        batch.raise_retry_count(retry_floor);

        let payload = BatchPayload::new(batch.entries().to_vec(), &self.source, &self.version);
        let error = match self.transport.send_batch(&payload).await {
            Ok(()) => {
                self.metrics.record_delivery(true, payload.len());
                self.finish_pending();
                info!(
                    delivered = payload.len(),
                    retry_count = batch.retry_count(),
                    "Pending error batch delivered"
                );
                return;
            }
            Err(e) => e,
        };

        self.metrics.record_delivery(false, payload.len());
        let attempts = batch.record_failed_attempt();

        if batch.is_exhausted(self.policy.max_retries) {
            warn!(
                attempts,
                dropped = batch.len(),
                error = %error,
                "Pending error batch abandoned after deferred retries"
            );
            self.metrics.record_dropped(batch.len());
            self.finish_pending();
            return;
        }

        info!(attempts, error = %error, "Deferred retry failed");
        if !self.save_pending(&batch) {
            debug!(attempts, "Carrying retry count in memory");
        }
        drop(pending);
        self.schedule_retry(self.delay_for(&batch), attempts);
    }

    fn delay_for(&self, batch: &PendingBatch) -> Duration {
        batch.next_delay(
            self.policy.first_cooldown,
            self.policy.later_cooldown,
            Utc::now(),
        )
    }

    /// Drops the pending record and disarms the timer.
    fn finish_pending(&self) {
        if let Err(e) = self.storage.remove(PENDING_KEY) {
            self.metrics.record_storage_error();
            warn!(error = %e, "Failed to remove pending error batch");
        }
        self.cancel_timer();
        self.metrics.set_pending(false);
    }

    fn load_pending(&self) -> Option<PendingBatch> {
        let raw = match self.storage.get(PENDING_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                self.metrics.record_storage_error();
                warn!(error = %e, "Failed to read pending error batch");
                return None;
            }
        };

        match serde_json::from_str::<PendingBatch>(&raw) {
            Ok(batch) => Some(batch),
            Err(e) => {
                self.metrics.record_storage_error();
                warn!(error = %e, "Discarding corrupt pending error batch");
                let _ = self.storage.remove(PENDING_KEY);
                None
            }
        }
    }

    fn save_pending(&self, batch: &PendingBatch) -> bool {
        let result = serde_json::to_string(batch)
            .map_err(Into::into)
            .and_then(|json| self.storage.set(PENDING_KEY, &json));

        match result {
            Ok(()) => true,
            Err(e) => {
                self.metrics.record_storage_error();
                warn!(error = %e, count = batch.len(), "Failed to persist pending error batch");
                false
            }
        }
    }

    fn cancel_timer(&self) {
        if let Some(token) = self.timer_slot().take() {
            token.cancel();
        }
    }

    fn timer_slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.retry_timer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: DeliveryState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    // ========================================================================
    // Periodic flush
    // ========================================================================

    /// Flushes every `interval` until `shutdown` is cancelled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_periodic_flush(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Periodic flush stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let delivered = pipeline.flush().await;
                        debug!(delivered, "Periodic flush finished");
                    }
                }
            }
        })
    }
}
