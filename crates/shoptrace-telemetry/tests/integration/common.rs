//! Shared test helpers for pipeline integration tests
//!
//! Provides a scriptable in-process collector and wiremock setup for the
//! HTTP collector.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shoptrace_core::{
    domain::{AdminAlert, BatchPayload, LogEntry},
    ports::{ICollectorTransport, TransportError},
};
use shoptrace_telemetry::{ErrorTracker, MemoryKeyValueStore, RetryPolicy};
use tokio::sync::Notify;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Lets a test hold a batch send mid-flight
pub struct BatchGate {
    /// Signalled when the held send has started
    pub entered: Notify,
    /// Signal to let the held send complete
    pub release: Notify,
}

/// In-process collector with scripted failures
#[derive(Default)]
pub struct MockTransport {
    failures_remaining: AtomicU32,
    batch_sends: AtomicU32,
    pub batches: Mutex<Vec<BatchPayload>>,
    pub criticals: Mutex<Vec<LogEntry>>,
    pub alerts: Mutex<Vec<AdminAlert>>,
    gate: Mutex<Option<Arc<BatchGate>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every batch send fails
    pub fn failing() -> Self {
        let transport = Self::default();
        transport.failures_remaining.store(u32::MAX, Ordering::SeqCst);
        transport
    }

    /// Fails the next `n` batch sends
    pub fn fail_next(&self, n: u32) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Holds the next batch send until the returned gate is released
    pub fn hold_next_batch(&self) -> Arc<BatchGate> {
        let gate = Arc::new(BatchGate {
            entered: Notify::new(),
            release: Notify::new(),
        });
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn batch_sends(&self) -> u32 {
        self.batch_sends.load(Ordering::SeqCst)
    }

    /// Messages of every acknowledged batch, in send order
    pub fn delivered_messages(&self) -> Vec<Vec<String>> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.logs.iter().map(|e| e.message().to_string()).collect())
            .collect()
    }
}

#[async_trait]
impl ICollectorTransport for MockTransport {
    async fn send_batch(&self, payload: &BatchPayload) -> Result<(), TransportError> {
        self.batch_sends.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(TransportError::Status {
                endpoint: "/api/errors/batch".to_string(),
                status: 503,
            });
        }

        self.batches.lock().unwrap().push(payload.clone());
        Ok(())
    }

    async fn send_critical(&self, entry: &LogEntry) -> Result<(), TransportError> {
        self.criticals.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn send_admin_alert(&self, alert: &AdminAlert) -> Result<(), TransportError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// Tracker over in-memory storage and `transport`, default retry policy
pub fn tracker_with(transport: Arc<MockTransport>) -> Arc<ErrorTracker> {
    let tracker = ErrorTracker::builder()
        .storage(Arc::new(MemoryKeyValueStore::new()))
        .transport(transport)
        .retry_policy(RetryPolicy::default())
        .build()
        .expect("build tracker");
    Arc::new(tracker)
}

/// Starts a mock collector accepting every endpoint with `status`
pub async fn setup_collector_mock(status: u16) -> MockServer {
    let server = MockServer::start().await;

    for endpoint in ["/api/errors/batch", "/api/errors/critical", "/api/admin/alerts"] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }

    server
}
