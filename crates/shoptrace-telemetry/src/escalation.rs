//! Escalation of critical entries
//!
//! When a critical entry lands in the store, [`EscalationNotifier`] fires
//! three independent side actions:
//!
//! 1. POST the entry to the collector's high-priority endpoint
//! 2. broadcast an [`EscalationEvent`] in-process so UI layers can react
//! 3. POST an [`AdminAlert`] to the admin endpoint
//!
//! The two network actions run as detached tasks; the broadcast never
//! blocks. Each action is attempted at most once: a failure is logged and
//! counted, never retried, and never affects the other two.

use std::sync::Arc;

use shoptrace_core::{
    domain::{AdminAlert, LogEntry},
    ports::ICollectorTransport,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::metrics::TelemetryMetrics;

/// Metric label of the high-priority endpoint action
pub const ACTION_CRITICAL_ENDPOINT: &str = "critical_endpoint";
/// Metric label of the in-process broadcast
pub const ACTION_UI_EVENT: &str = "ui_event";
/// Metric label of the admin alert action
pub const ACTION_ADMIN_ALERT: &str = "admin_alert";

/// Buffered events per subscriber before slow receivers start lagging
const EVENT_CAPACITY: usize = 32;

/// Banner text suggested to UI layers
pub const RELOAD_PROMPT: &str = "A critical error occurred. Please reload the page.";

/// In-process notification that a critical entry was captured
#[derive(Debug, Clone)]
pub struct EscalationEvent {
    pub entry: LogEntry,
    /// User-facing text a UI layer may show
    pub prompt: String,
}

/// Fires best-effort alerts for critical entries
pub struct EscalationNotifier {
    transport: Option<Arc<dyn ICollectorTransport>>,
    events: broadcast::Sender<EscalationEvent>,
    metrics: Arc<TelemetryMetrics>,
}

impl EscalationNotifier {
    /// Creates a notifier. Without a transport only the in-process
    /// broadcast is performed.
    pub fn new(
        transport: Option<Arc<dyn ICollectorTransport>>,
        metrics: Arc<TelemetryMetrics>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            events,
            metrics,
        }
    }

    /// Subscribes to escalation events
    pub fn subscribe(&self) -> broadcast::Receiver<EscalationEvent> {
        self.events.subscribe()
    }

    /// Escalates `entry` if it is critical. Returns whether it was.
    ///
    /// Returns as soon as the side actions are dispatched.
    pub fn notify_if_critical(&self, entry: &LogEntry) -> bool {
        if !entry.severity().is_critical() {
            return false;
        }

        warn!(
            id = %entry.id(),
            category = %entry.category(),
            message = entry.message(),
            "Critical error captured, escalating"
        );

        self.send_to_critical_endpoint(entry);
        self.broadcast(entry);
        self.send_admin_alert(entry);
        true
    }

    fn send_to_critical_endpoint(&self, entry: &LogEntry) {
        let Some(transport) = self.transport.clone() else {
            debug!("No collector configured, skipping high-priority send");
            return;
        };
        let entry = entry.clone();
        let metrics = Arc::clone(&self.metrics);

        self.spawn_detached(ACTION_CRITICAL_ENDPOINT, async move {
            let result = transport.send_critical(&entry).await;
            if let Err(e) = &result {
                warn!(id = %entry.id(), error = %e, "High-priority error send failed");
            }
            metrics.record_escalation(ACTION_CRITICAL_ENDPOINT, result.is_ok());
        });
    }

    fn broadcast(&self, entry: &LogEntry) {
        let event = EscalationEvent {
            entry: entry.clone(),
            prompt: RELOAD_PROMPT.to_string(),
        };
        match self.events.send(event) {
            Ok(receivers) => {
                debug!(receivers, "Broadcast escalation event");
                self.metrics.record_escalation(ACTION_UI_EVENT, true);
            }
            // No subscribers is not a failure
            Err(_) => debug!("No escalation subscribers"),
        }
    }

    fn send_admin_alert(&self, entry: &LogEntry) {
        let Some(transport) = self.transport.clone() else {
            debug!("No collector configured, skipping admin alert");
            return;
        };
        let alert = AdminAlert::critical(entry.clone());
        let metrics = Arc::clone(&self.metrics);

        self.spawn_detached(ACTION_ADMIN_ALERT, async move {
            let result = transport.send_admin_alert(&alert).await;
            if let Err(e) = &result {
                warn!(id = %alert.error.id(), error = %e, "Admin alert send failed");
            }
            metrics.record_escalation(ACTION_ADMIN_ALERT, result.is_ok());
        });
    }

    fn spawn_detached<F>(&self, action: &'static str, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task);
            }
            Err(_) => {
                warn!(action, "No async runtime available, escalation action skipped");
                self.metrics.record_escalation(action, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use shoptrace_core::{
        domain::{BatchPayload, Category, ClientOrigin, RawError, Severity},
        ports::TransportError,
    };

    use super::*;

    #[derive(Default)]
    struct RecordingTransport {
        criticals: Mutex<Vec<String>>,
        alerts: Mutex<Vec<String>>,
        fail_critical: bool,
    }

    #[async_trait::async_trait]
    impl ICollectorTransport for RecordingTransport {
        async fn send_batch(&self, _payload: &BatchPayload) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send_critical(&self, entry: &LogEntry) -> Result<(), TransportError> {
            self.criticals.lock().unwrap().push(entry.message().to_string());
            if self.fail_critical {
                return Err(TransportError::Status {
                    endpoint: "/api/errors/critical".into(),
                    status: 500,
                });
            }
            Ok(())
        }

        async fn send_admin_alert(&self, alert: &AdminAlert) -> Result<(), TransportError> {
            self.alerts.lock().unwrap().push(alert.error.message().to_string());
            Ok(())
        }
    }

    fn entry(severity: Severity) -> LogEntry {
        LogEntry::new(
            RawError::new("card declined"),
            severity,
            Category::Payment,
            ClientOrigin::default(),
        )
    }

    async fn wait_for(metrics: &TelemetryMetrics, action: &str, success: bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while metrics.escalations(action, success) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("escalation action did not complete");
    }

    #[tokio::test]
    async fn test_non_critical_is_ignored() {
        let transport = Arc::new(RecordingTransport::default());
        let metrics = Arc::new(TelemetryMetrics::new().unwrap());
        let notifier = EscalationNotifier::new(Some(transport.clone()), metrics);
        let mut rx = notifier.subscribe();

        assert!(!notifier.notify_if_critical(&entry(Severity::High)));
        tokio::task::yield_now().await;

        assert!(transport.criticals.lock().unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_critical_fires_all_three_actions() {
        let transport = Arc::new(RecordingTransport::default());
        let metrics = Arc::new(TelemetryMetrics::new().unwrap());
        let notifier = EscalationNotifier::new(Some(transport.clone()), Arc::clone(&metrics));
        let mut rx = notifier.subscribe();

        assert!(notifier.notify_if_critical(&entry(Severity::Critical)));

        let event = rx.try_recv().expect("event broadcast synchronously");
        assert_eq!(event.entry.message(), "card declined");
        assert_eq!(event.prompt, RELOAD_PROMPT);

        wait_for(&metrics, ACTION_CRITICAL_ENDPOINT, true).await;
        wait_for(&metrics, ACTION_ADMIN_ALERT, true).await;
        assert_eq!(transport.criticals.lock().unwrap().len(), 1);
        assert_eq!(transport.alerts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_one_failing_action_does_not_block_others() {
        let transport = Arc::new(RecordingTransport {
            fail_critical: true,
            ..Default::default()
        });
        let metrics = Arc::new(TelemetryMetrics::new().unwrap());
        let notifier = EscalationNotifier::new(Some(transport.clone()), Arc::clone(&metrics));

        notifier.notify_if_critical(&entry(Severity::Critical));

        wait_for(&metrics, ACTION_CRITICAL_ENDPOINT, false).await;
        wait_for(&metrics, ACTION_ADMIN_ALERT, true).await;
        // Failures are never retried
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.criticals.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_without_runtime_only_broadcasts() {
        let transport = Arc::new(RecordingTransport::default());
        let metrics = Arc::new(TelemetryMetrics::new().unwrap());
        let notifier = EscalationNotifier::new(Some(transport.clone()), Arc::clone(&metrics));
        let mut rx = notifier.subscribe();

        assert!(notifier.notify_if_critical(&entry(Severity::Critical)));
        assert!(rx.try_recv().is_ok());
        assert_eq!(metrics.escalations(ACTION_CRITICAL_ENDPOINT, false), 1);
        assert_eq!(metrics.escalations(ACTION_ADMIN_ALERT, false), 1);
        assert!(transport.criticals.lock().unwrap().is_empty());
    }

    #[test]
    fn test_without_transport_still_broadcasts() {
        let metrics = Arc::new(TelemetryMetrics::new().unwrap());
        let notifier = EscalationNotifier::new(None, Arc::clone(&metrics));
        let mut rx = notifier.subscribe();

        assert!(notifier.notify_if_critical(&entry(Severity::Critical)));
        assert!(rx.try_recv().is_ok());
        assert_eq!(metrics.escalations(ACTION_UI_EVENT, true), 1);
    }
}
