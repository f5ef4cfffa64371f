//! End-to-end capture behavior through the public facade

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use shoptrace_core::config::Config;
use shoptrace_core::domain::{Category, Severity};
use shoptrace_telemetry::{
    CaptureOptions, ErrorTracker, FileKeyValueStore, MemoryKeyValueStore, PaymentDetails,
};

use tokio_util::sync::CancellationToken;

use crate::common::{self, MockTransport};

#[test]
fn test_capacity_keeps_newest_hundred() {
    let tracker = ErrorTracker::builder()
        .max_logs(100)
        .build()
        .expect("build tracker");

    for i in 0..105 {
        tracker.capture(format!("error {i}"), CaptureOptions::new());
    }

    let logs = tracker.get_logs();
    assert_eq!(logs.len(), 100);
    assert_eq!(logs[0].message(), "error 5");
    assert_eq!(logs[99].message(), "error 104");
    for i in 0..5 {
        let evicted = format!("error {i}");
        assert!(logs.iter().all(|e| e.message() != evicted));
    }

    let export: Value = serde_json::from_str(&tracker.export_logs()).expect("valid JSON");
    assert_eq!(export["logs"].as_array().unwrap().len(), 100);
    assert_eq!(export["stats"]["totalErrors"], 100);
    assert!(export["exportDate"].is_string());
}

#[test]
fn test_default_classification() {
    let tracker = ErrorTracker::builder().build().unwrap();
    tracker.capture("Something went wrong", CaptureOptions::new());

    let stats = tracker.get_stats();
    assert_eq!(stats.severity_count(Severity::Medium), 1);
    assert_eq!(stats.category_count(Category::Javascript), 1);

    let json = serde_json::to_value(&tracker.get_logs()[0]).unwrap();
    assert_eq!(json["severity"], "medium");
    assert_eq!(json["category"], "javascript");
    assert!(json["id"].as_str().unwrap().starts_with("err_"));
}

#[tokio::test]
async fn test_payment_error_escalates_exactly_once() {
    let transport = Arc::new(MockTransport::new());
    let tracker = common::tracker_with(Arc::clone(&transport));
    let mut events = tracker.subscribe_escalations();

    let payment = PaymentDetails {
        order_id: "ORD-123".to_string(),
        amount: 100000.0,
        payment_method: "card".to_string(),
        currency: "VND".to_string(),
    };
    let id = tracker
        .capture_payment_error("Payment gateway timeout", &payment)
        .expect("captured");

    let entry = &tracker.get_logs()[0];
    assert_eq!(entry.severity(), Severity::Critical);
    assert_eq!(entry.category(), Category::Payment);
    assert_eq!(entry.context(), Some("Payment Processing"));

    let event = events.recv().await.expect("escalation event");
    assert_eq!(event.entry.id(), &id);

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let done = !transport.criticals.lock().unwrap().is_empty()
                && !transport.alerts.lock().unwrap().is_empty();
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("escalation sends completed");

    // Give any duplicate a chance to show up
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.criticals.lock().unwrap().len(), 1);
    assert_eq!(transport.alerts.lock().unwrap().len(), 1);
    assert_eq!(transport.alerts.lock().unwrap()[0].kind, "critical_error");
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_non_critical_capture_does_not_escalate() {
    let transport = Arc::new(MockTransport::new());
    let tracker = common::tracker_with(Arc::clone(&transport));
    let mut events = tracker.subscribe_escalations();

    tracker.capture(
        "minor",
        CaptureOptions::new().with_severity(Severity::High),
    );
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(events.try_recv().is_err());
    assert!(transport.criticals.lock().unwrap().is_empty());
}

#[test]
fn test_entries_survive_tracker_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let tracker = ErrorTracker::builder()
            .storage(Arc::new(FileKeyValueStore::new(dir.path().to_path_buf())))
            .build()
            .unwrap();
        tracker.capture("before reload", CaptureOptions::new());
    }

    let tracker = ErrorTracker::builder()
        .storage(Arc::new(FileKeyValueStore::new(dir.path().to_path_buf())))
        .build()
        .unwrap();
    let logs = tracker.get_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message(), "before reload");
}

#[test]
fn test_quota_exceeded_never_reaches_caller() {
    let tracker = ErrorTracker::builder()
        .storage(Arc::new(MemoryKeyValueStore::new().with_quota(64)))
        .build()
        .unwrap();

    for i in 0..10 {
        assert!(tracker
            .capture(format!("large error number {i}"), CaptureOptions::new())
            .is_some());
    }

    assert_eq!(tracker.get_logs().len(), 10);
    assert!(tracker.metrics().storage_errors_total.get() >= 1);
}

#[tokio::test]
async fn test_start_drains_on_configured_interval() {
    let server = common::setup_collector_mock(200).await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.storage.dir = dir.path().to_path_buf();
    config.delivery.collector_url = Some(server.uri());
    config.delivery.flush_interval_secs = 1;

    let shutdown = CancellationToken::new();
    let tracker = ErrorTracker::start(&config, shutdown.clone()).expect("start tracker");
    tracker.capture("waits for the next tick", CaptureOptions::new());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !tracker.get_logs().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(tracker.get_logs().is_empty());

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().any(|r| r.url.path() == "/api/errors/batch"));

    shutdown.cancel();
    tracker.shutdown();
}
