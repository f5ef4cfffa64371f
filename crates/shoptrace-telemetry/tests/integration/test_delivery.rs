//! Batch delivery, retry ceiling and deferred retries

use std::sync::Arc;
use std::time::Duration;

use shoptrace_telemetry::CaptureOptions;
use tokio::time::Instant;

use crate::common::{self, MockTransport};

#[tokio::test]
async fn test_flush_removes_only_delivered_entries() {
    let transport = Arc::new(MockTransport::new());
    let tracker = common::tracker_with(Arc::clone(&transport));

    for message in ["a", "b", "c"] {
        tracker.capture(message, CaptureOptions::new());
    }

    let gate = transport.hold_next_batch();
    let flushing = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move { tracker.flush().await })
    };

    gate.entered.notified().await;
    tracker.capture("d", CaptureOptions::new());
    gate.release.notify_one();

    assert!(flushing.await.unwrap());

    let remaining: Vec<String> = tracker
        .get_logs()
        .iter()
        .map(|e| e.message().to_string())
        .collect();
    assert_eq!(remaining, vec!["d"]);
    assert_eq!(transport.delivered_messages(), vec![vec!["a", "b", "c"]]);
}

#[tokio::test]
async fn test_concurrent_flush_joins_in_flight_send() {
    let transport = Arc::new(MockTransport::new());
    let tracker = common::tracker_with(Arc::clone(&transport));
    tracker.capture("only once", CaptureOptions::new());

    let gate = transport.hold_next_batch();
    let first = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move { tracker.flush().await })
    };
    gate.entered.notified().await;

    let second = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move { tracker.flush().await })
    };
    tokio::task::yield_now().await;
    gate.release.notify_one();

    assert!(first.await.unwrap());
    assert!(second.await.unwrap());
    assert_eq!(transport.batch_sends(), 1);
    assert!(tracker.get_logs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retry_ceiling_then_pending_then_dropped() {
    let transport = Arc::new(MockTransport::failing());
    let tracker = common::tracker_with(Arc::clone(&transport));
    tracker.capture("a", CaptureOptions::new());
    tracker.capture("b", CaptureOptions::new());

    let started = Instant::now();
    assert!(!tracker.flush().await);
    let elapsed = started.elapsed();

    // 1 initial send + 3 retries after 1s, 2s and 4s
    assert_eq!(transport.batch_sends(), 4);
    assert!(elapsed >= Duration::from_secs(7));
    assert!(elapsed < Duration::from_secs(8));

    let pending = tracker.pending_batch().expect("pending batch");
    assert_eq!(pending.len(), 2);
    assert_eq!(pending.retry_count(), 0);
    assert!(tracker.get_logs().is_empty());
    assert!(tracker.has_scheduled_retry());
    assert_eq!(tracker.metrics().pending_batches.get(), 1);

    // First deferred window after 5 minutes
    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(transport.batch_sends(), 5);
    assert_eq!(tracker.pending_batch().unwrap().retry_count(), 1);

    // Later windows every 10 minutes
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(transport.batch_sends(), 6);
    assert_eq!(tracker.pending_batch().unwrap().retry_count(), 2);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(transport.batch_sends(), 7);
    assert!(tracker.pending_batch().is_none());
    assert!(!tracker.has_scheduled_retry());
    assert_eq!(tracker.metrics().entries_dropped_total.get(), 2);
    assert_eq!(tracker.metrics().pending_batches.get(), 0);

    // Nothing else fires
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(transport.batch_sends(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_deferred_retry_success_clears_pending() {
    let transport = Arc::new(MockTransport::new());
    transport.fail_next(4);
    let tracker = common::tracker_with(Arc::clone(&transport));
    tracker.capture("eventually delivered", CaptureOptions::new());

    assert!(!tracker.flush().await);
    assert!(tracker.pending_batch().is_some());

    tokio::time::sleep(Duration::from_secs(301)).await;

    assert!(tracker.pending_batch().is_none());
    assert!(!tracker.has_scheduled_retry());
    assert_eq!(
        transport.delivered_messages(),
        vec![vec!["eventually delivered"]]
    );
}
