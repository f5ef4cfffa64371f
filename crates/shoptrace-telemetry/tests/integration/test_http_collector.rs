//! HttpCollector against a wiremock collector

use std::sync::Arc;

use shoptrace_core::{
    domain::{AdminAlert, BatchPayload, Category, ClientOrigin, LogEntry, RawError, Severity},
    ports::{ICollectorTransport, StaticToken, TransportError},
};
use shoptrace_telemetry::HttpCollector;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

fn entry(message: &str) -> LogEntry {
    LogEntry::new(
        RawError::new(message),
        Severity::Critical,
        Category::Payment,
        ClientOrigin::new("test-agent", "https://shop.example.com/checkout"),
    )
}

#[tokio::test]
async fn test_batch_carries_bearer_token_and_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/errors/batch"))
        .and(header("authorization", "Bearer session-token"))
        .and(body_partial_json(serde_json::json!({
            "source": "web-client",
            "version": "1.0.0",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let collector = HttpCollector::new(server.uri())
        .with_token_source(Arc::new(StaticToken::new("session-token")));
    let payload = BatchPayload::new(vec![entry("a"), entry("b")], "web-client", "1.0.0");

    collector.send_batch(&payload).await.expect("batch accepted");
}

#[tokio::test]
async fn test_critical_and_admin_endpoints() {
    let server = common::setup_collector_mock(201).await;
    let collector = HttpCollector::new(server.uri());

    collector
        .send_critical(&entry("card declined"))
        .await
        .expect("critical accepted");
    collector
        .send_admin_alert(&AdminAlert::critical(entry("card declined")))
        .await
        .expect("alert accepted");

    let requests = server.received_requests().await.unwrap();
    let paths: Vec<&str> = requests.iter().map(|r| r.url.path()).collect();
    assert_eq!(paths, vec!["/api/errors/critical", "/api/admin/alerts"]);

    let alert: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(alert["type"], "critical_error");
    assert_eq!(alert["error"]["message"], "card declined");
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let server = common::setup_collector_mock(503).await;
    let collector = HttpCollector::new(server.uri());
    let payload = BatchPayload::new(vec![entry("a")], "web-client", "1.0.0");

    let err = collector.send_batch(&payload).await.unwrap_err();
    assert_eq!(
        err,
        TransportError::Status {
            endpoint: "/api/errors/batch".to_string(),
            status: 503,
        }
    );
}

#[tokio::test]
async fn test_unreachable_collector_is_request_error() {
    // Nothing listens on port 9 in the test environment
    let collector = HttpCollector::new("http://127.0.0.1:9");
    let err = collector.send_critical(&entry("a")).await.unwrap_err();
    assert!(matches!(err, TransportError::Request { .. }));
}
