//! ShopTrace Telemetry - Client-side error capture and delivery
//!
//! Provides:
//! - `ErrorTracker`: the capture facade application code calls
//! - `BoundedLogStore`: durable, size-capped buffer of captured entries
//! - `classify`: severity/category assignment per capture origin
//! - `aggregate::stats`: on-demand summary statistics
//! - `EscalationNotifier`: immediate best-effort alerts for critical entries
//! - `DeliveryPipeline`: batched delivery with backoff and deferred retries
//! - `HttpCollector`: reqwest-based collector transport
//! - `FileKeyValueStore` / `MemoryKeyValueStore`: durable record storage
//! - `TelemetryMetrics`: Prometheus counters for the pipeline itself
//! - `install_global_handlers`: process-wide panic and unhandled-error hooks

pub mod aggregate;
pub mod classifier;
pub mod delivery;
pub mod escalation;
pub mod hooks;
pub mod http;
pub mod metrics;
pub mod origin;
pub mod storage;
pub mod store;
pub mod tracker;

pub use classifier::{classify, CaptureOrigin};
pub use delivery::{DeliveryPipeline, RetryPolicy};
pub use escalation::{EscalationEvent, EscalationNotifier};
pub use hooks::{install_global_handlers, report_unhandled, spawn_reported};
pub use http::HttpCollector;
pub use metrics::TelemetryMetrics;
pub use origin::HostEnvironment;
pub use storage::{FileKeyValueStore, MemoryKeyValueStore};
pub use store::BoundedLogStore;
pub use tracker::{CaptureOptions, ErrorTracker, NetworkRequest, PaymentDetails};
