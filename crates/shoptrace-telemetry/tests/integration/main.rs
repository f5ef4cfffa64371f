//! Integration tests for shoptrace-telemetry
//!
//! Drive the pipeline through `ErrorTracker` against in-process and
//! wiremock collectors.

mod common;

mod test_delivery;
mod test_http_collector;
mod test_tracker;
