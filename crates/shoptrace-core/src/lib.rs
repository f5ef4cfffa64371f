//! ShopTrace Core - Domain types and ports for storefront error telemetry
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `LogEntry`, `PendingBatch`, `ErrorStats`, wire payloads
//! - **Port definitions** - Traits for adapters: `IKeyValueStore`,
//!   `ICollectorTransport`, `IClientEnvironment`, `TokenSource`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module holds pure data and invariants with no I/O.
//! Ports define trait interfaces that the telemetry crate's adapters
//! (file storage, HTTP collector) implement.

pub mod config;
pub mod domain;
pub mod ports;
