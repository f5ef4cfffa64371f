//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the telemetry pipeline depends on; their
//! implementations live in `shoptrace-telemetry` or in the host application.
//!
//! ## Ports Overview
//!
//! - [`IKeyValueStore`] - Durable keyed records (the live log list, the pending batch)
//! - [`ICollectorTransport`] - Outbound delivery to the remote collector
//! - [`IClientEnvironment`] - Client origin and current actor at capture time
//! - [`TokenSource`] - Bearer credential lookup for the collector

pub mod environment;
pub mod storage;
pub mod transport;

pub use environment::IClientEnvironment;
pub use storage::{IKeyValueStore, StorageError};
pub use transport::{EnvToken, ICollectorTransport, StaticToken, TokenSource, TransportError};
