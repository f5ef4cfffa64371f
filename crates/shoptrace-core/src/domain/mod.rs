//! Domain entities
//!
//! This module contains the core telemetry types:
//! - `LogEntry` with its `Severity` and `Category` tags
//! - `RawError`, the normalized form of a failure handed to the capture API
//! - `PendingBatch` and the wire payloads sent to the collector
//! - `ErrorStats` and the export document
//! - Domain-specific error types

pub mod batch;
pub mod entry;
pub mod errors;
pub mod stats;

pub use batch::{AdminAlert, BatchPayload, PendingBatch};
pub use entry::{Category, ClientOrigin, EntryId, LogEntry, Metadata, RawError, Severity};
pub use errors::DomainError;
pub use stats::{ErrorStats, ExportDocument, TopError};
