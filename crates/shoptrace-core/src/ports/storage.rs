//! Key/value storage port (driven/secondary port)
//!
//! A minimal durable record store keyed by string, holding serialized JSON.
//! The pipeline keeps exactly two records in it: the live log list and the
//! pending-retry batch.
//!
//! ## Design Notes
//!
//! - Synchronous: the capture path persists inline and must never suspend.
//! - Errors are typed so callers can tell a full quota from a broken disk,
//!   but the pipeline absorbs all of them.

use thiserror::Error;

/// Errors raised by a key/value storage adapter
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying filesystem or device failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The record could not be encoded or decoded
    #[error("Storage serialization error: {0}")]
    Serialization(String),

    /// Writing the record would exceed the configured byte quota
    #[error("Storage quota exceeded for '{key}': {needed} bytes needed, quota is {quota} bytes")]
    QuotaExceeded {
        key: String,
        needed: u64,
        quota: u64,
    },
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Port trait for durable keyed records
///
/// ## Implementation Notes
///
/// - `get` returns `Ok(None)` for a record that was never written or was removed.
/// - `set` replaces the whole record.
/// - `remove` on a missing key is not an error.
pub trait IKeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
