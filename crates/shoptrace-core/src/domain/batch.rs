//! Delivery batches and collector payloads
//!
//! - [`BatchPayload`] is the body POSTed to the collector's batch endpoint.
//! - [`PendingBatch`] is a batch that exhausted its in-call retries and waits
//!   for a deferred retry window, persisted apart from the live log list.
//! - [`AdminAlert`] is the body of the admin alert sent for critical entries.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::{EntryId, LogEntry};

/// Body of a batch delivery: `{ logs, timestamp, source, version }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPayload {
    pub logs: Vec<LogEntry>,
    /// Send time
    pub timestamp: DateTime<Utc>,
    /// Source tag, e.g. `web-client`
    pub source: String,
    /// Client version
    pub version: String,
}

impl BatchPayload {
    pub fn new(logs: Vec<LogEntry>, source: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            logs,
            timestamp: Utc::now(),
            source: source.into(),
            version: version.into(),
        }
    }

    /// Ids of every entry carried by this batch
    pub fn ids(&self) -> HashSet<EntryId> {
        self.logs.iter().map(|e| e.id().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

/// A failed delivery awaiting a deferred retry
///
/// `retry_count` counts deferred attempts already made. The entries are a
/// snapshot taken when the batch was queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingBatch {
    entries: Vec<LogEntry>,
    retry_count: u32,
    queued_at: DateTime<Utc>,
}

impl PendingBatch {
    pub fn new(entries: Vec<LogEntry>) -> Self {
        Self {
            entries,
            retry_count: 0,
            queued_at: Utc::now(),
        }
    }

    /// Backdates the cooldown clock, as when reloading an older record
    pub fn with_queued_at(mut self, queued_at: DateTime<Utc>) -> Self {
        self.queued_at = queued_at;
        self
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn queued_at(&self) -> DateTime<Utc> {
        self.queued_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> HashSet<EntryId> {
        self.entries.iter().map(|e| e.id().clone()).collect()
    }

    /// Folds another failed batch into this one.
    ///
    /// Entries already present (same id) are skipped. If the result exceeds
    /// `max_entries`, the oldest entries are dropped. Returns how many were
    /// dropped.
    pub fn merge(&mut self, entries: Vec<LogEntry>, max_entries: usize) -> usize {
        let known = self.ids();
        self.entries
            .extend(entries.into_iter().filter(|e| !known.contains(e.id())));

        let overflow = self.entries.len().saturating_sub(max_entries);
        if overflow > 0 {
            self.entries.drain(..overflow);
        }
        overflow
    }

    /// Records a failed deferred attempt and restarts the cooldown clock
    pub fn record_failed_attempt(&mut self) -> u32 {
        self.retry_count += 1;
        self.queued_at = Utc::now();
        self.retry_count
    }

    /// Lifts the attempt count to at least `floor`.
    ///
    /// Used when a stored record lags behind attempts already made in memory.
    pub fn raise_retry_count(&mut self, floor: u32) {
        self.retry_count = self.retry_count.max(floor);
    }

    /// True once `max_retries` deferred attempts have been made
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.retry_count >= max_retries
    }

    /// Full cooldown owed after `queued_at`
    pub fn cooldown(&self, first: Duration, later: Duration) -> Duration {
        if self.retry_count == 0 {
            first
        } else {
            later
        }
    }

    /// Time left at `now` before the next deferred attempt is due.
    ///
    /// Zero once the cooldown has elapsed since `queued_at`. A `queued_at`
    /// in the future counts as no time elapsed.
    pub fn next_delay(&self, first: Duration, later: Duration, now: DateTime<Utc>) -> Duration {
        let elapsed = (now - self.queued_at).to_std().unwrap_or(Duration::ZERO);
        self.cooldown(first, later).saturating_sub(elapsed)
    }
}

/// Body of the admin alert sent for critical entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminAlert {
    #[serde(rename = "type")]
    pub kind: String,
    pub error: LogEntry,
    pub timestamp: DateTime<Utc>,
}

impl AdminAlert {
    pub fn critical(entry: LogEntry) -> Self {
        Self {
            kind: "critical_error".to_string(),
            error: entry,
            timestamp: Utc::now(),
        }
    }
}
