//! On-demand statistics over a snapshot of the store
//!
//! Nothing here is maintained incrementally: every call walks the entries
//! it is given.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use shoptrace_core::domain::{ErrorStats, ExportDocument, LogEntry, TopError};

/// Number of entries in `recent_errors`
pub const RECENT_LIMIT: usize = 10;

/// Number of messages in `top_errors`
pub const TOP_LIMIT: usize = 5;

/// Computes summary statistics over `entries` (insertion order).
pub fn stats(entries: &[LogEntry]) -> ErrorStats {
    let mut stats = ErrorStats {
        total_errors: entries.len(),
        ..ErrorStats::default()
    };

    for entry in entries {
        *stats.errors_by_category.entry(entry.category()).or_insert(0) += 1;
        *stats.errors_by_severity.entry(entry.severity()).or_insert(0) += 1;
    }

    // Newest insertion first, then a stable sort so equal timestamps keep it
    let mut recent: Vec<&LogEntry> = entries.iter().rev().collect();
    recent.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
    stats.recent_errors = recent.into_iter().take(RECENT_LIMIT).cloned().collect();

    stats.top_errors = top_messages(entries, TOP_LIMIT);
    stats
}

/// Builds the operator export document.
pub fn export(entries: Vec<LogEntry>, export_date: DateTime<Utc>) -> ExportDocument {
    ExportDocument {
        export_date,
        stats: stats(&entries),
        logs: entries,
    }
}

/// Most frequent messages; ties keep first-seen order.
fn top_messages(entries: &[LogEntry], limit: usize) -> Vec<TopError> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    let mut position: HashMap<&str, usize> = HashMap::new();

    for entry in entries {
        let message = entry.message();
        match position.get(message) {
            Some(&idx) => counts[idx].1 += 1,
            None => {
                position.insert(message, counts.len());
                counts.push((message, 1));
            }
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(limit)
        .map(|(message, count)| TopError {
            message: message.to_string(),
            count,
        })
        .collect()
}
