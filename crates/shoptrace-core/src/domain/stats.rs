//! Summary statistics and the export document

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::{Category, LogEntry, Severity};

/// A distinct message and how many entries carry it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopError {
    pub message: String,
    pub count: usize,
}

/// Statistics over the entries currently held by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    pub total_errors: usize,
    /// Every category is present, zero when unseen
    pub errors_by_category: BTreeMap<Category, usize>,
    /// Every severity is present, zero when unseen
    pub errors_by_severity: BTreeMap<Severity, usize>,
    /// Most recent entries, newest first
    pub recent_errors: Vec<LogEntry>,
    /// Most frequent messages, highest count first
    pub top_errors: Vec<TopError>,
}

impl Default for ErrorStats {
    fn default() -> Self {
        Self {
            total_errors: 0,
            errors_by_category: Category::ALL.into_iter().map(|c| (c, 0)).collect(),
            errors_by_severity: Severity::ALL.into_iter().map(|s| (s, 0)).collect(),
            recent_errors: Vec::new(),
            top_errors: Vec::new(),
        }
    }
}

impl ErrorStats {
    pub fn category_count(&self, category: Category) -> usize {
        self.errors_by_category.get(&category).copied().unwrap_or(0)
    }

    pub fn severity_count(&self, severity: Severity) -> usize {
        self.errors_by_severity.get(&severity).copied().unwrap_or(0)
    }
}

/// Operator download: `{ exportDate, stats, logs }`.
///
/// Meant for humans debugging a client, not for machine replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub export_date: DateTime<Utc>,
    pub stats: ErrorStats,
    pub logs: Vec<LogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stats_have_every_key() {
        let stats = ErrorStats::default();
        assert_eq!(stats.errors_by_category.len(), Category::ALL.len());
        assert_eq!(stats.errors_by_severity.len(), Severity::ALL.len());
        assert_eq!(stats.category_count(Category::Payment), 0);
    }

    #[test]
    fn test_stats_json_keys() {
        let json = serde_json::to_value(ErrorStats::default()).unwrap();
        assert_eq!(json["totalErrors"], 0);
        assert_eq!(json["errorsByCategory"]["network"], 0);
        assert_eq!(json["errorsBySeverity"]["critical"], 0);
        assert!(json["recentErrors"].as_array().unwrap().is_empty());
        assert!(json["topErrors"].as_array().unwrap().is_empty());
    }
}
