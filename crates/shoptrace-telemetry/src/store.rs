//! Bounded log store
//!
//! Holds captured entries in insertion order, capped at a fixed capacity
//! with oldest-first eviction, and writes the whole list through to the
//! `error_logs` record on every change so it survives a reload.
//!
//! Persistence failures (quota, I/O) are logged and counted but never
//! reach the caller: the in-memory list stays authoritative for the rest of
//! the process.
//!
//! The lock is not reentrant. A thread that already holds it (for example a
//! panic hook firing inside a storage adapter) gets `None` from `lock` and
//! the call becomes a no-op instead of a deadlock.

use std::cell::Cell;
use std::collections::{HashSet, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use shoptrace_core::{
    domain::{EntryId, LogEntry},
    ports::IKeyValueStore,
};
use tracing::{debug, warn};

use crate::metrics::TelemetryMetrics;

/// Record key of the live log list
pub const LOGS_KEY: &str = "error_logs";

/// Default capacity of the live log list
pub const DEFAULT_MAX_LOGS: usize = 100;

thread_local! {
    static HOLDS_STORE_LOCK: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is inside a store mutation
pub(crate) fn store_lock_held() -> bool {
    HOLDS_STORE_LOCK.with(Cell::get)
}

/// Mutex guard that marks the owning thread for its lifetime
struct Locked<'a> {
    // Released before the thread mark is cleared
    entries: MutexGuard<'a, VecDeque<LogEntry>>,
    _mark: ThreadMark,
}

struct ThreadMark;

impl ThreadMark {
    fn acquire() -> Option<Self> {
        HOLDS_STORE_LOCK.with(|held| {
            if held.replace(true) {
                // Already marked by an outer frame on this thread
                None
            } else {
                Some(ThreadMark)
            }
        })
    }
}

impl Drop for ThreadMark {
    fn drop(&mut self) {
        HOLDS_STORE_LOCK.with(|held| held.set(false));
    }
}

impl Deref for Locked<'_> {
    type Target = VecDeque<LogEntry>;

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

impl DerefMut for Locked<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.entries
    }
}

/// Durable, size-capped buffer of captured entries
pub struct BoundedLogStore {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    storage: Arc<dyn IKeyValueStore>,
    metrics: Arc<TelemetryMetrics>,
}

impl BoundedLogStore {
    /// Opens the store, reloading whatever a previous session persisted.
    ///
    /// An unreadable or corrupt record is logged and treated as empty. A
    /// persisted list longer than `capacity` is trimmed oldest-first.
    pub fn open(
        storage: Arc<dyn IKeyValueStore>,
        capacity: usize,
        metrics: Arc<TelemetryMetrics>,
    ) -> Self {
        let capacity = capacity.max(1);
        let mut entries = load_entries(storage.as_ref(), &metrics);

        let overflow = entries.len().saturating_sub(capacity);
        if overflow > 0 {
            debug!(overflow, capacity, "Trimming reloaded log list to capacity");
            entries.drain(..overflow);
        }

        debug!(count = entries.len(), capacity, "Opened log store");

        Self {
            entries: Mutex::new(entries),
            capacity,
            storage,
            metrics,
        }
    }

    /// Appends an entry, evicting the oldest ones beyond capacity.
    ///
    /// Returns `false` (and stores nothing) if an entry with the same id is
    /// already held, or if the calling thread is already inside the store.
    pub fn append(&self, entry: LogEntry) -> bool {
        let Some(mut entries) = self.lock() else {
            return false;
        };

        if entries.iter().any(|e| e.id() == entry.id()) {
            warn!(id = %entry.id(), "Ignoring entry with duplicate id");
            return false;
        }

        entries.push_back(entry);

        let overflow = entries.len().saturating_sub(self.capacity);
        if overflow > 0 {
            entries.drain(..overflow);
            self.metrics.record_evictions(overflow);
            debug!(evicted = overflow, "Evicted oldest entries");
        }

        self.persist(&entries);
        true
    }

    /// Snapshot of every entry in insertion order.
    ///
    /// The returned vector is owned; later store mutations never affect it.
    pub fn all(&self) -> Vec<LogEntry> {
        self.lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let Some(mut entries) = self.lock() else {
            return;
        };
        entries.clear();
        if let Err(e) = self.storage.remove(LOGS_KEY) {
            self.metrics.record_storage_error();
            warn!(error = %e, "Failed to clear persisted log list");
        }
    }

    /// Removes exactly the given ids, leaving anything appended meanwhile.
    ///
    /// Returns the number of entries removed.
    pub fn remove(&self, ids: &HashSet<EntryId>) -> usize {
        if ids.is_empty() {
            return 0;
        }

        let Some(mut entries) = self.lock() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|e| !ids.contains(e.id()));
        let removed = before - entries.len();

        if removed > 0 {
            self.persist(&entries);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> Option<Locked<'_>> {
        let mark = ThreadMark::acquire()?;
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Some(Locked {
            entries,
            _mark: mark,
        })
    }

    /// Writes the list through while the caller still holds the lock, so
    /// persisted snapshots land in mutation order.
    fn persist(&self, entries: &VecDeque<LogEntry>) {
        let result = serde_json::to_string(entries)
            .map_err(Into::into)
            .and_then(|json| self.storage.set(LOGS_KEY, &json));

        if let Err(e) = result {
            self.metrics.record_storage_error();
            warn!(error = %e, count = entries.len(), "Failed to persist log list");
        }
    }
}

fn load_entries(storage: &dyn IKeyValueStore, metrics: &TelemetryMetrics) -> VecDeque<LogEntry> {
    let raw = match storage.get(LOGS_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return VecDeque::new(),
        Err(e) => {
            metrics.record_storage_error();
            warn!(error = %e, "Failed to read persisted log list");
            return VecDeque::new();
        }
    };

    match serde_json::from_str::<VecDeque<LogEntry>>(&raw) {
        Ok(entries) => entries,
        Err(e) => {
            metrics.record_storage_error();
            warn!(error = %e, "Discarding corrupt persisted log list");
            VecDeque::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use shoptrace_core::domain::{Category, ClientOrigin, RawError, Severity};

    use super::*;
    use crate::storage::MemoryKeyValueStore;

    fn entry(message: &str) -> LogEntry {
        LogEntry::new(
            RawError::new(message),
            Severity::Medium,
            Category::Javascript,
            ClientOrigin::new("test", "/"),
        )
    }

    fn open(storage: Arc<MemoryKeyValueStore>, capacity: usize) -> BoundedLogStore {
        BoundedLogStore::open(
            storage,
            capacity,
            Arc::new(TelemetryMetrics::new().unwrap()),
        )
    }

    fn messages(store: &BoundedLogStore) -> Vec<String> {
        store.all().iter().map(|e| e.message().to_string()).collect()
    }

    #[test]
    fn test_append_keeps_insertion_order() {
        let store = open(Arc::new(MemoryKeyValueStore::new()), 10);
        store.append(entry("a"));
        store.append(entry("b"));
        store.append(entry("c"));
        assert_eq!(messages(&store), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_capacity_is_never_exceeded_and_oldest_go_first() {
        let store = open(Arc::new(MemoryKeyValueStore::new()), 3);
        for i in 0..10 {
            store.append(entry(&format!("m{i}")));
            assert!(store.len() <= 3);
        }
        assert_eq!(messages(&store), vec!["m7", "m8", "m9"]);
        assert_eq!(store.metrics.entries_evicted_total.get(), 7);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_mutation() {
        let store = open(Arc::new(MemoryKeyValueStore::new()), 10);
        store.append(entry("a"));
        let snapshot = store.all();

        store.append(entry("b"));
        store.clear();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].message(), "a");
    }

    #[test]
    fn test_remove_only_given_ids() {
        let store = open(Arc::new(MemoryKeyValueStore::new()), 10);
        let a = entry("a");
        let b = entry("b");
        let c = entry("c");
        store.append(a.clone());
        store.append(b.clone());
        store.append(c.clone());

        let ids: HashSet<EntryId> = [a.id().clone(), c.id().clone()].into_iter().collect();
        assert_eq!(store.remove(&ids), 2);
        assert_eq!(messages(&store), vec!["b"]);
        // Already gone
        assert_eq!(store.remove(&ids), 0);
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let store = open(Arc::new(MemoryKeyValueStore::new()), 10);
        let a = entry("a");
        assert!(store.append(a.clone()));
        assert!(!store.append(a));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        {
            let store = open(Arc::clone(&storage), 10);
            store.append(entry("persisted"));
        }
        let reopened = open(storage, 10);
        assert_eq!(messages(&reopened), vec!["persisted"]);
    }

    #[test]
    fn test_clear_removes_persisted_record() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let store = open(Arc::clone(&storage), 10);
        store.append(entry("a"));
        store.clear();
        assert!(store.is_empty());
        assert!(storage.get(LOGS_KEY).unwrap().is_none());
    }

    #[test]
    fn test_reopen_trims_to_smaller_capacity() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        {
            let store = open(Arc::clone(&storage), 10);
            for i in 0..5 {
                store.append(entry(&format!("m{i}")));
            }
        }
        let reopened = open(storage, 2);
        assert_eq!(messages(&reopened), vec!["m3", "m4"]);
    }

    #[test]
    fn test_corrupt_record_starts_empty() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        storage.set(LOGS_KEY, "{definitely not a list").unwrap();
        let store = open(storage, 10);
        assert!(store.is_empty());
        assert_eq!(store.metrics.storage_errors_total.get(), 1);
    }

    #[test]
    fn test_quota_exceeded_is_absorbed() {
        let storage = Arc::new(MemoryKeyValueStore::new().with_quota(16));
        let store = open(Arc::clone(&storage), 10);

        // Never panics or errors; the entry is still held in memory
        assert!(store.append(entry("too big for the quota")));
        assert_eq!(store.len(), 1);
        assert!(storage.get(LOGS_KEY).unwrap().is_none());
        assert_eq!(store.metrics.storage_errors_total.get(), 1);
    }

    struct ReentrantStorage {
        inner: MemoryKeyValueStore,
        store: std::sync::OnceLock<Arc<BoundedLogStore>>,
    }

    impl IKeyValueStore for ReentrantStorage {
        fn get(&self, key: &str) -> Result<Option<String>, shoptrace_core::ports::StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), shoptrace_core::ports::StorageError> {
            if let Some(store) = self.store.get() {
                // Same thread, lock still held by the outer append
                assert!(!store.append(entry("nested")));
                assert!(store.all().is_empty());
                assert_eq!(store.len(), 0);
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), shoptrace_core::ports::StorageError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_nested_call_on_locking_thread_is_skipped() {
        let storage = Arc::new(ReentrantStorage {
            inner: MemoryKeyValueStore::new(),
            store: std::sync::OnceLock::new(),
        });
        let store = Arc::new(BoundedLogStore::open(
            Arc::clone(&storage) as Arc<dyn IKeyValueStore>,
            10,
            Arc::new(TelemetryMetrics::new().unwrap()),
        ));
        assert!(storage.store.set(Arc::clone(&store)).is_ok());

        assert!(store.append(entry("outer")));
        assert!(!store_lock_held());
        assert_eq!(messages(&store), vec!["outer"]);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let store = open(Arc::new(MemoryKeyValueStore::new()), 0);
        assert_eq!(store.capacity(), 1);
        store.append(entry("a"));
        store.append(entry("b"));
        assert_eq!(messages(&store), vec!["b"]);
    }
}
