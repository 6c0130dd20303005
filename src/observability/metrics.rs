//! Index counters
//!
//! Counters only, monotonic, reset when the registry is created. Relaxed
//! ordering: counters are independent and read only for reporting.

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for one or more indexes
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    indexes_built: AtomicU64,
    builds_failed: AtomicU64,
    fallback_reads: AtomicU64,
    bins_activated: AtomicU64,
    index_bytes_written: AtomicU64,
    index_bytes_read: AtomicU64,
    queries_evaluated: AtomicU64,
    appends_merged: AtomicU64,
    appends_adopted: AtomicU64,
    appends_rebuilt: AtomicU64,
    corrupt_files_evicted: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_indexes_built(&self) {
        self.indexes_built.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_builds_failed(&self) {
        self.builds_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fallback_reads(&self) {
        self.fallback_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bins_activated(&self, bins: u64) {
        self.bins_activated.fetch_add(bins, Ordering::Relaxed);
    }

    pub fn add_bytes_written(&self, bytes: u64) {
        self.index_bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, bytes: u64) {
        self.index_bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_queries_evaluated(&self) {
        self.queries_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_appends_merged(&self) {
        self.appends_merged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_appends_adopted(&self) {
        self.appends_adopted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_appends_rebuilt(&self) {
        self.appends_rebuilt.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_corrupt_evicted(&self) {
        self.corrupt_files_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values as a JSON object
    pub fn to_json(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"{{"indexes_built":{},"builds_failed":{},"fallback_reads":{},"bins_activated":{},"index_bytes_written":{},"index_bytes_read":{},"queries_evaluated":{},"appends_merged":{},"appends_adopted":{},"appends_rebuilt":{},"corrupt_files_evicted":{}}}"#,
            s.indexes_built,
            s.builds_failed,
            s.fallback_reads,
            s.bins_activated,
            s.index_bytes_written,
            s.index_bytes_read,
            s.queries_evaluated,
            s.appends_merged,
            s.appends_adopted,
            s.appends_rebuilt,
            s.corrupt_files_evicted,
        )
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            indexes_built: self.indexes_built.load(Ordering::Relaxed),
            builds_failed: self.builds_failed.load(Ordering::Relaxed),
            fallback_reads: self.fallback_reads.load(Ordering::Relaxed),
            bins_activated: self.bins_activated.load(Ordering::Relaxed),
            index_bytes_written: self.index_bytes_written.load(Ordering::Relaxed),
            index_bytes_read: self.index_bytes_read.load(Ordering::Relaxed),
            queries_evaluated: self.queries_evaluated.load(Ordering::Relaxed),
            appends_merged: self.appends_merged.load(Ordering::Relaxed),
            appends_adopted: self.appends_adopted.load(Ordering::Relaxed),
            appends_rebuilt: self.appends_rebuilt.load(Ordering::Relaxed),
            corrupt_files_evicted: self.corrupt_files_evicted.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of every counter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub indexes_built: u64,
    pub builds_failed: u64,
    pub fallback_reads: u64,
    pub bins_activated: u64,
    pub index_bytes_written: u64,
    pub index_bytes_read: u64,
    pub queries_evaluated: u64,
    pub appends_merged: u64,
    pub appends_adopted: u64,
    pub appends_rebuilt: u64,
    pub corrupt_files_evicted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_starts_at_zero() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_counters_accumulate() {
        let registry = MetricsRegistry::new();
        registry.increment_indexes_built();
        registry.add_bins_activated(5);
        registry.add_bins_activated(2);
        registry.add_bytes_written(300);
        registry.increment_appends_rebuilt();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.indexes_built, 1);
        assert_eq!(snapshot.bins_activated, 7);
        assert_eq!(snapshot.index_bytes_written, 300);
        assert_eq!(snapshot.appends_rebuilt, 1);
        assert_eq!(snapshot.appends_merged, 0);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.increment_queries_evaluated();
        registry.add_bytes_read(64);

        let parsed: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(parsed["queries_evaluated"], 1);
        assert_eq!(parsed["index_bytes_read"], 64);
        assert_eq!(parsed["corrupt_files_evicted"], 0);
    }

    #[test]
    fn test_shared_across_threads() {
        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let reg = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..250 {
                        reg.increment_queries_evaluated();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.snapshot().queries_evaluated, 1000);
    }
}
