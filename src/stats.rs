//! Operation counters for an inspectfs instance.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters tracking tree mutations and rejected operations.
///
/// Updated lock-free on the administrative paths; read via
/// [`snapshot`](FsMetrics::snapshot).
#[derive(Debug, Default)]
pub struct FsMetrics {
    dirs_created: AtomicU64,
    entries_created: AtomicU64,
    stats_created: AtomicU64,
    nodes_removed: AtomicU64,
    cascade_releases: AtomicU64,
    stale_operations: AtomicU64,
    rejected_opens: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub dirs_created: u64,
    pub entries_created: u64,
    pub stats_created: u64,
    pub nodes_removed: u64,
    pub cascade_releases: u64,
    pub stale_operations: u64,
    pub rejected_opens: u64,
}

impl FsMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_dir_created(&self) {
        self.dirs_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_entry_created(&self) {
        self.entries_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stat_created(&self) {
        self.stats_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_node_removed(&self) {
        self.nodes_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cascade_release(&self) {
        self.cascade_releases.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale_operation(&self) {
        self.stale_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected_open(&self) {
        self.rejected_opens.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a consistent-enough copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dirs_created: self.dirs_created.load(Ordering::Relaxed),
            entries_created: self.entries_created.load(Ordering::Relaxed),
            stats_created: self.stats_created.load(Ordering::Relaxed),
            nodes_removed: self.nodes_removed.load(Ordering::Relaxed),
            cascade_releases: self.cascade_releases.load(Ordering::Relaxed),
            stale_operations: self.stale_operations.load(Ordering::Relaxed),
            rejected_opens: self.rejected_opens.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_start_at_zero() {
        let metrics = FsMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_metrics_counting() {
        let metrics = FsMetrics::new();

        metrics.record_dir_created();
        metrics.record_dir_created();
        metrics.record_entry_created();
        metrics.record_node_removed();
        metrics.record_stale_operation();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.dirs_created, 2);
        assert_eq!(snapshot.entries_created, 1);
        assert_eq!(snapshot.stats_created, 0);
        assert_eq!(snapshot.nodes_removed, 1);
        assert_eq!(snapshot.stale_operations, 1);
        assert_eq!(snapshot.rejected_opens, 0);
    }
}
