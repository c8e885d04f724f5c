use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Lock-free counters for store operations.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    search_count: AtomicU64,
    chunk_insert_count: AtomicU64,
    chunk_delete_count: AtomicU64,
    snapshot_write_count: AtomicU64,
    total_candidates_scored: AtomicU64,
    total_search_time_ns: AtomicU64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_search(&self, candidates: u64, duration_ns: u64) {
        self.search_count.fetch_add(1, Ordering::Relaxed);
        self.total_candidates_scored
            .fetch_add(candidates, Ordering::Relaxed);
        self.total_search_time_ns
            .fetch_add(duration_ns, Ordering::Relaxed);
    }

    pub(crate) fn record_chunk_inserts(&self, n: u64) {
        self.chunk_insert_count.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_chunk_deletes(&self, n: u64) {
        self.chunk_delete_count.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_snapshot_write(&self) {
        self.snapshot_write_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let searches = self.search_count.load(Ordering::Relaxed);
        let total_time_ns = self.total_search_time_ns.load(Ordering::Relaxed);
        let total_candidates = self.total_candidates_scored.load(Ordering::Relaxed);

        MetricsSnapshot {
            searches,
            chunk_inserts: self.chunk_insert_count.load(Ordering::Relaxed),
            chunk_deletes: self.chunk_delete_count.load(Ordering::Relaxed),
            snapshots_written: self.snapshot_write_count.load(Ordering::Relaxed),
            avg_search_time_us: if searches > 0 {
                total_time_ns as f64 / searches as f64 / 1000.0
            } else {
                0.0
            },
            avg_candidates_per_search: if searches > 0 {
                total_candidates as f64 / searches as f64
            } else {
                0.0
            },
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.search_count.store(0, Ordering::Relaxed);
        self.chunk_insert_count.store(0, Ordering::Relaxed);
        self.chunk_delete_count.store(0, Ordering::Relaxed);
        self.snapshot_write_count.store(0, Ordering::Relaxed);
        self.total_candidates_scored.store(0, Ordering::Relaxed);
        self.total_search_time_ns.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time view of store metrics.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub searches: u64,
    pub chunk_inserts: u64,
    pub chunk_deletes: u64,
    pub snapshots_written: u64,
    pub avg_search_time_us: f64,
    pub avg_candidates_per_search: f64,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Searches: {}, Inserts: {}, Deletes: {}, Snapshots: {}, Avg search: {:.2}us, Avg candidates: {:.1}",
            self.searches,
            self.chunk_inserts,
            self.chunk_deletes,
            self.snapshots_written,
            self.avg_search_time_us,
            self.avg_candidates_per_search,
        )
    }
}

/// RAII timer for measuring search durations.
pub(crate) struct SearchTimer {
    start: Instant,
}

impl SearchTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
}
