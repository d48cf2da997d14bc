//! Run counters
//!
//! - Counters only, monotonic
//! - Atomic, Relaxed ordering: workers increment concurrently, readers only
//!   need eventually-exact totals

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Registry of engine counters, shared across runs
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    runs_started: AtomicU64,
    runs_succeeded: AtomicU64,
    runs_failed: AtomicU64,
    snapshots_opened: AtomicU64,
    snapshots_closed: AtomicU64,
    partitions_succeeded: AtomicU64,
    partitions_failed: AtomicU64,
    rows_read: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_runs_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_runs_succeeded(&self) {
        self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_runs_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_snapshots_opened(&self) {
        self.snapshots_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_snapshots_closed(&self) {
        self.snapshots_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_partitions_succeeded(&self) {
        self.partitions_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_partitions_failed(&self) {
        self.partitions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rows(&self, rows: u64) {
        self.rows_read.fetch_add(rows, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_succeeded: self.runs_succeeded.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            snapshots_opened: self.snapshots_opened.load(Ordering::Relaxed),
            snapshots_closed: self.snapshots_closed.load(Ordering::Relaxed),
            partitions_succeeded: self.partitions_succeeded.load(Ordering::Relaxed),
            partitions_failed: self.partitions_failed.load(Ordering::Relaxed),
            rows_read: self.rows_read.load(Ordering::Relaxed),
        }
    }

    /// Current counters as a JSON object
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }
}

/// A point-in-time snapshot of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub runs_started: u64,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub snapshots_opened: u64,
    pub snapshots_closed: u64,
    pub partitions_succeeded: u64,
    pub partitions_failed: u64,
    pub rows_read: u64,
}
