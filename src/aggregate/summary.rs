//! Run summaries and progress snapshots

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::partition::PartitionId;

/// One failed partition, as reported in a summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub partition_id: PartitionId,
    pub code: String,
    pub message: String,
}

/// Running totals, emitted after every outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub partitions_total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_rows: u64,
    /// Time from run start to the latest outcome
    pub elapsed_ms: u64,
}

impl Progress {
    /// Fraction of partitions with an outcome, in `[0, 1]`
    pub fn fraction(&self) -> f64 {
        if self.partitions_total == 0 {
            1.0
        } else {
            self.completed as f64 / self.partitions_total as f64
        }
    }
}

/// Aggregate of every outcome of one query run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub snapshot_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,

    /// Partitions returned by planning
    pub partitions_total: usize,
    /// Partitions that started executing
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Partitions without an outcome (cancelled, timed out, never started)
    pub not_completed: usize,
    pub total_rows: u64,

    /// `completed`, `fail_fast`, `timed_out`, or `cancelled`
    pub stop_reason: String,
    pub failures: Vec<FailureRecord>,

    /// Set when closing the snapshot failed
    pub cleanup_error: Option<String>,
}

impl RunSummary {
    /// Every partition produced a successful outcome
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0 && self.not_completed == 0 && self.stop_reason == "completed"
    }
}
