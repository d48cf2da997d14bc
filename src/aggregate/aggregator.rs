//! ResultAggregator - folds outcomes into a summary
//!
//! Pure accumulation: no I/O. Outcomes must come from a single consumer,
//! in completion order.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::summary::{FailureRecord, Progress, RunSummary};
use crate::pool::{PartitionOutcome, StopReason};

/// Incremental builder of a [`RunSummary`]
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    clock: Instant,
    partitions_total: usize,
    succeeded: usize,
    failed: usize,
    total_rows: u64,
    last_since_start: Duration,
    failures: Vec<FailureRecord>,
}

impl ResultAggregator {
    /// Start aggregating a run that begins now
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            clock: Instant::now(),
            partitions_total: 0,
            succeeded: 0,
            failed: 0,
            total_rows: 0,
            last_since_start: Duration::ZERO,
            failures: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Record how many partitions planning produced
    pub fn set_partitions_total(&mut self, total: usize) {
        self.partitions_total = total;
    }

    /// Fold one outcome and return the updated totals
    pub fn record(&mut self, outcome: &PartitionOutcome) -> Progress {
        match outcome {
            PartitionOutcome::Success { row_count, .. } => {
                self.succeeded += 1;
                self.total_rows += row_count;
            }
            PartitionOutcome::Failure {
                partition_id,
                error,
            } => {
                self.failed += 1;
                self.failures.push(FailureRecord {
                    partition_id: *partition_id,
                    code: error.code().to_string(),
                    message: error.to_string(),
                });
            }
        }
        // Measured on the aggregator's clock so failures are timed as well
        self.last_since_start = self.clock.elapsed();
        self.progress()
    }

    /// Current running totals
    pub fn progress(&self) -> Progress {
        Progress {
            partitions_total: self.partitions_total,
            completed: self.succeeded + self.failed,
            succeeded: self.succeeded,
            failed: self.failed,
            total_rows: self.total_rows,
            elapsed_ms: self.last_since_start.as_millis() as u64,
        }
    }

    /// Build the final summary
    pub fn finish(self, attempted: usize, stop: &StopReason) -> RunSummary {
        let completed = self.succeeded + self.failed;
        RunSummary {
            run_id: self.run_id,
            snapshot_id: None,
            started_at: self.started_at,
            finished_at: Utc::now(),
            elapsed_ms: self.clock.elapsed().as_millis() as u64,
            partitions_total: self.partitions_total,
            attempted,
            succeeded: self.succeeded,
            failed: self.failed,
            not_completed: self.partitions_total.saturating_sub(completed),
            total_rows: self.total_rows,
            stop_reason: stop.as_str().to_string(),
            failures: self.failures,
            cleanup_error: None,
        }
    }
}
