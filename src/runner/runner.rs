//! QueryRunner - orchestrates one partitioned query run
//!
//! open snapshot -> list partitions -> run pool -> aggregate -> close snapshot
//!
//! The snapshot is closed on every exit path: on success, on any error, and
//! (through `SnapshotHandle`'s drop) when the run future itself is dropped.
//! A failed close is logged and recorded on the summary; it never replaces
//! the run's own result.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::cancel::RunCanceller;
use super::options::RunOptions;
use super::state::{RunLifecycle, RunState};
use crate::aggregate::{Progress, ResultAggregator, RunSummary};
use crate::errors::EngineError;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::partition::{DiscardSink, PartitionSource, RowSink};
use crate::pool::{PartitionOutcome, StopReason, WorkerPool};
use crate::snapshot::{ConnectionParams, SnapshotHandle, StoreClient};

/// Emitted once per yielded outcome
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub run_id: Uuid,
    pub outcome: PartitionOutcome,
    pub progress: Progress,
}

/// Progress channel sender
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Progress channel receiver
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// A run that ended in the `Failed` state
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunError {
    pub error: EngineError,
    /// State the run was in when it failed
    pub failed_in: RunState,
    /// Totals up to the failure; present once execution had started
    pub summary: Option<RunSummary>,
}

impl RunError {
    pub fn code(&self) -> &'static str {
        self.error.code()
    }
}

/// Orchestrator for partitioned query runs
pub struct QueryRunner {
    client: Arc<dyn StoreClient>,
    sink: Arc<dyn RowSink>,
    canceller: RunCanceller,
    progress: Option<ProgressSender>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl QueryRunner {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self {
            client,
            sink: Arc::new(DiscardSink),
            canceller: RunCanceller::new(),
            progress: None,
            metrics: None,
        }
    }

    /// Route every row read to `sink`
    pub fn with_row_sink(mut self, sink: Arc<dyn RowSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Emit a [`ProgressEvent`] per outcome
    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Handle that cancels the runs in progress on this runner
    pub fn canceller(&self) -> RunCanceller {
        self.canceller.clone()
    }

    /// Execute `sql` against a fresh snapshot
    pub async fn run(
        &self,
        params: &ConnectionParams,
        sql: &str,
        options: &RunOptions,
    ) -> Result<RunSummary, RunError> {
        let run_id = Uuid::new_v4();
        let mut lifecycle = RunLifecycle::new(run_id);
        let mut aggregator = ResultAggregator::new(run_id);
        let run_id_str = run_id.to_string();

        self.count(MetricsRegistry::increment_runs_started);
        log_event_with_fields(
            Event::RunStarted,
            &[
                ("run_id", &run_id_str),
                ("started_at", &aggregator.started_at().to_rfc3339()),
                ("database", &params.database_id),
                ("instance", &params.instance_id),
            ],
        );

        let active = self.canceller.begin();
        let pool = match options.pool_config().and_then(WorkerPool::new) {
            Ok(pool) => pool.with_cancel_token(active.token()),
            Err(e) => return Err(self.fail(&mut lifecycle, e, None, None)),
        };

        let snapshot = match SnapshotHandle::open(&*self.client, params) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => return Err(self.fail(&mut lifecycle, e, None, None)),
        };
        self.count(MetricsRegistry::increment_snapshots_opened);

        if let Err(e) = lifecycle
            .advance(RunState::SnapshotOpen)
            .and_then(|_| lifecycle.advance(RunState::Planning))
        {
            return Err(self.fail(&mut lifecycle, e, Some(&snapshot), None));
        }

        let partitions = match snapshot.list(sql, &options.list) {
            Ok(partitions) => partitions,
            Err(e) => return Err(self.fail(&mut lifecycle, e, Some(&snapshot), None)),
        };

        aggregator.set_partitions_total(partitions.len());
        log_event_with_fields(
            Event::PartitionsPlanned,
            &[
                ("run_id", &run_id_str),
                ("partitions", &partitions.len().to_string()),
                (
                    "accelerated",
                    if options.list.use_accelerated_path { "true" } else { "false" },
                ),
            ],
        );

        if let Err(e) = lifecycle.advance(RunState::Executing) {
            return Err(self.fail(&mut lifecycle, e, Some(&snapshot), None));
        }

        let report = pool
            .run(
                partitions,
                Arc::clone(&snapshot),
                Arc::clone(&self.sink),
                |outcome| {
                    let progress = aggregator.record(outcome);
                    self.count_outcome(outcome);
                    if let Some(sender) = &self.progress {
                        // A dropped receiver must not affect the run
                        let _ = sender.send(ProgressEvent {
                            run_id,
                            outcome: outcome.clone(),
                            progress,
                        });
                    }
                },
            )
            .await;

        let error = match report.stop {
            StopReason::Completed => None,
            StopReason::FailFast(partition_id) => Some(EngineError::FailFast(partition_id)),
            StopReason::TimedOut => Some(EngineError::Timeout {
                elapsed_ms: report.elapsed.as_millis() as u64,
                outstanding: report.outstanding(),
            }),
            StopReason::Cancelled => Some(EngineError::Cancelled),
        };
        if let Some(e) = error {
            let mut partial = aggregator.finish(report.dispatched, &report.stop);
            partial.snapshot_id = Some(snapshot.id().to_string());
            return Err(self.fail(&mut lifecycle, e, Some(&snapshot), Some(partial)));
        }

        if let Err(e) = lifecycle.advance(RunState::Aggregating) {
            return Err(self.fail(&mut lifecycle, e, Some(&snapshot), None));
        }
        let mut summary = aggregator.finish(report.dispatched, &report.stop);
        summary.snapshot_id = Some(snapshot.id().to_string());

        summary.cleanup_error = self.close_snapshot(&snapshot);
        if let Err(e) = lifecycle.advance(RunState::Closed) {
            return Err(self.fail(&mut lifecycle, e, None, Some(summary)));
        }

        self.count(MetricsRegistry::increment_runs_succeeded);
        log_event_with_fields(
            Event::RunComplete,
            &[
                ("run_id", &run_id_str),
                ("partitions", &summary.partitions_total.to_string()),
                ("succeeded", &summary.succeeded.to_string()),
                ("failed", &summary.failed.to_string()),
                ("rows", &summary.total_rows.to_string()),
                ("elapsed_ms", &summary.elapsed_ms.to_string()),
            ],
        );

        Ok(summary)
    }

    /// Release the snapshot, then enter `Failed`
    fn fail(
        &self,
        lifecycle: &mut RunLifecycle,
        error: EngineError,
        snapshot: Option<&SnapshotHandle>,
        mut summary: Option<RunSummary>,
    ) -> RunError {
        if let Some(snapshot) = snapshot {
            let cleanup_error = self.close_snapshot(snapshot);
            if let Some(summary) = summary.as_mut() {
                summary.cleanup_error = cleanup_error;
            }
        }

        let failed_in = lifecycle.fail();
        self.count(MetricsRegistry::increment_runs_failed);
        log_event_with_fields(
            Event::RunFailed,
            &[
                ("code", error.code()),
                ("reason", &error.to_string()),
                ("state", failed_in.as_str()),
            ],
        );

        RunError {
            error,
            failed_in,
            summary,
        }
    }

    /// Close the snapshot; a failure is logged and returned as text
    fn close_snapshot(&self, snapshot: &SnapshotHandle) -> Option<String> {
        let already_closed = snapshot.is_closed();
        let result = snapshot.close();
        if !already_closed {
            self.count(MetricsRegistry::increment_snapshots_closed);
        }
        match result {
            Ok(()) => None,
            Err(e) => {
                log_event_with_fields(
                    Event::CleanupFailed,
                    &[("snapshot", snapshot.id()), ("reason", &e.to_string())],
                );
                Some(e.to_string())
            }
        }
    }

    fn count(&self, f: fn(&MetricsRegistry)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }

    fn count_outcome(&self, outcome: &PartitionOutcome) {
        if let Some(metrics) = &self.metrics {
            if outcome.is_success() {
                metrics.increment_partitions_succeeded();
                metrics.add_rows(outcome.row_count());
            } else {
                metrics.increment_partitions_failed();
            }
        }
    }
}

/// Run `sql` once against a fresh snapshot with default sinks
pub async fn run_query(
    client: Arc<dyn StoreClient>,
    params: &ConnectionParams,
    sql: &str,
    options: &RunOptions,
) -> Result<RunSummary, RunError> {
    QueryRunner::new(client).run(params, sql, options).await
}

/// Create a progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}
