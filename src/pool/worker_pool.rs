//! Bounded worker pool
//!
//! Fan-out/fan-in over a `JoinSet`:
//! - at most `max_workers` partitions in flight
//! - each partition reads on a blocking-pool thread
//! - outcomes are handed to the caller in completion order
//! - a failing or panicking partition becomes a `Failure` outcome
//!
//! The pool stops dispatching on fail-fast, timeout or cancellation and
//! then drains: `run` returns only after every dispatched worker has
//! finished or observed the halt flag, so the caller may close the snapshot
//! as soon as it returns.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;

use super::cancel::CancelToken;
use super::outcome::PartitionOutcome;
use crate::errors::{EngineError, EngineResult};
use crate::observability::{log_event_with_fields, Event};
use crate::partition::{Partition, PartitionExecutor, PartitionId, RowSink};

/// Hard cap on the default worker count
const MAX_DEFAULT_WORKERS: usize = 32;

/// Pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum partitions executing at once; must be >= 1
    pub max_workers: usize,

    /// Stop after the first failed partition
    pub fail_fast: bool,

    /// Deadline for the whole run
    pub timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: Self::default_max_workers(),
            fail_fast: false,
            timeout: None,
        }
    }
}

impl PoolConfig {
    /// `min(32, available_parallelism + 4)`
    pub fn default_max_workers() -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        (cpus + 4).min(MAX_DEFAULT_WORKERS)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.max_workers == 0 {
            return Err(EngineError::invalid_config("max_workers must be >= 1"));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(EngineError::invalid_config("timeout must be > 0"));
        }
        Ok(())
    }
}

/// Why the pool stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Every partition produced an outcome
    Completed,
    /// Fail-fast tripped on this partition
    FailFast(PartitionId),
    /// The run deadline passed
    TimedOut,
    /// The caller cancelled the run
    Cancelled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::FailFast(_) => "fail_fast",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What a pool run produced
#[derive(Debug, Clone)]
pub struct PoolReport {
    /// Outcomes yielded, in completion order
    pub outcomes: Vec<PartitionOutcome>,
    pub stop: StopReason,
    /// Partitions handed to the pool
    pub partitions: usize,
    /// Partitions that started on a worker
    pub dispatched: usize,
    pub elapsed: Duration,
}

impl PoolReport {
    /// Partitions without a yielded outcome
    pub fn outstanding(&self) -> usize {
        self.partitions - self.outcomes.len()
    }
}

enum WorkerResult {
    Finished(PartitionOutcome),
    /// Stopped at a checkpoint after the pool halted
    Interrupted,
}

/// Bounded, fault-isolating executor of partitions
#[derive(Debug, Clone)]
pub struct WorkerPool {
    config: PoolConfig,
    cancel: CancelToken,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelToken::new(),
        })
    }

    /// Observe an external cancellation token
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Execute every partition, calling `on_outcome` for each yielded outcome
    /// in completion order.
    pub async fn run<E, F>(
        &self,
        partitions: Vec<Partition>,
        executor: Arc<E>,
        sink: Arc<dyn RowSink>,
        mut on_outcome: F,
    ) -> PoolReport
    where
        E: PartitionExecutor + ?Sized + 'static,
        F: FnMut(&PartitionOutcome),
    {
        let run_started = Instant::now();
        let deadline = self
            .config
            .timeout
            .map(|t| tokio::time::Instant::from_std(run_started + t));

        let total = partitions.len();
        let mut pending = partitions.into_iter();
        let mut in_flight: JoinSet<WorkerResult> = JoinSet::new();
        let halt = CancelToken::new();
        let _halt_on_drop = HaltOnDrop(halt.clone());

        let mut outcomes = Vec::with_capacity(total);
        let mut stop: Option<StopReason> = None;
        let mut dispatched = 0usize;
        let mut discarded = 0usize;

        loop {
            while stop.is_none() && in_flight.len() < self.config.max_workers {
                let Some(partition) = pending.next() else {
                    break;
                };
                if self.cancel.is_cancelled() {
                    stop = Some(StopReason::Cancelled);
                    break;
                }
                if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                    stop = Some(StopReason::TimedOut);
                    break;
                }

                let executor = Arc::clone(&executor);
                let sink = Arc::clone(&sink);
                let worker_halt = halt.clone();
                in_flight.spawn_blocking(move || {
                    run_partition(&*executor, &*sink, partition, &worker_halt, run_started)
                });
                dispatched += 1;
            }

            if stop.is_some() {
                halt.cancel();
            }
            if in_flight.is_empty() {
                break;
            }

            // Finished workers are drained before a stop is considered
            let joined = tokio::select! {
                biased;
                joined = in_flight.join_next() => joined,
                _ = self.cancel.cancelled(), if stop.is_none() => {
                    stop = Some(StopReason::Cancelled);
                    continue;
                }
                _ = sleep_until(deadline), if stop.is_none() && deadline.is_some() => {
                    stop = Some(StopReason::TimedOut);
                    continue;
                }
            };

            match joined {
                Some(Ok(WorkerResult::Finished(outcome))) => {
                    if stop.is_some() {
                        discarded += 1;
                        continue;
                    }
                    log_outcome(&outcome);
                    on_outcome(&outcome);
                    if self.config.fail_fast && !outcome.is_success() {
                        stop = Some(StopReason::FailFast(outcome.partition_id()));
                    }
                    outcomes.push(outcome);
                }
                Some(Ok(WorkerResult::Interrupted)) => discarded += 1,
                Some(Err(e)) => {
                    // Only reachable when the runtime is shutting down
                    discarded += 1;
                    log_event_with_fields(
                        Event::PartitionFailed,
                        &[("reason", &format!("worker task lost: {}", e))],
                    );
                }
                None => break,
            }
        }

        let stop = stop.unwrap_or(StopReason::Completed);
        if stop != StopReason::Completed {
            log_event_with_fields(
                Event::PartitionsCancelled,
                &[
                    ("reason", stop.as_str()),
                    ("undispatched", &(total - dispatched).to_string()),
                    ("discarded", &discarded.to_string()),
                ],
            );
        }

        PoolReport {
            outcomes,
            stop,
            partitions: total,
            dispatched,
            elapsed: run_started.elapsed(),
        }
    }
}

/// Stops workers if the run future is dropped before it drains
struct HaltOnDrop(CancelToken);

impl Drop for HaltOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

fn log_outcome(outcome: &PartitionOutcome) {
    match outcome {
        PartitionOutcome::Success {
            partition_id,
            row_count,
            since_start,
            ..
        } => log_event_with_fields(
            Event::PartitionCompleted,
            &[
                ("partition", &partition_id.to_string()),
                ("rows", &row_count.to_string()),
                ("elapsed_secs", &format!("{:.3}", since_start.as_secs_f64())),
            ],
        ),
        PartitionOutcome::Failure {
            partition_id,
            error,
        } => log_event_with_fields(
            Event::PartitionFailed,
            &[
                ("partition", &partition_id.to_string()),
                ("reason", &error.to_string()),
            ],
        ),
    }
}

/// Worker body; runs on a blocking-pool thread
fn run_partition<E>(
    executor: &E,
    sink: &dyn RowSink,
    partition: Partition,
    halt: &CancelToken,
    run_started: Instant,
) -> WorkerResult
where
    E: PartitionExecutor + ?Sized,
{
    let id = partition.id;
    if halt.is_cancelled() {
        return WorkerResult::Interrupted;
    }

    log_event_with_fields(Event::PartitionStarted, &[("partition", &id.to_string())]);

    let started = Instant::now();
    let read = panic::catch_unwind(AssertUnwindSafe(|| {
        read_partition(executor, sink, &partition, halt)
    }));

    match read {
        Ok(Ok(Some(row_count))) => WorkerResult::Finished(PartitionOutcome::Success {
            partition_id: id,
            row_count,
            duration: started.elapsed(),
            since_start: run_started.elapsed(),
        }),
        Ok(Ok(None)) => WorkerResult::Interrupted,
        Ok(Err(e)) => WorkerResult::Finished(PartitionOutcome::Failure {
            partition_id: id,
            error: e.into_partition(id),
        }),
        Err(payload) => WorkerResult::Finished(PartitionOutcome::Failure {
            partition_id: id,
            error: EngineError::partition(
                id,
                format!("worker panicked: {}", panic_message(payload.as_ref())),
            ),
        }),
    }
}

/// Returns `None` when interrupted by the halt flag
fn read_partition<E>(
    executor: &E,
    sink: &dyn RowSink,
    partition: &Partition,
    halt: &CancelToken,
) -> EngineResult<Option<u64>>
where
    E: PartitionExecutor + ?Sized,
{
    let mut rows = executor.execute(partition)?;
    let mut count = 0u64;
    loop {
        if halt.is_cancelled() {
            return Ok(None);
        }
        match rows.next() {
            Some(row) => {
                let row = row?;
                sink.accept(partition.id, &row)?;
                count += 1;
            }
            None => return Ok(Some(count)),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
