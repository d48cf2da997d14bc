//! Run Outcome Tests
//!
//! End-to-end runs against the scripted store:
//! - totals and failure records
//! - partial summaries on timeout
//! - the worker bound
//! - row completeness
//! - progress events and counters

mod support;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use batchread::errors::EngineError;
use batchread::observability::MetricsRegistry;
use batchread::partition::{CollectingSink, PartitionId};
use batchread::runner::{progress_channel, run_query, QueryRunner, RunOptions, RunState};
use support::{ids, params, FakePartition, FakeStore};

const SQL: &str = "SELECT * FROM users";

// =============================================================================
// Totals
// =============================================================================

/// Three good partitions and one transport failure, without fail-fast.
#[tokio::test(flavor = "multi_thread")]
async fn test_isolated_failure_totals() {
    let store = Arc::new(FakeStore::new(vec![
        FakePartition::rows(10),
        FakePartition::rows(20),
        FakePartition::rows(30),
        FakePartition::failing_after(5),
    ]));

    let summary = run_query(store, &params(), SQL, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.partitions_total, 4);
    assert_eq!(summary.attempted, 4);
    assert_eq!(summary.total_rows, 60);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.not_completed, 0);
    assert_eq!(summary.stop_reason, "completed");
    assert!(!summary.is_complete_success());

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].partition_id, PartitionId::new(3));
    assert_eq!(summary.failures[0].code, "BATCHREAD_PARTITION_EXECUTION");
    assert!(summary.failures[0].message.contains("transport error"));
}

/// Five partitions, two still running at the deadline.
#[tokio::test(flavor = "multi_thread")]
async fn test_timeout_reports_partial_summary() {
    let store = Arc::new(FakeStore::new(vec![
        FakePartition::rows(1),
        FakePartition::rows(2),
        FakePartition::rows(3),
        FakePartition::slow(500, Duration::from_millis(20)),
        FakePartition::slow(500, Duration::from_millis(20)),
    ]));
    let counters = Arc::clone(&store.counters);

    let options = RunOptions::default()
        .with_max_workers(5)
        .with_timeout(Duration::from_millis(500));
    let err = run_query(store, &params(), SQL, &options)
        .await
        .unwrap_err();

    match err.error {
        EngineError::Timeout { outstanding, .. } => assert_eq!(outstanding, 2),
        ref other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.failed_in, RunState::Executing);

    let summary = err.summary.unwrap();
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.not_completed, 2);
    assert_eq!(summary.total_rows, 6);
    assert_eq!(summary.stop_reason, "timed_out");
    assert_eq!(counters.closes(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_zero_partitions_is_success() {
    let store = Arc::new(FakeStore::new(Vec::new()));
    let counters = Arc::clone(&store.counters);

    let summary = run_query(store, &params(), SQL, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.partitions_total, 0);
    assert_eq!(summary.attempted, 0);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.total_rows, 0);
    assert!(summary.is_complete_success());
    assert_eq!(counters.closes(), 1);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_never_exceeds_max_workers() {
    let store = Arc::new(FakeStore::new(vec![
        FakePartition::slow(5, Duration::from_millis(5));
        12
    ]));
    let counters = Arc::clone(&store.counters);

    let summary = run_query(
        store,
        &params(),
        SQL,
        &RunOptions::default().with_max_workers(3),
    )
    .await
    .unwrap();

    assert_eq!(summary.succeeded, 12);
    assert!(counters.peak() <= 3, "peak was {}", counters.peak());
    assert!(counters.peak() >= 1);
}

// =============================================================================
// Completeness
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_rows_match_unpartitioned_read() {
    let partitions: Vec<FakePartition> = (0..9).map(|i| FakePartition::rows(i * 7)).collect();
    let store = Arc::new(FakeStore::new(partitions));
    let expected = store.expected_ids();
    let sink = Arc::new(CollectingSink::new());

    let summary = QueryRunner::new(store)
        .with_row_sink(sink.clone())
        .run(&params(), SQL, &RunOptions::default().with_max_workers(4))
        .await
        .unwrap();

    let rows = sink.take();
    assert_eq!(summary.total_rows as usize, rows.len());
    assert_eq!(ids(&rows), expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sql_passed_to_planner_verbatim() {
    let store = Arc::new(FakeStore::new(vec![FakePartition::rows(1)]));
    let planned = Arc::clone(&store.planned_sql);
    let sql = "SELECT userUUID, email FROM users";

    run_query(store, &params(), sql, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(*planned.lock().unwrap(), vec![sql.to_string()]);
}

// =============================================================================
// Progress and counters
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_progress_event_per_outcome() {
    let store = Arc::new(FakeStore::new(vec![
        FakePartition::rows(4),
        FakePartition::failing_after(2),
        FakePartition::rows(6),
    ]));
    let (sender, mut receiver) = progress_channel();

    let summary = QueryRunner::new(store)
        .with_progress(sender)
        .run(&params(), SQL, &RunOptions::default())
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }

    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.run_id == summary.run_id));
    let partitions: HashSet<_> = events.iter().map(|e| e.outcome.partition_id()).collect();
    assert_eq!(partitions.len(), 3);

    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.progress.completed, i + 1);
        assert_eq!(event.progress.partitions_total, 3);
    }
    let last = &events[2].progress;
    assert_eq!(last.succeeded, 2);
    assert_eq!(last.failed, 1);
    assert_eq!(last.total_rows, 10);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_metrics_follow_runs() {
    let metrics = Arc::new(MetricsRegistry::new());

    let ok = Arc::new(FakeStore::new(vec![FakePartition::rows(5), FakePartition::rows(5)]));
    QueryRunner::new(ok)
        .with_metrics(Arc::clone(&metrics))
        .run(&params(), SQL, &RunOptions::default())
        .await
        .unwrap();

    let mut failing = FakeStore::new(vec![FakePartition::rows(1)]);
    failing.plan_error = Some(EngineError::query_plan("unknown table"));
    QueryRunner::new(Arc::new(failing))
        .with_metrics(Arc::clone(&metrics))
        .run(&params(), SQL, &RunOptions::default())
        .await
        .unwrap_err();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.runs_started, 2);
    assert_eq!(snapshot.runs_succeeded, 1);
    assert_eq!(snapshot.runs_failed, 1);
    assert_eq!(snapshot.snapshots_opened, 2);
    assert_eq!(snapshot.snapshots_closed, 2);
    assert_eq!(snapshot.partitions_succeeded, 2);
    assert_eq!(snapshot.rows_read, 10);
}
