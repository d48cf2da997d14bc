//! Shared fixtures for integration tests
//!
//! `FakeStore` is a scripted in-memory store. Every partition it plans is
//! described by a `FakePartition`; the store counts opens, closes and
//! concurrent executions so tests can check resource handling.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use batchread::errors::{EngineError, EngineResult};
use batchread::partition::{ListOptions, Partition, PartitionId};
use batchread::snapshot::{ConnectionParams, ReadSnapshot, Row, RowStream, StoreClient};
use chrono::{DateTime, Utc};
use serde_json::json;

/// Script for one partition
#[derive(Debug, Clone, Default)]
pub struct FakePartition {
    pub rows: u64,
    /// Fail with a transport error after this many rows
    pub fail_after: Option<u64>,
    /// Sleep before each row
    pub row_delay: Duration,
}

impl FakePartition {
    pub fn rows(rows: u64) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn failing_after(rows: u64) -> Self {
        Self {
            rows: rows + 1,
            fail_after: Some(rows),
            ..Self::default()
        }
    }

    pub fn slow(rows: u64, row_delay: Duration) -> Self {
        Self {
            rows,
            row_delay,
            ..Self::default()
        }
    }
}

/// Counters shared by the store and its snapshots
#[derive(Debug, Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub executes: AtomicUsize,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl Counters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct FakeStore {
    pub partitions: Vec<FakePartition>,
    pub open_error: Option<EngineError>,
    pub plan_error: Option<EngineError>,
    pub counters: Arc<Counters>,
    /// SQL passed to every `list` call
    pub planned_sql: Arc<Mutex<Vec<String>>>,
}

impl FakeStore {
    pub fn new(partitions: Vec<FakePartition>) -> Self {
        Self {
            partitions,
            open_error: None,
            plan_error: None,
            counters: Arc::new(Counters::default()),
            planned_sql: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every row this store would return for an unpartitioned read
    pub fn expected_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .partitions
            .iter()
            .enumerate()
            .flat_map(|(i, p)| (0..p.rows).map(move |n| row_id(i as u32, n)))
            .collect();
        ids.sort_unstable();
        ids
    }
}

pub fn row_id(partition: u32, n: u64) -> u64 {
    partition as u64 * 1_000_000 + n
}

impl StoreClient for FakeStore {
    fn open(&self, _params: &ConnectionParams) -> EngineResult<Box<dyn ReadSnapshot>> {
        if let Some(e) = &self.open_error {
            return Err(e.clone());
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSnapshot {
            partitions: self.partitions.clone(),
            plan_error: self.plan_error.clone(),
            counters: Arc::clone(&self.counters),
            planned_sql: Arc::clone(&self.planned_sql),
            read_timestamp: Utc::now(),
        }))
    }
}

struct FakeSnapshot {
    partitions: Vec<FakePartition>,
    plan_error: Option<EngineError>,
    counters: Arc<Counters>,
    planned_sql: Arc<Mutex<Vec<String>>>,
    read_timestamp: DateTime<Utc>,
}

impl ReadSnapshot for FakeSnapshot {
    fn id(&self) -> &str {
        "fake-snapshot"
    }

    fn read_timestamp(&self) -> DateTime<Utc> {
        self.read_timestamp
    }

    fn list_partitions(&self, sql: &str, _options: &ListOptions) -> EngineResult<Vec<Partition>> {
        self.planned_sql.lock().unwrap().push(sql.to_string());
        if let Some(e) = &self.plan_error {
            return Err(e.clone());
        }
        Ok((0..self.partitions.len() as u32)
            .map(|i| Partition::new(PartitionId::new(i), i.to_le_bytes().to_vec()))
            .collect())
    }

    fn execute(&self, partition: &Partition) -> EngineResult<RowStream> {
        let index = partition.id.index();
        let script = self.partitions[index as usize].clone();
        let counters = Arc::clone(&self.counters);

        counters.executes.fetch_add(1, Ordering::SeqCst);
        let now = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak.fetch_max(now, Ordering::SeqCst);
        let guard = ActiveGuard(counters);

        let id = partition.id;
        Ok(Box::new((0..script.rows).map(move |n| {
            let _held = &guard;
            if !script.row_delay.is_zero() {
                std::thread::sleep(script.row_delay);
            }
            if script.fail_after == Some(n) {
                return Err(EngineError::partition(id, "transport error"));
            }
            Row::from_value(json!({ "id": row_id(index, n) }))
        })))
    }

    fn close(&self) -> EngineResult<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Marks an execution active until its row stream is dropped
struct ActiveGuard(Arc<Counters>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn params() -> ConnectionParams {
    ConnectionParams::new("test-instance", "test-database")
}

pub fn ids(rows: &[(PartitionId, Row)]) -> Vec<u64> {
    let mut ids: Vec<u64> = rows
        .iter()
        .map(|(_, row)| row.get("id").and_then(|v| v.as_u64()).unwrap())
        .collect();
    ids.sort_unstable();
    ids
}
