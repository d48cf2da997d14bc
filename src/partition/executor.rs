//! Partition execution
//!
//! Executing a partition yields a lazy row stream. A partition may be
//! executed at most once per run; a failure after some rows were already
//! read fails the whole partition.

use std::sync::Mutex;

use super::descriptor::{Partition, PartitionId};
use crate::errors::{EngineError, EngineResult};
use crate::snapshot::{Row, RowStream};

/// Produces the rows of one partition.
pub trait PartitionExecutor: Send + Sync {
    fn execute(&self, partition: &Partition) -> EngineResult<RowStream>;
}

/// Receives rows as workers read them.
///
/// Called concurrently from every worker thread. An error fails the
/// partition the row belongs to.
pub trait RowSink: Send + Sync {
    fn accept(&self, partition: PartitionId, row: &Row) -> EngineResult<()>;
}

/// Sink that drops every row
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl RowSink for DiscardSink {
    fn accept(&self, _partition: PartitionId, _row: &Row) -> EngineResult<()> {
        Ok(())
    }
}

/// Sink that keeps every row in memory, tagged with its partition
#[derive(Debug, Default)]
pub struct CollectingSink {
    rows: Mutex<Vec<(PartitionId, Row)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all rows collected so far
    pub fn take(&self) -> Vec<(PartitionId, Row)> {
        match self.rows.lock() {
            Ok(mut rows) => std::mem::take(&mut *rows),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl RowSink for CollectingSink {
    fn accept(&self, partition: PartitionId, row: &Row) -> EngineResult<()> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| EngineError::partition(partition, "row sink lock poisoned"))?;
        rows.push((partition, row.clone()));
        Ok(())
    }
}
