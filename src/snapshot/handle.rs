//! SnapshotHandle - owned lifetime of a read-only snapshot
//!
//! - Closed exactly once per successful open
//! - `close()` is idempotent; later calls are no-ops
//! - Once closed, no partition may be listed or start executing
//! - Dropping an unclosed handle closes it

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use super::client::{ConnectionParams, ReadSnapshot, RowStream, StoreClient};
use crate::errors::{EngineError, EngineResult};
use crate::observability::{log_event_with_fields, Event};
use crate::partition::{ListOptions, Partition, PartitionExecutor, PartitionSource};

/// Owned handle to a client snapshot
pub struct SnapshotHandle {
    inner: Box<dyn ReadSnapshot>,
    id: String,
    opened_at: DateTime<Utc>,
    closed: AtomicBool,
}

impl SnapshotHandle {
    /// Open a read-only snapshot through the client
    pub fn open(client: &dyn StoreClient, params: &ConnectionParams) -> EngineResult<Self> {
        params.validate()?;
        let inner = client.open(params)?;
        let handle = Self::from_snapshot(inner);

        log_event_with_fields(
            Event::SnapshotOpened,
            &[
                ("snapshot", handle.id()),
                ("instance", &params.instance_id),
                ("database", &params.database_id),
                ("read_timestamp", &handle.read_timestamp().to_rfc3339()),
            ],
        );

        Ok(handle)
    }

    /// Take ownership of a snapshot the client already opened
    pub fn from_snapshot(inner: Box<dyn ReadSnapshot>) -> Self {
        let id = inner.id().to_string();
        Self {
            inner,
            id,
            opened_at: Utc::now(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// When this handle was created
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// The point in time the snapshot reads at
    pub fn read_timestamp(&self) -> DateTime<Utc> {
        self.inner.read_timestamp()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the snapshot.
    ///
    /// Only the first call reaches the client. A failure there is returned
    /// as `Cleanup`; the handle is still considered closed.
    pub fn close(&self) -> EngineResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        match self.inner.close() {
            Ok(()) => {
                log_event_with_fields(Event::SnapshotClosed, &[("snapshot", &self.id)]);
                Ok(())
            }
            Err(e) => Err(EngineError::Cleanup(e.to_string())),
        }
    }
}

impl PartitionSource for SnapshotHandle {
    fn list(&self, sql: &str, options: &ListOptions) -> EngineResult<Vec<Partition>> {
        if self.is_closed() {
            return Err(EngineError::SnapshotClosed(self.id.clone()));
        }
        self.inner.list_partitions(sql, options)
    }
}

impl PartitionExecutor for SnapshotHandle {
    fn execute(&self, partition: &Partition) -> EngineResult<RowStream> {
        if self.is_closed() {
            return Err(EngineError::partition(
                partition.id,
                format!("snapshot {} is closed", self.id),
            ));
        }
        let id = partition.id;
        let rows = self
            .inner
            .execute(partition)
            .map_err(|e| e.into_partition(id))?;
        Ok(Box::new(rows.map(move |row| row.map_err(|e| e.into_partition(id)))))
    }
}

impl Drop for SnapshotHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log_event_with_fields(
                Event::CleanupFailed,
                &[("snapshot", &self.id), ("reason", &e.to_string())],
            );
        }
    }
}

impl std::fmt::Debug for SnapshotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotHandle")
            .field("id", &self.id)
            .field("opened_at", &self.opened_at)
            .field("closed", &self.is_closed())
            .finish()
    }
}
