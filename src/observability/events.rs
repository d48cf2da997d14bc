//! Observable events for a partitioned query run
//!
//! Events are explicit and typed. Each maps to one stable event name in the
//! JSON log stream.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration loaded
    ConfigLoaded,

    // Run lifecycle
    /// A run has started
    RunStarted,
    /// The orchestrator moved to a new state
    RunStateChanged,
    /// The run finished and produced a summary
    RunComplete,
    /// The run ended in the failed state
    RunFailed,

    // Snapshot
    /// Read snapshot opened
    SnapshotOpened,
    /// Read snapshot closed
    SnapshotClosed,
    /// Closing the snapshot failed
    CleanupFailed,

    // Partitions
    /// Partition list materialized
    PartitionsPlanned,
    /// A worker began reading a partition
    PartitionStarted,
    /// A partition was fully read
    PartitionCompleted,
    /// A partition failed
    PartitionFailed,
    /// Outstanding work was cancelled
    PartitionsCancelled,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::RunStarted => "RUN_STARTED",
            Event::RunStateChanged => "RUN_STATE",
            Event::RunComplete => "RUN_COMPLETE",
            Event::RunFailed => "RUN_FAILED",

            Event::SnapshotOpened => "SNAPSHOT_OPENED",
            Event::SnapshotClosed => "SNAPSHOT_CLOSED",
            Event::CleanupFailed => "CLEANUP_FAILED",

            Event::PartitionsPlanned => "PARTITIONS_PLANNED",
            Event::PartitionStarted => "PARTITION_STARTED",
            Event::PartitionCompleted => "PARTITION_COMPLETED",
            Event::PartitionFailed => "PARTITION_FAILED",
            Event::PartitionsCancelled => "PARTITIONS_CANCELLED",
        }
    }

    /// Returns true if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::RunFailed | Event::CleanupFailed | Event::PartitionFailed
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
