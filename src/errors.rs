//! Engine error taxonomy
//!
//! Run-level errors (connection, planning, timeout, cancellation) abort a run.
//! Partition-level errors are converted into `Failure` outcomes unless the run
//! is fail-fast. Cleanup errors are logged and recorded, never propagated
//! over the primary result.

use thiserror::Error;

use crate::partition::PartitionId;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Query plan error: {0}")]
    QueryPlan(String),

    #[error("Partition {partition_id} failed: {cause}")]
    PartitionExecution {
        partition_id: PartitionId,
        cause: String,
    },

    #[error("Run timed out after {elapsed_ms}ms with {outstanding} partition(s) outstanding")]
    Timeout { elapsed_ms: u64, outstanding: usize },

    #[error("Snapshot cleanup failed: {0}")]
    Cleanup(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run aborted after partition {0} failed")]
    FailFast(PartitionId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Snapshot {0} is closed")]
    SnapshotClosed(String),

    #[error("Illegal run state transition {from} -> {to}")]
    IllegalTransition { from: String, to: String },
}

impl EngineError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an auth error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a query plan error
    pub fn query_plan(msg: impl Into<String>) -> Self {
        Self::QueryPlan(msg.into())
    }

    /// Create a partition execution error
    pub fn partition(partition_id: PartitionId, cause: impl Into<String>) -> Self {
        Self::PartitionExecution {
            partition_id,
            cause: cause.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "BATCHREAD_CONNECTION",
            Self::Auth(_) => "BATCHREAD_AUTH",
            Self::QueryPlan(_) => "BATCHREAD_QUERY_PLAN",
            Self::PartitionExecution { .. } => "BATCHREAD_PARTITION_EXECUTION",
            Self::Timeout { .. } => "BATCHREAD_TIMEOUT",
            Self::Cleanup(_) => "BATCHREAD_CLEANUP",
            Self::Cancelled => "BATCHREAD_CANCELLED",
            Self::FailFast(_) => "BATCHREAD_FAIL_FAST",
            Self::InvalidConfig(_) => "BATCHREAD_INVALID_CONFIG",
            Self::SnapshotClosed(_) => "BATCHREAD_SNAPSHOT_CLOSED",
            Self::IllegalTransition { .. } => "BATCHREAD_ILLEGAL_TRANSITION",
        }
    }

    /// Whether this error fails a single partition rather than the run
    pub fn is_partition_scoped(&self) -> bool {
        matches!(self, Self::PartitionExecution { .. })
    }

    /// Re-scope any error to the given partition.
    ///
    /// Errors raised while executing a partition are always reported against
    /// that partition, whatever the client called them.
    pub fn into_partition(self, partition_id: PartitionId) -> Self {
        match self {
            Self::PartitionExecution { partition_id: id, cause } if id == partition_id => {
                Self::PartitionExecution { partition_id: id, cause }
            }
            Self::PartitionExecution { cause, .. } => Self::partition(partition_id, cause),
            other => Self::partition(partition_id, other.to_string()),
        }
    }
}
