//! Per-partition outcomes
//!
//! Every executed partition produces exactly one outcome. Outcomes are
//! immutable once produced.

use std::time::Duration;

use crate::errors::EngineError;
use crate::partition::PartitionId;

/// Terminal result of executing one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionOutcome {
    Success {
        partition_id: PartitionId,
        row_count: u64,
        /// Time spent reading this partition
        duration: Duration,
        /// Completion time relative to the start of the run
        since_start: Duration,
    },
    Failure {
        partition_id: PartitionId,
        error: EngineError,
    },
}

impl PartitionOutcome {
    pub fn partition_id(&self) -> PartitionId {
        match self {
            Self::Success { partition_id, .. } | Self::Failure { partition_id, .. } => {
                *partition_id
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Rows read; zero for failures
    pub fn row_count(&self) -> u64 {
        match self {
            Self::Success { row_count, .. } => *row_count,
            Self::Failure { .. } => 0,
        }
    }

    pub fn error(&self) -> Option<&EngineError> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(error),
        }
    }
}
