//! Partition planning
//!
//! Planning is a single upfront step: the whole partition list is
//! materialized before any partition executes.

use serde::{Deserialize, Serialize};

use super::descriptor::Partition;
use crate::errors::EngineResult;

/// Options passed to the planner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Request the isolated compute path that avoids contending with
    /// transactional workloads
    #[serde(default)]
    pub use_accelerated_path: bool,

    /// Desired partition size hint, in bytes
    #[serde(default)]
    pub partition_size_bytes: Option<u64>,

    /// Upper bound hint on the number of partitions
    #[serde(default)]
    pub max_partitions: Option<usize>,
}

impl ListOptions {
    /// Options with the accelerated path requested
    pub fn accelerated() -> Self {
        Self {
            use_accelerated_path: true,
            ..Self::default()
        }
    }
}

/// Produces the partitions of a query against a snapshot.
///
/// Fails with `QueryPlan` for invalid or unplannable SQL and `Connection`
/// on transport failure.
pub trait PartitionSource: Send + Sync {
    fn list(&self, sql: &str, options: &ListOptions) -> EngineResult<Vec<Partition>>;
}
