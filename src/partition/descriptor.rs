//! Partition descriptors
//!
//! A partition is an opaque, serializable slice of a query's result set.
//! The token bytes belong to the client that planned it; the engine only
//! moves them around.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a partition within the sequence returned by one `list` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(u32);

impl PartitionId {
    #[inline]
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Descriptor for one independently executable slice of a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Index within the planned sequence
    pub id: PartitionId,

    /// Client-defined token
    pub token: Vec<u8>,

    /// Planner's row estimate, if it has one
    pub estimated_rows: Option<u64>,

    /// Planned for the isolated compute path
    pub accelerated: bool,
}

impl Partition {
    /// Create a new partition descriptor
    pub fn new(id: PartitionId, token: Vec<u8>) -> Self {
        Self {
            id,
            token,
            estimated_rows: None,
            accelerated: false,
        }
    }

    /// Attach a row estimate
    pub fn with_estimated_rows(mut self, rows: u64) -> Self {
        self.estimated_rows = Some(rows);
        self
    }

    /// Mark as planned for the accelerated path
    pub fn with_accelerated(mut self, accelerated: bool) -> Self {
        self.accelerated = accelerated;
        self
    }
}
