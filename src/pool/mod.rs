//! Bounded worker pool for partition execution

mod cancel;
mod outcome;
mod worker_pool;

pub use cancel::CancelToken;
pub use outcome::PartitionOutcome;
pub use worker_pool::{PoolConfig, PoolReport, StopReason, WorkerPool};
