//! batchread - parallel reads of one query from a consistent snapshot
//!
//! A run opens a read-only snapshot, asks the store to split the query into
//! partitions, executes the partitions on a bounded worker pool, aggregates
//! the outcomes as they complete, and closes the snapshot on every exit
//! path.
//!
//! ```ignore
//! use std::sync::Arc;
//! use batchread::{run_query, ConnectionParams, LocalStore, RunOptions};
//!
//! let store = Arc::new(LocalStore::new("./data"));
//! let params = ConnectionParams::new("prod", "app");
//! let summary = run_query(store, &params, "SELECT * FROM users", &RunOptions::default()).await?;
//! println!("{} rows", summary.total_rows);
//! ```

pub mod aggregate;
pub mod cli;
pub mod errors;
pub mod observability;
pub mod partition;
pub mod pool;
pub mod runner;
pub mod snapshot;
pub mod store;

pub use aggregate::{Progress, ResultAggregator, RunSummary};
pub use errors::{EngineError, EngineResult};
pub use partition::{ListOptions, Partition, PartitionId, PartitionSource};
pub use pool::{CancelToken, PartitionOutcome, WorkerPool};
pub use runner::{run_query, QueryRunner, RunError, RunOptions, RunState};
pub use snapshot::{ConnectionParams, ReadSnapshot, Row, SnapshotHandle, StoreClient};
pub use store::LocalStore;
