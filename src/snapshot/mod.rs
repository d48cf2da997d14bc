//! Read snapshots and the store client boundary

mod client;
mod handle;

pub use client::{ConnectionParams, ReadSnapshot, Row, RowStream, StoreClient};
pub use handle::SnapshotHandle;
