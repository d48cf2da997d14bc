//! Outcome aggregation

mod aggregator;
mod summary;

pub use aggregator::ResultAggregator;
pub use summary::{FailureRecord, Progress, RunSummary};
