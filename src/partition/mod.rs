//! Partitions: planning, execution and token sealing

mod checksum;
mod descriptor;
mod executor;
mod source;

pub use checksum::{seal, unseal};
pub use descriptor::{Partition, PartitionId};
pub use executor::{CollectingSink, DiscardSink, PartitionExecutor, RowSink};
pub use source::{ListOptions, PartitionSource};
