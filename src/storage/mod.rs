pub mod object;
pub mod partition;

pub use object::LocusStore;
pub use partition::PartitionBlob;
