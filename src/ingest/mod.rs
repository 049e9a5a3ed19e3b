pub mod normalize;
pub mod pipeline;

pub use normalize::{normalize_record, RawConsequence, RawRecord};
pub use pipeline::{ingest_batch, IngestReport};
