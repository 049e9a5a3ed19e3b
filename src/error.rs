use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocusError {
    // Storage errors
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("storage error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("storage path error: {0}")]
    StoragePath(#[from] object_store::path::Error),

    // Serialization errors
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Partition errors
    #[error("partition checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u64, actual: u64 },

    #[error("partition write failed for {partition}: {reason}")]
    PartitionWriteFailure { partition: String, reason: String },

    // Project errors
    #[error("project not found: {project}")]
    ProjectNotFound { project: String },

    #[error("project already exists: {project}")]
    ProjectAlreadyExists { project: String },

    #[error("variant not found in project {project}: {variant_id}")]
    VariantNotFound { project: String, variant_id: String },

    // Ingestion errors
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    // Filter errors
    #[error("invalid filter: {reason}")]
    InvalidFilter { reason: String },

    #[error("filter too complex: depth {depth} exceeds maximum of {max}")]
    FilterTooComplex { depth: usize, max: usize },

    // Index errors
    #[error("index error: {0}")]
    Index(String),

    // Validation errors
    #[error("validation error: {0}")]
    Validation(String),

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    // IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, LocusError>;

impl LocusError {
    pub fn status_code(&self) -> u16 {
        match self {
            LocusError::NotFound { .. }
            | LocusError::ProjectNotFound { .. }
            | LocusError::VariantNotFound { .. } => 404,

            LocusError::ProjectAlreadyExists { .. } => 409,

            LocusError::InvalidFilter { .. }
            | LocusError::FilterTooComplex { .. }
            | LocusError::MalformedRecord(_)
            | LocusError::Validation(_) => 400,

            // Backend unreachability is retryable by the caller.
            LocusError::Unavailable(_) | LocusError::Storage(_) => 503,

            _ => 500,
        }
    }
}
