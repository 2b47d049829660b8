use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid coordinate: lat {lat}, lon {lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("Invalid radius: {0} km (must be a positive, finite value)")]
    InvalidRadius(f64),

    #[error("Invalid k: {k} (must be in 1..={candidate_pool})")]
    InvalidK { k: usize, candidate_pool: usize },

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Duplicate record id: {0}")]
    DuplicateId(u64),

    #[error("Index has not been built")]
    EmptyIndex,

    #[error("Corrupt ingestion record #{record}: {reason}")]
    IngestionRecordCorrupt { record: u64, reason: String },

    #[error("Unsupported projection: {0}")]
    UnsupportedProjection(String),

    #[error("Embedding failure: {0}")]
    EmbeddingFailure(String),

    #[error("Cannot fit a viewport over zero points")]
    EmptyPointSet,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors caused by the caller's arguments rather than the engine state.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidCoordinate { .. }
                | Error::InvalidRadius(_)
                | Error::InvalidK { .. }
                | Error::DimensionMismatch { .. }
                | Error::UnsupportedProjection(_)
                | Error::EmptyPointSet
                | Error::InvalidConfig(_)
        )
    }
}
