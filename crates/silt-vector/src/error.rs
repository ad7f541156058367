use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("lancedb error: {0}")]
    Lance(#[from] lancedb::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Embedding(#[from] silt_core::SiltError),

    #[error("metadata serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<VectorError> for silt_core::SiltError {
    fn from(err: VectorError) -> Self {
        match err {
            VectorError::NotFound(id) => silt_core::SiltError::NotFound(id),
            VectorError::DimensionMismatch { expected, actual } => {
                silt_core::SiltError::DimensionMismatch { expected, actual }
            }
            VectorError::Embedding(inner) => inner,
            other => silt_core::SiltError::StorageIo(other.to_string()),
        }
    }
}
