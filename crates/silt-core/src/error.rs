use thiserror::Error;

/// Stable error taxonomy shared by every component in the pipeline.
///
/// Each variant maps onto one row of the error-handling design: the queue
/// and the worker pool decide retry policy purely by matching on these
/// variants, never by inspecting a formatted message.
#[derive(Debug, Error)]
pub enum SiltError {
    #[error("configuration invalid: {0:?}")]
    ConfigInvalid(Vec<String>),

    #[error("queue is full")]
    QueueFull,

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("provider transport error: {0}")]
    ProviderTransport(String),

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("embedding generation failed: {0}")]
    EmbeddingFailure(String),

    #[error("no embedding provider available")]
    NoProviderAvailable,

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("storage I/O error: {0}")]
    StorageIo(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("item cancelled")]
    Cancelled,

    #[error("missing required template variable: {0}")]
    MissingVariable(String),

    #[error("template references undeclared placeholder: {0}")]
    UnknownPlaceholder(String),

    #[error("template variable validation failed for {name}: value {value:?} does not match pattern {pattern}")]
    VariableValidation {
        name: String,
        value: String,
        pattern: String,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SiltError {
    /// Whether the worker pool should reinsert the owning item for another
    /// attempt rather than moving it straight to the failed bucket.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SiltError::Timeout(_)
                | SiltError::ProviderTransport(_)
                | SiltError::RateLimited { .. }
                | SiltError::StorageIo(_)
        )
    }
}

pub type SiltResult<T> = std::result::Result<T, SiltError>;
