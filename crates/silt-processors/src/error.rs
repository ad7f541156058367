use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("authentication failed: {0}")]
    AuthFailure(String),

    #[error("rate limited")]
    RateLimited,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),
}

impl From<ProcessorError> for silt_core::SiltError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::UnknownTask(t) => silt_core::SiltError::UnknownTask(t),
            ProcessorError::InvalidInput(i) => silt_core::SiltError::InvalidInput(i),
            ProcessorError::AuthFailure(a) => silt_core::SiltError::AuthFailure(a),
            ProcessorError::RateLimited => silt_core::SiltError::RateLimited {
                retry_after_secs: None,
            },
            ProcessorError::Transport(e) => silt_core::SiltError::ProviderTransport(e.to_string()),
            ProcessorError::BadRequest(b) => silt_core::SiltError::InvalidInput(b),
            ProcessorError::ModelNotFound(m) => {
                silt_core::SiltError::InvalidInput(format!("model not found: {m}"))
            }
        }
    }
}
