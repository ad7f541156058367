use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template not found: {0}")]
    NotFound(String),

    #[error("template with name {0:?} already exists")]
    DuplicateName(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] silt_core::SiltError),
}

impl From<TemplateError> for silt_core::SiltError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::NotFound(id) => silt_core::SiltError::NotFound(id),
            TemplateError::Core(inner) => inner,
            other => silt_core::SiltError::StorageIo(other.to_string()),
        }
    }
}
