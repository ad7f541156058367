use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Core(#[from] silt_core::SiltError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
