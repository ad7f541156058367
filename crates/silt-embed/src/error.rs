use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("no suitable embedding model available locally (tried: {tried:?})")]
    NoLocalModel { tried: Vec<String> },

    #[error("remote provider not configured (missing API key)")]
    RemoteNotConfigured,

    #[error("transport error talking to {provider}: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned an error response: {detail}")]
    BadResponse { provider: &'static str, detail: String },

    #[error("no texts provided for embedding")]
    EmptyInput,
}

impl From<EmbedError> for silt_core::SiltError {
    fn from(err: EmbedError) -> Self {
        match err {
            EmbedError::NoLocalModel { .. } => silt_core::SiltError::NoProviderAvailable,
            EmbedError::RemoteNotConfigured => silt_core::SiltError::NoProviderAvailable,
            EmbedError::Transport { .. } => silt_core::SiltError::ProviderTransport(err.to_string()),
            EmbedError::BadResponse { .. } => silt_core::SiltError::EmbeddingFailure(err.to_string()),
            EmbedError::EmptyInput => silt_core::SiltError::InvalidInput(err.to_string()),
        }
    }
}
