//! Embedding providers: a local HTTP model server tried first, a remote API
//! used as fallback.

mod error;
mod local;
mod provider;
mod remote;

pub use error::EmbedError;
pub use local::LocalEmbeddingClient;
pub use provider::CompositeEmbeddingProvider;
pub use remote::RemoteEmbeddingClient;
