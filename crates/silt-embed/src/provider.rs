use async_trait::async_trait;
use silt_core::{EmbeddingBatch, EmbeddingProvider, EmbeddingProviderInfo, SiltError, SiltResult};

use crate::local::{find_best_embedding_model, LocalEmbeddingClient};
use crate::remote::RemoteEmbeddingClient;

/// Tries the local model server first (when `prefer_local` and a suitable
/// model is available), falling back to the remote API.
pub struct CompositeEmbeddingProvider {
    prefer_local: bool,
    local_model_preference: String,
    local: LocalEmbeddingClient,
    remote: Option<RemoteEmbeddingClient>,
}

impl CompositeEmbeddingProvider {
    pub fn new(prefer_local: bool, local_model_preference: impl Into<String>) -> Self {
        Self {
            prefer_local,
            local_model_preference: local_model_preference.into(),
            local: LocalEmbeddingClient::default_local(),
            remote: None,
        }
    }

    pub fn with_local_client(mut self, client: LocalEmbeddingClient) -> Self {
        self.local = client;
        self
    }

    pub fn with_remote(mut self, remote: RemoteEmbeddingClient) -> Self {
        self.remote = Some(remote);
        self
    }

    async fn try_local(&self, texts: &[String]) -> Option<EmbeddingBatch> {
        let available = self.local.list_models().await;
        let model = find_best_embedding_model(&available, &self.local_model_preference)?;
        match self.local.embed(&model, texts).await {
            Ok(vectors) => Some(EmbeddingBatch {
                vectors,
                model_used: model,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "local embedding generation failed");
                None
            }
        }
    }

    async fn try_remote(&self, texts: &[String]) -> SiltResult<EmbeddingBatch> {
        let remote = self.remote.as_ref().ok_or(SiltError::NoProviderAvailable)?;
        let vectors = remote.embed(texts).await.map_err(SiltError::from)?;
        Ok(EmbeddingBatch {
            vectors,
            model_used: remote.model().to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for CompositeEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> SiltResult<EmbeddingBatch> {
        if texts.is_empty() {
            return Err(SiltError::InvalidInput("no texts provided for embedding".into()));
        }

        if self.prefer_local {
            tracing::debug!("attempting local embedding generation");
            if let Some(batch) = self.try_local(texts).await {
                tracing::info!(model = %batch.model_used, "local embeddings generated");
                return Ok(batch);
            }
            tracing::warn!("local embedding unavailable, falling back to remote");
        }

        self.try_remote(texts).await
    }

    fn info(&self) -> EmbeddingProviderInfo {
        EmbeddingProviderInfo {
            prefer_local: self.prefer_local,
            local_model: self.local_model_preference.clone(),
            remote_model: self
                .remote
                .as_ref()
                .map(|r| r.model().to_string())
                .unwrap_or_default(),
            local_available: false,
            remote_configured: self.remote.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_rejects_empty_input() {
        let provider = CompositeEmbeddingProvider::new(true, "nomic-embed-text");
        let err = provider.embed(&[]).await.unwrap_err();
        assert!(matches!(err, SiltError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn embed_without_any_provider_fails() {
        // prefer_local=true with an unreachable local server and no remote
        // configured should surface NoProviderAvailable rather than panic.
        let provider = CompositeEmbeddingProvider::new(true, "nomic-embed-text")
            .with_local_client(LocalEmbeddingClient::new("http://127.0.0.1:1"));
        let err = provider
            .embed(&["hello".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, SiltError::NoProviderAvailable));
    }

    #[tokio::test]
    async fn falls_back_to_remote_when_local_has_no_suitable_model() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let local_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{"name": "llama3"}],
            })))
            .mount(&local_server)
            .await;

        let remote_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.5, 0.5]}],
            })))
            .mount(&remote_server)
            .await;

        let provider = CompositeEmbeddingProvider::new(true, "nomic-embed-text")
            .with_local_client(LocalEmbeddingClient::new(local_server.uri()))
            .with_remote(
                RemoteEmbeddingClient::new("sk-test", "text-embedding-3-small")
                    .with_base_url(remote_server.uri()),
            );

        let batch = provider.embed(&["hello".to_string()]).await.unwrap();
        assert_eq!(batch.model_used, "text-embedding-3-small");
        assert_eq!(batch.vectors, vec![vec![0.5, 0.5]]);
    }
}
