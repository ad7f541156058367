use serde::Deserialize;

use crate::error::EmbedError;

/// Client for an OpenAI-compatible embeddings API.
pub struct RemoteEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
}

impl RemoteEmbeddingClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = format!("{}/embeddings", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|source| EmbedError::Transport {
                provider: "remote",
                source,
            })?;

        if !resp.status().is_success() {
            return Err(EmbedError::BadResponse {
                provider: "remote",
                detail: format!("status {}", resp.status()),
            });
        }

        let parsed: EmbeddingsResponse =
            resp.json().await.map_err(|source| EmbedError::Transport {
                provider: "remote",
                source,
            })?;
        Ok(parsed.data.into_iter().map(|e| e.embedding).collect())
    }
}
