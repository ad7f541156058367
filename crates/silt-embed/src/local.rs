use serde::Deserialize;

use crate::error::EmbedError;

/// Client for a local Ollama-compatible embedding server.
pub struct LocalEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

impl LocalEmbeddingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn default_local() -> Self {
        Self::new("http://localhost:11434")
    }

    /// Names of models the local server currently has available. Failures
    /// (server down, unreachable) are treated as "no models", matching the
    /// original's best-effort probing.
    pub async fn list_models(&self) -> Vec<String> {
        let url = format!("{}/api/tags", self.base_url);
        match self.http.get(&url).send().await {
            Ok(resp) => match resp.json::<ListModelsResponse>().await {
                Ok(parsed) => parsed.models.into_iter().map(|m| m.name).collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "could not parse local model list");
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "could not reach local embedding server");
                Vec::new()
            }
        }
    }

    pub async fn embed_one(&self, model: &str, text: &str) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "model": model, "prompt": text }))
            .send()
            .await
            .map_err(|source| EmbedError::Transport {
                provider: "local",
                source,
            })?;

        if !resp.status().is_success() {
            return Err(EmbedError::BadResponse {
                provider: "local",
                detail: format!("status {}", resp.status()),
            });
        }

        let parsed: EmbeddingsResponse =
            resp.json().await.map_err(|source| EmbedError::Transport {
                provider: "local",
                source,
            })?;
        Ok(parsed.embedding)
    }

    pub async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_one(model, text).await?);
        }
        Ok(out)
    }
}

/// Preference order mirroring the upstream embedding service: these named
/// models win if present, otherwise anything whose name mentions "embed".
pub fn find_best_embedding_model(available: &[String], preferred: &str) -> Option<String> {
    let preference_order = [
        preferred,
        "nomic-embed-text",
        "nomic-embed-text:latest",
        "mxbai-embed-large",
        "mxbai-embed-large:latest",
        "all-minilm",
        "all-minilm:latest",
    ];
    for candidate in preference_order {
        if available.iter().any(|m| m == candidate) {
            return Some(candidate.to_string());
        }
    }
    available
        .iter()
        .find(|m| {
            let lower = m.to_lowercase();
            lower.contains("embed") || lower.contains("embedding")
        })
        .cloned()
}
