use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::document::{Document, SearchResult};
use crate::error::SiltResult;

/// Text-to-vector contract. Implementations should try a local model first
/// and fall back to a remote one, reporting which model actually served the
/// request so callers can persist it alongside the resulting vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> SiltResult<EmbeddingBatch>;

    async fn embed_one(&self, text: &str) -> SiltResult<Vec<f32>> {
        let batch = self.embed(std::slice::from_ref(&text.to_string())).await?;
        batch
            .vectors
            .into_iter()
            .next()
            .ok_or_else(|| crate::error::SiltError::EmbeddingFailure("empty batch".into()))
    }

    /// Introspection surface used by `VectorStore::stats`.
    fn info(&self) -> EmbeddingProviderInfo;
}

#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    pub vectors: Vec<Vec<f32>>,
    pub model_used: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EmbeddingProviderInfo {
    pub prefer_local: bool,
    pub local_model: String,
    pub remote_model: String,
    pub local_available: bool,
    pub remote_configured: bool,
}

/// Persistent, queryable store of embedded documents.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(
        &self,
        content: &str,
        metadata: BTreeMap<String, Value>,
        id: Option<String>,
    ) -> SiltResult<Document>;

    async fn query(
        &self,
        query_text: &str,
        k: usize,
        metadata_filter: Option<BTreeMap<String, Value>>,
    ) -> SiltResult<Vec<SearchResult>>;

    async fn get(&self, id: &str) -> SiltResult<Document>;

    async fn delete(&self, id: &str) -> SiltResult<()>;

    async fn list(&self, limit: usize) -> SiltResult<Vec<Document>>;

    async fn stats(&self) -> SiltResult<VectorStoreStats>;
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct VectorStoreStats {
    pub collection: String,
    pub count: usize,
    pub path: String,
    pub embedding_info: EmbeddingProviderInfo,
}

/// Outcome of a single `Processor::process` call.
#[derive(Debug, Clone)]
pub struct ProcessorOutcome {
    pub content: String,
    pub metadata: BTreeMap<String, Value>,
}

/// Per-call options threaded from a rendered template / queue item into a
/// processor invocation.
#[derive(Debug, Clone, Default)]
pub struct ProcessorOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub extra: BTreeMap<String, Value>,
}

/// Uniform interface over the three processor variants: local LLM, remote
/// LLM, and vector-sink.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(
        &self,
        content: &str,
        task: &str,
        opts: &ProcessorOptions,
    ) -> SiltResult<ProcessorOutcome>;

    /// Tasks this processor declares support for; used to validate queue
    /// items before dispatch.
    fn supported_tasks(&self) -> &[&str];
}
