use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use silt_core::{Processor, ProcessorOptions, ProcessorOutcome, SiltError, SiltResult, VectorStore};

use crate::VECTOR_TASKS;

/// Maps the `{store, search, retrieve, delete, list, stats}` task set onto
/// [`VectorStore`] operations.
pub struct VectorProcessor {
    store: Arc<dyn VectorStore>,
}

impl VectorProcessor {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Processor for VectorProcessor {
    async fn process(
        &self,
        content: &str,
        task: &str,
        opts: &ProcessorOptions,
    ) -> SiltResult<ProcessorOutcome> {
        match task {
            "store" => {
                if content.trim().is_empty() {
                    return Err(SiltError::InvalidInput("content must not be empty".into()));
                }
                let mut metadata = opts.extra.clone();
                if let Some(path) = opts.extra.get("file_path").cloned() {
                    metadata.insert("file_path".to_string(), path);
                }
                let id = opts
                    .extra
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let doc = self.store.add(content, metadata, id).await?;
                let mut result_meta = BTreeMap::new();
                result_meta.insert("document_id".to_string(), json!(doc.id));
                result_meta.insert(
                    "embedding_model".to_string(),
                    doc.metadata
                        .get("embedding_model")
                        .cloned()
                        .unwrap_or(Value::Null),
                );
                Ok(ProcessorOutcome {
                    content: doc.content,
                    metadata: result_meta,
                })
            }
            "search" => {
                let k = opts
                    .extra
                    .get("k")
                    .and_then(Value::as_u64)
                    .unwrap_or(5) as usize;
                let filter = opts
                    .extra
                    .get("metadata_filter")
                    .and_then(Value::as_object)
                    .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
                let results = self.store.query(content, k, filter).await?;
                let mut metadata = BTreeMap::new();
                metadata.insert("total_results".to_string(), json!(results.len()));
                metadata.insert("results".to_string(), json!(results));
                Ok(ProcessorOutcome {
                    content: String::new(),
                    metadata,
                })
            }
            "retrieve" => {
                let doc = self.store.get(content).await?;
                let mut metadata = BTreeMap::new();
                metadata.insert("document".to_string(), json!(doc));
                Ok(ProcessorOutcome {
                    content: doc.content.clone(),
                    metadata,
                })
            }
            "delete" => {
                self.store.delete(content).await?;
                let mut metadata = BTreeMap::new();
                metadata.insert("deleted_id".to_string(), json!(content));
                Ok(ProcessorOutcome {
                    content: String::new(),
                    metadata,
                })
            }
            "list" => {
                let limit = opts
                    .extra
                    .get("limit")
                    .and_then(Value::as_u64)
                    .unwrap_or(100) as usize;
                let docs = self.store.list(limit).await?;
                let mut metadata = BTreeMap::new();
                metadata.insert("total_count".to_string(), json!(docs.len()));
                metadata.insert("documents".to_string(), json!(docs));
                Ok(ProcessorOutcome {
                    content: String::new(),
                    metadata,
                })
            }
            "stats" => {
                let stats = self.store.stats().await?;
                let mut metadata = BTreeMap::new();
                metadata.insert("stats".to_string(), json!(stats));
                Ok(ProcessorOutcome {
                    content: String::new(),
                    metadata,
                })
            }
            other => Err(SiltError::UnknownTask(other.to_string())),
        }
    }

    fn supported_tasks(&self) -> &[&str] {
        VECTOR_TASKS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silt_core::{Document, EmbeddingProviderInfo, SearchResult, VectorStoreStats};
    use tokio::sync::Mutex;

    /// In-memory `VectorStore` stub, keyed by id, for exercising task dispatch
    /// without a real embedding model or database.
    struct MemoryStore {
        docs: Mutex<BTreeMap<String, Document>>,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                docs: Mutex::new(BTreeMap::new()),
            }
        }
    }

    #[async_trait]
    impl VectorStore for MemoryStore {
        async fn add(
            &self,
            content: &str,
            metadata: BTreeMap<String, Value>,
            id: Option<String>,
        ) -> SiltResult<Document> {
            let id = id.unwrap_or_else(|| "generated-id".to_string());
            let doc = Document {
                id: id.clone(),
                content: content.to_string(),
                metadata,
                embedding: None,
            };
            self.docs.lock().await.insert(id, doc.clone());
            Ok(doc)
        }

        async fn query(
            &self,
            _query_text: &str,
            k: usize,
            _metadata_filter: Option<BTreeMap<String, Value>>,
        ) -> SiltResult<Vec<SearchResult>> {
            let docs = self.docs.lock().await;
            Ok(docs
                .values()
                .take(k)
                .enumerate()
                .map(|(i, doc)| SearchResult {
                    document: doc.clone(),
                    similarity: 1.0,
                    rank: i + 1,
                })
                .collect())
        }

        async fn get(&self, id: &str) -> SiltResult<Document> {
            self.docs
                .lock()
                .await
                .get(id)
                .cloned()
                .ok_or_else(|| SiltError::NotFound(id.to_string()))
        }

        async fn delete(&self, id: &str) -> SiltResult<()> {
            self.docs
                .lock()
                .await
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| SiltError::NotFound(id.to_string()))
        }

        async fn list(&self, limit: usize) -> SiltResult<Vec<Document>> {
            Ok(self.docs.lock().await.values().take(limit).cloned().collect())
        }

        async fn stats(&self) -> SiltResult<VectorStoreStats> {
            Ok(VectorStoreStats {
                collection: "memory".to_string(),
                count: self.docs.lock().await.len(),
                path: ":memory:".to_string(),
                embedding_info: EmbeddingProviderInfo {
                    prefer_local: true,
                    local_model: "stub".to_string(),
                    remote_model: String::new(),
                    local_available: true,
                    remote_configured: false,
                },
            })
        }
    }

    fn processor() -> VectorProcessor {
        VectorProcessor::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn store_then_retrieve_round_trips() {
        let p = processor();
        let stored = p
            .process("hello", "store", &ProcessorOptions::default())
            .await
            .unwrap();
        let id = stored
            .metadata
            .get("document_id")
            .and_then(Value::as_str)
            .unwrap()
            .to_string();

        let retrieved = p.process(&id, "retrieve", &ProcessorOptions::default()).await.unwrap();
        assert_eq!(retrieved.content, "hello");
    }

    #[tokio::test]
    async fn store_rejects_empty_content() {
        let p = processor();
        let err = p
            .process("", "store", &ProcessorOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SiltError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn delete_then_retrieve_is_not_found() {
        let p = processor();
        let stored = p
            .process("to remove", "store", &ProcessorOptions::default())
            .await
            .unwrap();
        let id = stored
            .metadata
            .get("document_id")
            .and_then(Value::as_str)
            .unwrap()
            .to_string();

        p.process(&id, "delete", &ProcessorOptions::default())
            .await
            .unwrap();
        let err = p
            .process(&id, "retrieve", &ProcessorOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SiltError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_and_stats_reflect_stored_documents() {
        let p = processor();
        p.process("one", "store", &ProcessorOptions::default()).await.unwrap();
        p.process("two", "store", &ProcessorOptions::default()).await.unwrap();

        let listed = p.process("", "list", &ProcessorOptions::default()).await.unwrap();
        assert_eq!(listed.metadata.get("total_count"), Some(&json!(2)));

        let stats = p.process("", "stats", &ProcessorOptions::default()).await.unwrap();
        assert_eq!(stats.metadata["stats"]["count"], json!(2));
    }

    #[tokio::test]
    async fn unknown_task_is_rejected() {
        let p = processor();
        let err = p
            .process("x", "translate", &ProcessorOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SiltError::UnknownTask(t) if t == "translate"));
    }
}
