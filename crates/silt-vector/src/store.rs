use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use serde_json::Value;
use silt_core::{
    Document, EmbeddingProvider, SearchResult, SiltError, SiltResult, VectorStore,
    VectorStoreStats,
};
use uuid::Uuid;

use crate::error::VectorError;
use crate::schema::document_schema;

/// LanceDB-backed implementation of [`VectorStore`].
///
/// The collection's vector dimension is fixed by the first successful
/// `add`; later writes with a differing embedding length are rejected
/// rather than silently truncated or padded.
pub struct LanceVectorStore {
    connection: lancedb::Connection,
    table: tokio::sync::RwLock<Option<lancedb::Table>>,
    collection_name: String,
    db_path: String,
    dim: AtomicUsize,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl LanceVectorStore {
    pub async fn connect(
        db_path: &str,
        collection_name: &str,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, VectorError> {
        let connection = lancedb::connect(db_path).execute().await?;
        let store = Self {
            connection,
            table: tokio::sync::RwLock::new(None),
            collection_name: collection_name.to_string(),
            db_path: db_path.to_string(),
            dim: AtomicUsize::new(0),
            embedder,
        };

        if let Ok(table) = store.connection.open_table(&store.collection_name).execute().await {
            if let Some(dim) = table_vector_dim(&table).await {
                store.dim.store(dim, Ordering::SeqCst);
            }
            *store.table.write().await = Some(table);
        }
        Ok(store)
    }

    async fn ensure_table(&self, dim: usize) -> Result<(), VectorError> {
        let mut guard = self.table.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let schema = document_schema(dim as i32);
        let empty_batches = RecordBatchIterator::new(
            vec![Ok(RecordBatch::new_empty(schema.clone()))],
            schema.clone(),
        );
        let table = self
            .connection
            .create_table(&self.collection_name, Box::new(empty_batches))
            .execute()
            .await?;
        self.dim.store(dim, Ordering::SeqCst);
        *guard = Some(table);
        Ok(())
    }

    fn checked_dim(&self, actual: usize) -> Result<(), VectorError> {
        let expected = self.dim.load(Ordering::SeqCst);
        if expected != 0 && expected != actual {
            return Err(VectorError::DimensionMismatch { expected, actual });
        }
        Ok(())
    }

    fn row_to_document(batch: &RecordBatch, row: usize) -> Document {
        let id = column_str(batch, "id", row);
        let content = column_str(batch, "content", row);
        let metadata: BTreeMap<String, Value> = batch
            .column_by_name("metadata")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .map(|arr| arr.value(row))
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        let embedding = batch
            .column_by_name("embedding")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .map(|arr| {
                let values = arr.value(row);
                let floats = values.as_any().downcast_ref::<Float32Array>().unwrap();
                floats.values().to_vec()
            });

        Document {
            id,
            content,
            metadata,
            embedding,
        }
    }
}

fn column_str(batch: &RecordBatch, name: &str, row: usize) -> String {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .map(|arr| arr.value(row).to_string())
        .unwrap_or_default()
}

async fn table_vector_dim(table: &lancedb::Table) -> Option<usize> {
    let schema = table.schema().await.ok()?;
    let field = schema.field_with_name("embedding").ok()?;
    match field.data_type() {
        arrow_schema::DataType::FixedSizeList(_, len) => Some(*len as usize),
        _ => None,
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn add(
        &self,
        content: &str,
        mut metadata: BTreeMap<String, Value>,
        id: Option<String>,
    ) -> SiltResult<Document> {
        if content.is_empty() {
            return Err(SiltError::InvalidInput("content must not be empty".into()));
        }
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let batch = self
            .embedder
            .embed(std::slice::from_ref(&content.to_string()))
            .await?;
        let embedding = batch.vectors.into_iter().next().ok_or_else(|| {
            SiltError::EmbeddingFailure("embedding provider returned no vectors".into())
        })?;

        self.checked_dim(embedding.len())
            .map_err(silt_core::SiltError::from)?;
        self.ensure_table(embedding.len())
            .await
            .map_err(silt_core::SiltError::from)?;

        metadata.insert("content_length".to_string(), Value::from(content.len()));
        metadata.insert(
            "embedding_model".to_string(),
            Value::from(batch.model_used.clone()),
        );
        let created_at = Utc::now();
        metadata.insert(
            "created_at".to_string(),
            Value::from(created_at.timestamp()),
        );

        // Upsert: remove any existing row with this id, then append the new one.
        {
            let guard = self.table.read().await;
            let table = guard.as_ref().expect("ensured above");
            let _ = table
                .delete(&format!("id = '{}'", id.replace('\'', "''")))
                .await;
        }

        let schema = document_schema(embedding.len() as i32);
        let metadata_json = serde_json::to_string(&metadata)?;
        let batch_row = build_single_row_batch(
            schema.clone(),
            &id,
            content,
            &metadata_json,
            created_at.timestamp(),
            &embedding,
        )
        .map_err(|e| SiltError::StorageIo(e.to_string()))?;

        {
            let guard = self.table.read().await;
            let table = guard.as_ref().expect("ensured above");
            let reader = RecordBatchIterator::new(vec![Ok(batch_row)], schema);
            table
                .add(Box::new(reader))
                .execute()
                .await
                .map_err(|e| SiltError::StorageIo(e.to_string()))?;
        }

        Ok(Document {
            id,
            content: content.to_string(),
            metadata,
            embedding: Some(embedding),
        })
    }

    async fn query(
        &self,
        query_text: &str,
        k: usize,
        metadata_filter: Option<BTreeMap<String, Value>>,
    ) -> SiltResult<Vec<SearchResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let guard = self.table.read().await;
        let Some(table) = guard.as_ref() else {
            return Ok(Vec::new());
        };

        let query_embedding = self.embedder.embed_one(query_text).await?;
        // When a metadata filter is present the candidate pool has to be wider
        // than `k`: filtering happens in memory below (metadata is an opaque
        // JSON blob LanceDB can't push a predicate into), so asking the
        // nearest-neighbour scan for only `k` rows could silently return
        // fewer than `k` matches even when more exist further down the
        // ranking. Scan the whole table in that case; `k` still bounds the
        // final result length.
        let scan_limit = if metadata_filter.is_some() {
            table
                .count_rows(None)
                .await
                .map_err(|e| SiltError::StorageIo(e.to_string()))?
                .max(k)
        } else {
            k
        };
        // Metadata is stored as an opaque JSON blob, so there is no SQL
        // predicate to push into `only_if` for it; the filter is applied
        // in memory below, row by row, instead.
        let query = table
            .query()
            .nearest_to(query_embedding.as_slice())
            .map_err(|e| SiltError::StorageIo(e.to_string()))?
            .limit(scan_limit);

        let mut stream = query
            .execute()
            .await
            .map_err(|e| SiltError::StorageIo(e.to_string()))?;

        let mut results = Vec::new();
        let mut rank = 1usize;
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| SiltError::StorageIo(e.to_string()))?
        {
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .cloned();
            for row in 0..batch.num_rows() {
                let document = Self::row_to_document(&batch, row);
                if let Some(filter) = &metadata_filter {
                    if !matches_filter(&document.metadata, filter) {
                        continue;
                    }
                }
                let distance = distances.as_ref().map(|d| d.value(row)).unwrap_or(0.0);
                let similarity = 1.0 / (1.0 + distance);
                results.push(SearchResult {
                    document,
                    similarity,
                    rank,
                });
                rank += 1;
                if results.len() >= k {
                    break;
                }
            }
        }
        Ok(results)
    }

    async fn get(&self, id: &str) -> SiltResult<Document> {
        let guard = self.table.read().await;
        let Some(table) = guard.as_ref() else {
            return Err(SiltError::NotFound(id.to_string()));
        };
        let mut stream = table
            .query()
            .only_if(format!("id = '{}'", id.replace('\'', "''")))
            .limit(1)
            .execute()
            .await
            .map_err(|e| SiltError::StorageIo(e.to_string()))?;

        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| SiltError::StorageIo(e.to_string()))?
        {
            if batch.num_rows() > 0 {
                return Ok(Self::row_to_document(&batch, 0));
            }
        }
        Err(SiltError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> SiltResult<()> {
        let guard = self.table.read().await;
        let Some(table) = guard.as_ref() else {
            return Err(SiltError::NotFound(id.to_string()));
        };
        table
            .delete(&format!("id = '{}'", id.replace('\'', "''")))
            .await
            .map_err(|e| SiltError::StorageIo(e.to_string()))
    }

    async fn list(&self, limit: usize) -> SiltResult<Vec<Document>> {
        let guard = self.table.read().await;
        let Some(table) = guard.as_ref() else {
            return Ok(Vec::new());
        };
        let mut stream = table
            .query()
            .limit(limit)
            .execute()
            .await
            .map_err(|e| SiltError::StorageIo(e.to_string()))?;

        let mut docs = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| SiltError::StorageIo(e.to_string()))?
        {
            for row in 0..batch.num_rows() {
                docs.push(Self::row_to_document(&batch, row));
            }
        }
        Ok(docs)
    }

    async fn stats(&self) -> SiltResult<VectorStoreStats> {
        let guard = self.table.read().await;
        let count = match guard.as_ref() {
            Some(table) => table
                .count_rows(None)
                .await
                .map_err(|e| SiltError::StorageIo(e.to_string()))?,
            None => 0,
        };
        Ok(VectorStoreStats {
            collection: self.collection_name.clone(),
            count,
            path: self.db_path.clone(),
            embedding_info: self.embedder.info(),
        })
    }
}

fn matches_filter(metadata: &BTreeMap<String, Value>, filter: &BTreeMap<String, Value>) -> bool {
    filter.iter().all(|(k, v)| metadata.get(k) == Some(v))
}


fn build_single_row_batch(
    schema: Arc<arrow_schema::Schema>,
    id: &str,
    content: &str,
    metadata_json: &str,
    created_at: i64,
    embedding: &[f32],
) -> Result<RecordBatch, arrow_schema::ArrowError> {
    let id_array = StringArray::from(vec![id.to_string()]);
    let content_array = StringArray::from(vec![content.to_string()]);
    let metadata_array = StringArray::from(vec![metadata_json.to_string()]);
    let created_at_array = Int64Array::from(vec![created_at]);
    let embedding_array = FixedSizeListArray::from_iter_primitive::<
        arrow_array::types::Float32Type,
        _,
        _,
    >(
        vec![Some(embedding.iter().map(|v| Some(*v)).collect::<Vec<_>>())],
        embedding.len() as i32,
    );

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(id_array),
            Arc::new(content_array),
            Arc::new(metadata_array),
            Arc::new(created_at_array),
            Arc::new(embedding_array),
        ],
    )
}
