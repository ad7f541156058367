//! Builds the document id and merged metadata the worker pool hands to the
//! vector-sink processor once a `FileProcess` item's `store_in_vector_db`
//! flag is set.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde_json::Value;
use silt_core::{ProcessorKind, QueueItem, QueuePayload};

/// `"{file_stem}_{task}_{epoch}"` when the item carries a file path,
/// `"content_{task}_{epoch}"` otherwise.
pub fn derive_document_id(item: &QueueItem) -> String {
    let epoch = Utc::now().timestamp();
    match &item.payload {
        QueuePayload::FilePath(path) => {
            let stem = Path::new(path)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("document");
            format!("{stem}_{}_{epoch}", item.task)
        }
        _ => format!("content_{}_{epoch}", item.task),
    }
}

/// Metadata merged onto the sidecar `store` call: source file, original
/// task, processor kind, processed-at, auto-generated flag, and whatever
/// metadata the watched directory attached to the item.
pub fn build_sidecar_metadata(item: &QueueItem, processor_kind: ProcessorKind) -> BTreeMap<String, Value> {
    let mut metadata = BTreeMap::new();
    if let QueuePayload::FilePath(path) = &item.payload {
        metadata.insert("source_file".to_string(), Value::from(path.clone()));
    }
    metadata.insert("original_task".to_string(), Value::from(item.task.clone()));
    metadata.insert(
        "processor_kind".to_string(),
        Value::from(format!("{processor_kind:?}")),
    );
    metadata.insert(
        "processed_at".to_string(),
        Value::from(Utc::now().to_rfc3339()),
    );
    metadata.insert(
        "auto_generated".to_string(),
        item.metadata
            .get("auto_generated")
            .cloned()
            .unwrap_or(Value::Bool(false)),
    );
    if let Some(dir) = item.metadata.get("watched_directory") {
        metadata.insert("watched_directory".to_string(), dir.clone());
    }
    metadata
}
