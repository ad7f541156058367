use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default priority assigned to items synthesised by the file watcher.
pub const WATCH_PRIORITY: i32 = 3;

/// Default priority for items without an explicit override.
pub const DEFAULT_PRIORITY: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemKind {
    FileProcess,
    VectorStore,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub enum ProcessorKind {
    LocalLlm,
    RemoteLlm,
    Vector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// The payload a `QueueItem` carries: exactly one of a file path, inline
/// content, or (for `Batch` items) a list of file paths to expand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueuePayload {
    FilePath(String),
    Content(String),
    Batch(Vec<String>),
}

/// A unit of work flowing from the watcher through the queue to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub kind: QueueItemKind,
    pub payload: QueuePayload,
    pub task: String,
    pub processor_kind: ProcessorKind,
    pub metadata: BTreeMap<String, Value>,
    pub priority: i32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: QueueItemStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_content: Option<String>,
    pub result_metadata: Option<BTreeMap<String, Value>>,
    pub error: Option<String>,
}

impl QueueItem {
    pub fn new(
        kind: QueueItemKind,
        payload: QueuePayload,
        task: impl Into<String>,
        processor_kind: ProcessorKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            task: task.into(),
            processor_kind,
            metadata: BTreeMap::new(),
            priority: DEFAULT_PRIORITY,
            retry_count: 0,
            max_retries: 3,
            status: QueueItemStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result_content: None,
            result_metadata: None,
            error: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether `metadata["store_in_vector_db"]` is present and truthy.
    pub fn wants_vector_storage(&self) -> bool {
        self.metadata
            .get("store_in_vector_db")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// `completed_at - started_at`, when both are set.
    pub fn processing_time(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(s), Some(c)) => Some(c - s),
            _ => None,
        }
    }

    /// First 100 bytes of the queue item's textual content, for logging.
    pub fn content_preview(&self) -> String {
        let raw = match &self.payload {
            QueuePayload::FilePath(p) => p.clone(),
            QueuePayload::Content(c) => c.clone(),
            QueuePayload::Batch(paths) => paths.join(", "),
        };
        if raw.len() > 100 {
            let mut end = 100;
            while !raw.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}…", &raw[..end])
        } else {
            raw
        }
    }
}
