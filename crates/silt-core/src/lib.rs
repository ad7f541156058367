//! Shared types and contracts for the silt ingestion pipeline.
//!
//! This crate hosts the data model (`Document`, `QueueItem`, `PromptTemplate`,
//! `WatchedDirectory`, `MonitorConfig`) and the trait objects every other
//! crate in the workspace programs against (`EmbeddingProvider`, `VectorStore`,
//! `Processor`). Keeping them here avoids a dependency cycle between the
//! crates that produce work (`silt-watch`), the crates that consume it
//! (`silt-queue`, `silt-pipeline`), and the crates that do the actual AI/IO
//! work (`silt-embed`, `silt-vector`, `silt-processors`).

pub mod config;
pub mod document;
pub mod error;
pub mod queue_item;
pub mod template;
pub mod traits;

pub use config::{MonitorConfig, MonitorConfigSummary, WatchedDirectory};
pub use document::{Document, SearchResult};
pub use error::{SiltError, SiltResult};
pub use queue_item::{
    ProcessorKind, QueueItem, QueueItemKind, QueueItemStatus, QueuePayload, DEFAULT_PRIORITY,
    WATCH_PRIORITY,
};
pub use template::{ModelOverrides, PromptTemplate, TemplateCategory, TemplateVariable};
pub use traits::{
    EmbeddingBatch, EmbeddingProvider, EmbeddingProviderInfo, Processor, ProcessorOptions,
    ProcessorOutcome, VectorStore, VectorStoreStats,
};
