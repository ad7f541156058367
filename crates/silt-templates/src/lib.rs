//! File-backed registry of [`PromptTemplate`]s: create/update/render,
//! category and tag filtering, and export/import.

mod error;
mod manager;

pub use error::TemplateError;
pub use manager::{ExportPayload, ListFilter, PromptTemplateManager, SortKey};

pub use silt_core::{PromptTemplate, TemplateCategory, TemplateVariable};
