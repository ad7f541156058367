//! Processor implementations dispatched by the worker pool: local LLM,
//! remote LLM, and vector-sink.

mod error;
mod local_llm;
mod remote_llm;
mod vector_processor;

pub use error::ProcessorError;
pub use local_llm::LocalLlmProcessor;
pub use remote_llm::RemoteLlmProcessor;
pub use vector_processor::VectorProcessor;

pub(crate) const LLM_TASKS: &[&str] = &[
    "summarize",
    "enhance",
    "extract_insights",
    "questions",
    "classify",
];

pub(crate) const VECTOR_TASKS: &[&str] =
    &["store", "search", "retrieve", "delete", "list", "stats"];
