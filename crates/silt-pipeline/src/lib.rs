//! Worker pool and orchestration: wires the queue, processors, watcher, and
//! vector store into a single running pipeline.

mod status;
mod worker;

pub use status::PipelineStatus;
pub use worker::WorkerPool;
