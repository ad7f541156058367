//! Priority-ordered, size-capped processing queue with status buckets and
//! retry policy.

mod queue;

pub use queue::{ProcessingQueue, QueueSummary};
