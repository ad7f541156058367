use serde::Serialize;
use silt_queue::QueueSummary;

/// Aggregate, read-only snapshot of the running pipeline: how much work is
/// queued, how many workers are active, and the queue's lifetime counters.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub queue: QueueSummary,
    pub active_workers: usize,
    pub max_workers: usize,
}
