use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use silt_core::{QueueItem, QueueItemStatus, SiltError, SiltResult};
use uuid::Uuid;

struct Inner {
    pending: VecDeque<QueueItem>,
    processing: HashMap<Uuid, QueueItem>,
    completed: HashMap<Uuid, QueueItem>,
    failed: HashMap<Uuid, QueueItem>,
    cancelled: HashMap<Uuid, QueueItem>,
    cancel_requested: HashSet<Uuid>,
    total_processed: u64,
    total_failed: u64,
}

/// Priority-ordered in-memory queue: four disjoint status buckets plus
/// monotonic lifetime counters, all mutated under a single lock.
pub struct ProcessingQueue {
    max_size: usize,
    inner: Mutex<Inner>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSummary {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_processed: u64,
    pub total_failed: u64,
    pub success_rate: f64,
}

impl ProcessingQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            inner: Mutex::new(Inner {
                pending: VecDeque::new(),
                processing: HashMap::new(),
                completed: HashMap::new(),
                failed: HashMap::new(),
                cancelled: HashMap::new(),
                cancel_requested: HashSet::new(),
                total_processed: 0,
                total_failed: 0,
            }),
        }
    }

    /// Insert at the first position whose existing priority is strictly
    /// greater than the new item's, preserving FIFO among equal priorities.
    pub fn add(&self, item: QueueItem) -> SiltResult<()> {
        let mut inner = self.inner.lock();
        if inner.pending.len() >= self.max_size {
            tracing::warn!(max_size = self.max_size, "queue full, rejecting item");
            return Err(SiltError::QueueFull);
        }
        let pos = inner
            .pending
            .iter()
            .position(|existing| existing.priority > item.priority)
            .unwrap_or(inner.pending.len());
        inner.pending.insert(pos, item);
        Ok(())
    }

    pub fn next(&self) -> Option<QueueItem> {
        let mut inner = self.inner.lock();
        let mut item = inner.pending.pop_front()?;
        item.status = QueueItemStatus::Processing;
        item.started_at = Some(Utc::now());
        inner.processing.insert(item.id, item.clone());
        Some(item)
    }

    pub fn complete(&self, id: Uuid, content: String, metadata: std::collections::BTreeMap<String, serde_json::Value>) -> SiltResult<()> {
        let mut inner = self.inner.lock();
        let mut item = inner
            .processing
            .remove(&id)
            .ok_or_else(|| SiltError::NotFound(id.to_string()))?;
        item.status = QueueItemStatus::Completed;
        item.completed_at = Some(Utc::now());
        item.result_content = Some(content);
        item.result_metadata = Some(metadata);
        inner.total_processed += 1;
        inner.completed.insert(id, item);
        inner.cancel_requested.remove(&id);
        Ok(())
    }

    /// Retries if `retryable` and still under the limit (reinserted at the
    /// queue's head, preempting same-priority work already waiting);
    /// otherwise moves the item straight to the failed bucket. `retryable`
    /// should reflect the error kind per the taxonomy's policy column
    /// (`SiltError::is_retryable`) — non-transient errors (`FileNotFound`,
    /// `UnknownTask`, `InvalidInput`, `AuthFailure`, ...) must not be retried
    /// even if retry budget remains.
    pub fn fail(&self, id: Uuid, error: impl Into<String>, retryable: bool) -> SiltResult<()> {
        let mut inner = self.inner.lock();
        let mut item = inner
            .processing
            .remove(&id)
            .ok_or_else(|| SiltError::NotFound(id.to_string()))?;
        item.error = Some(error.into());
        inner.cancel_requested.remove(&id);

        if retryable && item.retry_count < item.max_retries {
            item.retry_count += 1;
            item.status = QueueItemStatus::Pending;
            item.started_at = None;
            tracing::debug!(id = %id, retry_count = item.retry_count, "requeueing item at head after failure");
            inner.pending.push_front(item);
        } else {
            item.status = QueueItemStatus::Failed;
            item.completed_at = Some(Utc::now());
            inner.total_failed += 1;
            tracing::warn!(id = %id, retry_count = item.retry_count, "item exhausted retries, moving to failed");
            inner.failed.insert(id, item);
        }
        Ok(())
    }

    /// Immediate for pending items; for a processing item, records a
    /// cooperative cancellation request the worker must observe.
    pub fn cancel(&self, id: Uuid) -> SiltResult<()> {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.pending.iter().position(|i| i.id == id) {
            let mut item = inner.pending.remove(pos).expect("position just found");
            item.status = QueueItemStatus::Cancelled;
            item.completed_at = Some(Utc::now());
            inner.cancelled.insert(id, item);
            return Ok(());
        }
        if inner.processing.contains_key(&id) {
            inner.cancel_requested.insert(id);
            return Ok(());
        }
        Err(SiltError::NotFound(id.to_string()))
    }

    pub fn is_cancel_requested(&self, id: Uuid) -> bool {
        self.inner.lock().cancel_requested.contains(&id)
    }

    /// Move a processing item that observed its own cancellation request
    /// into the cancelled bucket.
    pub fn finish_cancelled(&self, id: Uuid) -> SiltResult<()> {
        let mut inner = self.inner.lock();
        let mut item = inner
            .processing
            .remove(&id)
            .ok_or_else(|| SiltError::NotFound(id.to_string()))?;
        item.status = QueueItemStatus::Cancelled;
        item.completed_at = Some(Utc::now());
        inner.cancel_requested.remove(&id);
        inner.cancelled.insert(id, item);
        Ok(())
    }

    pub fn clear_completed(&self, max_age: Duration) {
        self.clear_bucket(max_age, |inner| &mut inner.completed);
    }

    pub fn clear_failed(&self, max_age: Duration) {
        self.clear_bucket(max_age, |inner| &mut inner.failed);
    }

    fn clear_bucket(
        &self,
        max_age: Duration,
        select: impl Fn(&mut Inner) -> &mut HashMap<Uuid, QueueItem>,
    ) {
        let cutoff = Utc::now() - max_age;
        let mut inner = self.inner.lock();
        let bucket = select(&mut inner);
        bucket.retain(|_, item| {
            item.completed_at
                .map(|c: DateTime<Utc>| c > cutoff)
                .unwrap_or(true)
        });
    }

    pub fn get(&self, id: Uuid) -> Option<QueueItem> {
        let inner = self.inner.lock();
        inner
            .pending
            .iter()
            .find(|i| i.id == id)
            .or_else(|| inner.processing.get(&id))
            .or_else(|| inner.completed.get(&id))
            .or_else(|| inner.failed.get(&id))
            .or_else(|| inner.cancelled.get(&id))
            .cloned()
    }

    pub fn by_status(&self, status: QueueItemStatus) -> Vec<QueueItem> {
        let inner = self.inner.lock();
        match status {
            QueueItemStatus::Pending => inner.pending.iter().cloned().collect(),
            QueueItemStatus::Processing => inner.processing.values().cloned().collect(),
            QueueItemStatus::Completed => inner.completed.values().cloned().collect(),
            QueueItemStatus::Failed => inner.failed.values().cloned().collect(),
            QueueItemStatus::Cancelled => inner.cancelled.values().cloned().collect(),
        }
    }

    pub fn summary(&self) -> QueueSummary {
        let inner = self.inner.lock();
        let total = inner.total_processed + inner.total_failed;
        let success_rate = if total == 0 {
            0.0
        } else {
            inner.total_processed as f64 / total as f64
        };
        QueueSummary {
            pending: inner.pending.len(),
            processing: inner.processing.len(),
            completed: inner.completed.len(),
            failed: inner.failed.len(),
            cancelled: inner.cancelled.len(),
            total_processed: inner.total_processed,
            total_failed: inner.total_failed,
            success_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silt_core::{ProcessorKind, QueueItemKind, QueuePayload};

    fn item(priority: i32) -> QueueItem {
        QueueItem::new(
            QueueItemKind::FileProcess,
            QueuePayload::Content("x".into()),
            "summarize",
            ProcessorKind::LocalLlm,
        )
        .with_priority(priority)
    }

    #[test]
    fn equal_priority_items_dequeue_fifo() {
        let q = ProcessingQueue::new(10);
        let a = item(5);
        let b = item(5);
        let a_id = a.id;
        let b_id = b.id;
        q.add(a).unwrap();
        q.add(b).unwrap();
        assert_eq!(q.next().unwrap().id, a_id);
        assert_eq!(q.next().unwrap().id, b_id);
    }

    #[test]
    fn higher_priority_preempts_lower() {
        let q = ProcessingQueue::new(10);
        let low = item(9);
        let low_id = low.id;
        q.add(low).unwrap();
        let high = item(1);
        let high_id = high.id;
        q.add(high).unwrap();
        assert_eq!(q.next().unwrap().id, high_id);
        assert_eq!(q.next().unwrap().id, low_id);
    }

    #[test]
    fn add_rejects_when_full() {
        let q = ProcessingQueue::new(1);
        q.add(item(5)).unwrap();
        assert!(matches!(q.add(item(5)), Err(SiltError::QueueFull)));
    }

    #[test]
    fn fail_retries_at_head_then_moves_to_failed() {
        let q = ProcessingQueue::new(10);
        let mut it = item(5);
        it.max_retries = 1;
        let id = it.id;
        q.add(it).unwrap();
        q.next().unwrap();

        q.fail(id, "boom", true).unwrap();
        let requeued = q.get(id).unwrap();
        assert_eq!(requeued.status, QueueItemStatus::Pending);
        assert_eq!(requeued.retry_count, 1);

        q.next().unwrap();
        q.fail(id, "boom again", true).unwrap();
        let failed = q.get(id).unwrap();
        assert_eq!(failed.status, QueueItemStatus::Failed);
    }

    #[test]
    fn fail_with_non_retryable_error_skips_retry_budget() {
        let q = ProcessingQueue::new(10);
        let mut it = item(5);
        it.max_retries = 3;
        let id = it.id;
        q.add(it).unwrap();
        q.next().unwrap();

        q.fail(id, "file not found", false).unwrap();
        let failed = q.get(id).unwrap();
        assert_eq!(failed.status, QueueItemStatus::Failed);
        assert_eq!(failed.retry_count, 0);
    }

    #[test]
    fn every_item_lives_in_exactly_one_bucket() {
        let q = ProcessingQueue::new(10);
        let it = item(5);
        let id = it.id;
        q.add(it).unwrap();
        assert_eq!(q.by_status(QueueItemStatus::Pending).len(), 1);
        q.next().unwrap();
        assert!(q.by_status(QueueItemStatus::Pending).is_empty());
        q.complete(id, "done".into(), Default::default()).unwrap();
        assert_eq!(q.by_status(QueueItemStatus::Completed).len(), 1);
    }
}
