use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use silt_core::{
    Processor, ProcessorKind, ProcessorOptions, QueueItemKind, QueuePayload, SiltError,
};
use silt_queue::ProcessingQueue;
use tokio::task::JoinHandle;

use crate::status::PipelineStatus;

/// Cooperative pool of `max_workers` tasks pulling from a shared
/// [`ProcessingQueue`] and dispatching to the processor registered for each
/// item's `processor_kind`. The vector-store sidecar write triggered by
/// `store_in_vector_db` never fails the parent item.
pub struct WorkerPool {
    queue: Arc<ProcessingQueue>,
    processors: HashMap<ProcessorKind, Arc<dyn Processor>>,
    vector_sink: Option<Arc<dyn Processor>>,
    max_workers: usize,
    active_workers: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(queue: Arc<ProcessingQueue>, max_workers: usize) -> Self {
        Self {
            queue,
            processors: HashMap::new(),
            vector_sink: None,
            max_workers,
            active_workers: Arc::new(AtomicUsize::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register_processor(mut self, kind: ProcessorKind, processor: Arc<dyn Processor>) -> Self {
        self.processors.insert(kind, processor);
        self
    }

    /// The vector-sink processor used for the synchronous "also store this
    /// in the vector database" side effect, independent of whatever
    /// processor handled the primary task.
    pub fn with_vector_sink(mut self, sink: Arc<dyn Processor>) -> Self {
        self.vector_sink = Some(sink);
        self
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            queue: self.queue.summary(),
            active_workers: self.active_workers.load(Ordering::SeqCst),
            max_workers: self.max_workers,
        }
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Spawn `max_workers` worker loops; returns their join handles.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.max_workers)
            .map(|idx| {
                let pool = Arc::clone(self);
                tokio::spawn(async move { pool.worker_loop(idx).await })
            })
            .collect()
    }

    async fn worker_loop(&self, worker_idx: usize) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(worker_idx, "worker started");

        while !self.shutdown.load(Ordering::SeqCst) {
            let Some(item) = self.queue.next() else {
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            };

            let id = item.id;
            if self.queue.is_cancel_requested(id) {
                let _ = self.queue.finish_cancelled(id);
                continue;
            }

            if item.kind == QueueItemKind::Batch {
                self.expand_batch(item);
                continue;
            }

            let content = match self.load_content(&item.payload) {
                Ok(c) => c,
                Err(e) => {
                    let retryable = e.is_retryable();
                    let _ = self.queue.fail(id, e.to_string(), retryable);
                    continue;
                }
            };

            let processor = match self.processors.get(&item.processor_kind) {
                Some(p) => Arc::clone(p),
                None => {
                    let _ = self.queue.fail(
                        id,
                        format!("no processor registered for {:?}", item.processor_kind),
                        false,
                    );
                    continue;
                }
            };

            let opts = ProcessorOptions::default();
            let outcome = processor.process(&content, &item.task, &opts).await;

            // Next cooperative-cancellation checkpoint: a `cancel(id)` that
            // arrived while the processor call above was in flight must not
            // be silently overridden by a normal completion.
            if self.queue.is_cancel_requested(id) {
                let _ = self.queue.finish_cancelled(id);
                continue;
            }

            match outcome {
                Ok(outcome) => {
                    let mut result_metadata = outcome.metadata;
                    if item.wants_vector_storage() {
                        self.store_sidecar(&item, &outcome.content, &mut result_metadata)
                            .await;
                    }
                    let _ = self.queue.complete(id, outcome.content, result_metadata);
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    let _ = self.queue.fail(id, e.to_string(), retryable);
                }
            }
        }

        self.active_workers.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(worker_idx, "worker stopped");
    }

    fn load_content(&self, payload: &QueuePayload) -> Result<String, SiltError> {
        match payload {
            QueuePayload::Content(c) => Ok(c.clone()),
            QueuePayload::FilePath(path) => std::fs::read_to_string(path)
                .map_err(|_| SiltError::FileNotFound(path.clone())),
            QueuePayload::Batch(_) => Err(SiltError::InvalidInput(
                "batch items must be expanded before dispatch".into(),
            )),
        }
    }

    /// A `Batch` item's payload is a list of file paths; each path becomes
    /// its own `FileProcess` item at the batch's priority, and the batch
    /// item itself completes once expansion succeeds.
    fn expand_batch(&self, item: silt_core::QueueItem) {
        let QueuePayload::Batch(paths) = &item.payload else {
            let _ = self
                .queue
                .fail(item.id, "batch item missing batch payload", false);
            return;
        };

        let mut expanded = 0;
        for path in paths {
            let child = silt_core::QueueItem::new(
                QueueItemKind::FileProcess,
                QueuePayload::FilePath(path.clone()),
                item.task.clone(),
                item.processor_kind,
            )
            .with_priority(item.priority)
            .with_max_retries(item.max_retries);
            let child = item
                .metadata
                .iter()
                .fold(child, |c, (k, v)| c.with_metadata(k.clone(), v.clone()));
            if self.queue.add(child).is_ok() {
                expanded += 1;
            }
        }

        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("expanded_count".to_string(), Value::from(expanded));
        let _ = self.queue.complete(item.id, String::new(), metadata);
    }

    /// Synchronous vector-store sidecar write. Its outcome is folded into
    /// `result_metadata.vector_storage`; failure here never fails the
    /// parent item.
    async fn store_sidecar(
        &self,
        item: &silt_core::QueueItem,
        content: &str,
        result_metadata: &mut std::collections::BTreeMap<String, Value>,
    ) {
        let Some(sink) = &self.vector_sink else {
            result_metadata.insert(
                "vector_storage".to_string(),
                Value::from(serde_json::json!({"ok": false, "error": "no vector sink configured"})),
            );
            return;
        };

        let id = silt_enrich::derive_document_id(item);
        let metadata = silt_enrich::build_sidecar_metadata(item, item.processor_kind);
        let mut opts = ProcessorOptions::default();
        opts.extra = metadata;
        opts.extra.insert("id".to_string(), Value::from(id.clone()));

        let outcome = sink.process(content, "store", &opts).await;
        let sidecar_result = match outcome {
            Ok(_) => serde_json::json!({"ok": true, "id": id}),
            Err(e) => {
                tracing::warn!(error = %e, "vector store sidecar write failed");
                serde_json::json!({"ok": false, "error": e.to_string()})
            }
        };
        result_metadata.insert("vector_storage".to_string(), sidecar_result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use silt_core::{ProcessorOutcome, QueueItem, QueueItemStatus, SiltResult};
    use std::sync::atomic::AtomicU32;
    use std::time::Duration as StdDuration;

    struct EchoProcessor;

    #[async_trait]
    impl Processor for EchoProcessor {
        async fn process(
            &self,
            content: &str,
            _task: &str,
            _opts: &ProcessorOptions,
        ) -> SiltResult<ProcessorOutcome> {
            Ok(ProcessorOutcome {
                content: content.to_uppercase(),
                metadata: Default::default(),
            })
        }

        fn supported_tasks(&self) -> &[&str] {
            &["summarize"]
        }
    }

    struct AlwaysFailsProcessor;

    #[async_trait]
    impl Processor for AlwaysFailsProcessor {
        async fn process(
            &self,
            _content: &str,
            _task: &str,
            _opts: &ProcessorOptions,
        ) -> SiltResult<ProcessorOutcome> {
            Err(SiltError::InvalidInput("always fails".into()))
        }

        fn supported_tasks(&self) -> &[&str] {
            &["summarize"]
        }
    }

    /// Records every call it receives and always fails, to prove the
    /// vector-storage sidecar runs but never fails its parent item.
    struct FailingSink {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Processor for FailingSink {
        async fn process(
            &self,
            _content: &str,
            _task: &str,
            _opts: &ProcessorOptions,
        ) -> SiltResult<ProcessorOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SiltError::StorageIo("sink unavailable".into()))
        }

        fn supported_tasks(&self) -> &[&str] {
            &["store"]
        }
    }

    async fn run_briefly(pool: &Arc<WorkerPool>) {
        let handles = pool.start();
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        pool.stop();
        for h in handles {
            let _ = h.await;
        }
    }

    #[tokio::test]
    async fn successful_item_completes_with_processed_content() {
        let queue = Arc::new(ProcessingQueue::new(10));
        let item = QueueItem::new(
            QueueItemKind::FileProcess,
            QueuePayload::Content("hello".into()),
            "summarize",
            ProcessorKind::LocalLlm,
        );
        let id = item.id;
        queue.add(item).unwrap();

        let pool = Arc::new(
            WorkerPool::new(Arc::clone(&queue), 1)
                .register_processor(ProcessorKind::LocalLlm, Arc::new(EchoProcessor)),
        );
        run_briefly(&pool).await;

        let finished = queue.get(id).unwrap();
        assert_eq!(finished.status, QueueItemStatus::Completed);
        assert_eq!(finished.result_content, Some("HELLO".to_string()));
    }

    struct FileNotFoundProcessor;

    #[async_trait]
    impl Processor for FileNotFoundProcessor {
        async fn process(
            &self,
            _content: &str,
            _task: &str,
            _opts: &ProcessorOptions,
        ) -> SiltResult<ProcessorOutcome> {
            unreachable!("load_content fails before this processor is ever invoked")
        }

        fn supported_tasks(&self) -> &[&str] {
            &["summarize"]
        }
    }

    #[tokio::test]
    async fn missing_file_fails_immediately_without_consuming_retry_budget() {
        let queue = Arc::new(ProcessingQueue::new(10));
        let item = QueueItem::new(
            QueueItemKind::FileProcess,
            QueuePayload::FilePath("/no/such/file-silt-test.txt".into()),
            "summarize",
            ProcessorKind::LocalLlm,
        )
        .with_max_retries(3);
        let id = item.id;
        queue.add(item).unwrap();

        let pool = Arc::new(
            WorkerPool::new(Arc::clone(&queue), 1)
                .register_processor(ProcessorKind::LocalLlm, Arc::new(FileNotFoundProcessor)),
        );
        run_briefly(&pool).await;

        let finished = queue.get(id).unwrap();
        assert_eq!(finished.status, QueueItemStatus::Failed);
        assert_eq!(finished.retry_count, 0);
    }

    struct SlowProcessor;

    #[async_trait]
    impl Processor for SlowProcessor {
        async fn process(
            &self,
            content: &str,
            _task: &str,
            _opts: &ProcessorOptions,
        ) -> SiltResult<ProcessorOutcome> {
            tokio::time::sleep(StdDuration::from_millis(150)).await;
            Ok(ProcessorOutcome {
                content: content.to_string(),
                metadata: Default::default(),
            })
        }

        fn supported_tasks(&self) -> &[&str] {
            &["summarize"]
        }
    }

    #[tokio::test]
    async fn cancel_during_processing_is_honoured_at_the_next_checkpoint() {
        let queue = Arc::new(ProcessingQueue::new(10));
        let item = QueueItem::new(
            QueueItemKind::FileProcess,
            QueuePayload::Content("hello".into()),
            "summarize",
            ProcessorKind::LocalLlm,
        );
        let id = item.id;
        queue.add(item).unwrap();

        let pool = Arc::new(
            WorkerPool::new(Arc::clone(&queue), 1)
                .register_processor(ProcessorKind::LocalLlm, Arc::new(SlowProcessor)),
        );
        let handles = pool.start();

        // Wait for the worker to pick the item up, then cancel while
        // `process` is still sleeping.
        while queue.get(id).unwrap().status != QueueItemStatus::Processing {
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        queue.cancel(id).unwrap();

        tokio::time::sleep(StdDuration::from_millis(300)).await;
        pool.stop();
        for h in handles {
            let _ = h.await;
        }

        let finished = queue.get(id).unwrap();
        assert_eq!(finished.status, QueueItemStatus::Cancelled);
    }

    #[tokio::test]
    async fn missing_processor_fails_the_item() {
        let queue = Arc::new(ProcessingQueue::new(10));
        let mut item = QueueItem::new(
            QueueItemKind::FileProcess,
            QueuePayload::Content("hello".into()),
            "summarize",
            ProcessorKind::RemoteLlm,
        );
        item.max_retries = 0;
        let id = item.id;
        queue.add(item).unwrap();

        let pool = Arc::new(WorkerPool::new(Arc::clone(&queue), 1));
        run_briefly(&pool).await;

        let finished = queue.get(id).unwrap();
        assert_eq!(finished.status, QueueItemStatus::Failed);
    }

    #[tokio::test]
    async fn processor_error_exhausts_retries_into_failed_bucket() {
        let queue = Arc::new(ProcessingQueue::new(10));
        let mut item = QueueItem::new(
            QueueItemKind::FileProcess,
            QueuePayload::Content("hello".into()),
            "summarize",
            ProcessorKind::LocalLlm,
        );
        item.max_retries = 0;
        let id = item.id;
        queue.add(item).unwrap();

        let pool = Arc::new(
            WorkerPool::new(Arc::clone(&queue), 1)
                .register_processor(ProcessorKind::LocalLlm, Arc::new(AlwaysFailsProcessor)),
        );
        run_briefly(&pool).await;

        let finished = queue.get(id).unwrap();
        assert_eq!(finished.status, QueueItemStatus::Failed);
    }

    #[tokio::test]
    async fn vector_sidecar_failure_does_not_fail_parent_item() {
        let queue = Arc::new(ProcessingQueue::new(10));
        let item = QueueItem::new(
            QueueItemKind::FileProcess,
            QueuePayload::Content("hello".into()),
            "summarize",
            ProcessorKind::LocalLlm,
        )
        .with_metadata("store_in_vector_db", true);
        let id = item.id;
        queue.add(item).unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let pool = Arc::new(
            WorkerPool::new(Arc::clone(&queue), 1)
                .register_processor(ProcessorKind::LocalLlm, Arc::new(EchoProcessor))
                .with_vector_sink(Arc::new(FailingSink {
                    calls: Arc::clone(&calls),
                })),
        );
        run_briefly(&pool).await;

        let finished = queue.get(id).unwrap();
        assert_eq!(finished.status, QueueItemStatus::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let vector_storage = finished
            .result_metadata
            .as_ref()
            .and_then(|m| m.get("vector_storage"))
            .cloned()
            .unwrap();
        assert_eq!(vector_storage["ok"], Value::from(false));
    }

    #[tokio::test]
    async fn batch_item_expands_into_one_file_process_item_per_path() {
        let queue = Arc::new(ProcessingQueue::new(10));
        let batch = QueueItem::new(
            QueueItemKind::Batch,
            QueuePayload::Batch(vec!["/tmp/a.txt".into(), "/tmp/b.txt".into()]),
            "summarize",
            ProcessorKind::LocalLlm,
        );
        let batch_id = batch.id;
        queue.add(batch).unwrap();

        let pool = Arc::new(WorkerPool::new(Arc::clone(&queue), 1));
        run_briefly(&pool).await;

        let finished_batch = queue.get(batch_id).unwrap();
        assert_eq!(finished_batch.status, QueueItemStatus::Completed);

        let pending = queue.by_status(QueueItemStatus::Pending);
        let processing = queue.by_status(QueueItemStatus::Processing);
        let all_children: Vec<_> = pending.iter().chain(processing.iter()).collect();
        assert_eq!(all_children.len(), 2);
        assert!(all_children
            .iter()
            .all(|c| c.kind == QueueItemKind::FileProcess));
    }

    #[tokio::test]
    async fn cancelled_pending_item_is_left_untouched_by_the_pool() {
        let queue = Arc::new(ProcessingQueue::new(10));
        let item = QueueItem::new(
            QueueItemKind::FileProcess,
            QueuePayload::Content("hello".into()),
            "summarize",
            ProcessorKind::LocalLlm,
        );
        let id = item.id;
        queue.add(item).unwrap();
        // Cancelling a still-pending item takes the immediate path: moved
        // straight to the cancelled bucket before any worker can see it.
        queue.cancel(id).unwrap();
        assert_eq!(queue.get(id).unwrap().status, QueueItemStatus::Cancelled);

        let pool = Arc::new(
            WorkerPool::new(Arc::clone(&queue), 1)
                .register_processor(ProcessorKind::LocalLlm, Arc::new(EchoProcessor)),
        );
        run_briefly(&pool).await;

        let finished = queue.get(id).unwrap();
        assert_eq!(finished.status, QueueItemStatus::Cancelled);
    }
}
