//! Async Task Queue
//!
//! Priority queue for background work that must not block request handlers:
//! embedding generation, batch inserts, access-time updates. Workers pull
//! the highest-priority task (FIFO among equals), run it under its timeout,
//! and retry failures up to the task's budget; exhausted tasks land in a
//! failed set with their last error. Pending tasks can be cancelled and
//! failed tasks manually re-queued.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::embeddings::EmbeddingService;
use crate::error::{MemoryError, Result};
use crate::memory::MemoryDraft;
use crate::storage::Storage;

/// Completed-task ids kept for status lookups
const COMPLETED_RING: usize = 256;
/// Failed tasks kept before the oldest are dropped
const FAILED_RING: usize = 512;

// ============================================================================
// TASKS
// ============================================================================

/// Typed background work
#[derive(Debug, Clone)]
pub enum TaskPayload {
    /// Generate and persist the embedding for one memory
    GenerateEmbedding { memory_id: String, content: String },
    /// Best-effort `last_accessed_at` update for recall hits
    RecordAccess { ids: Vec<String> },
    /// Bulk insert drafts, embedding each as available
    BatchRemember { drafts: Vec<MemoryDraft> },
}

/// Task kind label for lookups and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    GenerateEmbedding,
    RecordAccess,
    BatchRemember,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::GenerateEmbedding => "generate_embedding",
            TaskKind::RecordAccess => "record_access",
            TaskKind::BatchRemember => "batch_remember",
        }
    }
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::GenerateEmbedding { .. } => TaskKind::GenerateEmbedding,
            TaskPayload::RecordAccess { .. } => TaskKind::RecordAccess,
            TaskPayload::BatchRemember { .. } => TaskKind::BatchRemember,
        }
    }
}

/// A queued unit of work
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub payload: TaskPayload,
    /// Higher runs first
    pub priority: u8,
    pub max_retries: u32,
    pub retry_count: u32,
    pub timeout: Duration,
    pub created_at: DateTime<Utc>,
    seq: u64,
}

/// Where a task currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// A permanently failed task with its last error
#[derive(Debug, Clone)]
pub struct FailedTask {
    pub task: Task,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

// ============================================================================
// PRIORITY ORDER
// ============================================================================

struct PendingEntry {
    priority: u8,
    seq: u64,
    task: Task,
}

impl PartialEq for PendingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for PendingEntry {}
impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: highest priority first, FIFO within a priority
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

// ============================================================================
// QUEUE
// ============================================================================

struct QueueState {
    pending: BinaryHeap<PendingEntry>,
    statuses: HashMap<String, TaskStatus>,
    failed: HashMap<String, FailedTask>,
    failed_order: VecDeque<String>,
    completed_order: VecDeque<String>,
    seq: u64,
}

/// Queue counter snapshot
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub retried: u64,
    pub timed_out: u64,
    pub throughput_per_min: f64,
    pub avg_processing_ms: f64,
}

/// Priority task queue; share as `Arc<TaskQueue>`.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    config: QueueConfig,
    started_at: Instant,
    processing: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    retried: AtomicU64,
    timed_out: AtomicU64,
    total_processing_ms: AtomicU64,
}

impl TaskQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: BinaryHeap::new(),
                statuses: HashMap::new(),
                failed: HashMap::new(),
                failed_order: VecDeque::new(),
                completed_order: VecDeque::new(),
                seq: 0,
            }),
            notify: Notify::new(),
            config,
            started_at: Instant::now(),
            processing: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            total_processing_ms: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Enqueue with the configured retry/timeout defaults.
    pub fn enqueue(&self, payload: TaskPayload, priority: u8) -> String {
        self.enqueue_with(
            payload,
            priority,
            self.config.default_max_retries,
            self.config.default_timeout,
        )
    }

    /// Enqueue with explicit retry budget and timeout.
    pub fn enqueue_with(
        &self,
        payload: TaskPayload,
        priority: u8,
        max_retries: u32,
        timeout: Duration,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let task = Task {
            id: id.clone(),
            payload,
            priority,
            max_retries,
            retry_count: 0,
            timeout,
            created_at: Utc::now(),
            seq: 0,
        };
        self.push(task);
        id
    }

    fn push(&self, mut task: Task) {
        {
            let mut state = self.lock();
            state.seq += 1;
            task.seq = state.seq;
            state.statuses.insert(task.id.clone(), TaskStatus::Pending);
            state.pending.push(PendingEntry {
                priority: task.priority,
                seq: task.seq,
                task,
            });
        }
        self.notify.notify_one();
    }

    /// Pop the next runnable task; `None` when the queue is idle.
    pub fn take_next(&self) -> Option<Task> {
        let mut state = self.lock();
        while let Some(entry) = state.pending.pop() {
            match state.statuses.get(&entry.task.id) {
                // Cancelled while pending: drop silently
                Some(TaskStatus::Cancelled) => continue,
                _ => {
                    state
                        .statuses
                        .insert(entry.task.id.clone(), TaskStatus::Processing);
                    self.processing.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.task);
                }
            }
        }
        None
    }

    /// Cancel a pending task. Processing and finished tasks are unaffected.
    pub fn cancel(&self, id: &str) -> bool {
        let mut state = self.lock();
        match state.statuses.get(id) {
            Some(TaskStatus::Pending) => {
                state.statuses.insert(id.to_string(), TaskStatus::Cancelled);
                state.completed_order.push_back(id.to_string());
                if state.completed_order.len() > COMPLETED_RING {
                    if let Some(evicted) = state.completed_order.pop_front() {
                        state.statuses.remove(&evicted);
                    }
                }
                self.cancelled.fetch_add(1, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Re-queue a failed task, granting one more full attempt cycle.
    /// Refused for tasks that never had a retry budget.
    pub fn retry(&self, id: &str) -> Result<()> {
        let task = {
            let mut state = self.lock();
            let failed = state
                .failed
                .remove(id)
                .ok_or_else(|| MemoryError::NotFound(format!("failed task {id}")))?;
            if failed.task.max_retries == 0 {
                state.failed.insert(id.to_string(), failed);
                return Err(MemoryError::InvalidInput(format!(
                    "task {id} has no retry budget"
                )));
            }
            state.failed_order.retain(|f| f != id);
            let mut task = failed.task;
            task.retry_count = 0;
            task
        };
        self.push(task);
        Ok(())
    }

    /// Status lookup; `None` for unknown (or long-evicted) ids.
    pub fn status(&self, id: &str) -> Option<TaskStatus> {
        self.lock().statuses.get(id).copied()
    }

    /// Last error of a failed task.
    pub fn failed_error(&self, id: &str) -> Option<String> {
        self.lock().failed.get(id).map(|f| f.error.clone())
    }

    fn complete(&self, id: &str, elapsed: Duration) {
        let mut state = self.lock();
        state.statuses.insert(id.to_string(), TaskStatus::Completed);
        state.completed_order.push_back(id.to_string());
        if state.completed_order.len() > COMPLETED_RING {
            if let Some(evicted) = state.completed_order.pop_front() {
                state.statuses.remove(&evicted);
            }
        }
        drop(state);
        self.processing.fetch_sub(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.total_processing_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    fn fail_or_retry(&self, mut task: Task, error: String) {
        self.processing.fetch_sub(1, Ordering::Relaxed);
        if task.retry_count < task.max_retries {
            task.retry_count += 1;
            self.retried.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "task {} ({}) failed, retry {}/{}: {error}",
                task.id,
                task.payload.kind().as_str(),
                task.retry_count,
                task.max_retries
            );
            self.push(task);
            return;
        }

        tracing::warn!(
            "task {} ({}) failed permanently: {error}",
            task.id,
            task.payload.kind().as_str()
        );
        let mut state = self.lock();
        state.statuses.insert(task.id.clone(), TaskStatus::Failed);
        state.failed_order.push_back(task.id.clone());
        state.failed.insert(
            task.id.clone(),
            FailedTask {
                task,
                error,
                failed_at: Utc::now(),
            },
        );
        if state.failed_order.len() > FAILED_RING {
            if let Some(evicted) = state.failed_order.pop_front() {
                state.failed.remove(&evicted);
                state.statuses.remove(&evicted);
            }
        }
        drop(state);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Counter snapshot.
    pub fn stats(&self) -> QueueStats {
        let pending = {
            let state = self.lock();
            state
                .statuses
                .values()
                .filter(|s| **s == TaskStatus::Pending)
                .count()
        };
        let completed = self.completed.load(Ordering::Relaxed);
        let elapsed_min = self.started_at.elapsed().as_secs_f64() / 60.0;
        let total_ms = self.total_processing_ms.load(Ordering::Relaxed);
        QueueStats {
            pending,
            processing: self.processing.load(Ordering::Relaxed),
            completed,
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            throughput_per_min: if elapsed_min > 0.0 {
                completed as f64 / elapsed_min
            } else {
                0.0
            },
            avg_processing_ms: if completed > 0 {
                total_ms as f64 / completed as f64
            } else {
                0.0
            },
        }
    }
}

// ============================================================================
// WORKERS
// ============================================================================

/// Shared handles workers need to execute payloads
pub struct TaskContext {
    pub storage: Arc<Storage>,
    pub embeddings: Arc<EmbeddingService>,
}

/// Spawn `count` workers draining the queue until shutdown.
pub fn spawn_workers(
    queue: Arc<TaskQueue>,
    ctx: Arc<TaskContext>,
    count: usize,
    shutdown: &broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..count.max(1))
        .map(|i| {
            let queue = queue.clone();
            let ctx = ctx.clone();
            let mut shutdown_rx = shutdown.subscribe();
            tokio::spawn(async move {
                tracing::debug!("task worker {i} started");
                loop {
                    if let Some(task) = queue.take_next() {
                        process(&queue, &ctx, task).await;
                        continue;
                    }
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = queue.notify.notified() => {}
                        _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                    }
                }
                tracing::debug!("task worker {i} stopped");
            })
        })
        .collect()
}

async fn process(queue: &TaskQueue, ctx: &TaskContext, task: Task) {
    let started = Instant::now();
    let result = tokio::time::timeout(task.timeout, execute(&task.payload, ctx)).await;
    match result {
        Ok(Ok(())) => queue.complete(&task.id, started.elapsed()),
        Ok(Err(error)) => queue.fail_or_retry(task, error),
        Err(_) => {
            queue.timed_out.fetch_add(1, Ordering::Relaxed);
            let timeout = task.timeout;
            queue.fail_or_retry(task, format!("timed out after {timeout:?}"));
        }
    }
}

async fn execute(payload: &TaskPayload, ctx: &TaskContext) -> std::result::Result<(), String> {
    match payload {
        TaskPayload::GenerateEmbedding { memory_id, content } => {
            let embedded = ctx
                .embeddings
                .embed(content)
                .await
                .map_err(|e| e.to_string())?;
            ctx.storage
                .upsert_embedding(memory_id, &embedded.vector, &embedded.model)
                .map_err(|e| e.to_string())
        }
        TaskPayload::RecordAccess { ids } => ctx
            .storage
            .record_access(ids, Utc::now())
            .map(|_| ())
            .map_err(|e| e.to_string()),
        TaskPayload::BatchRemember { drafts } => {
            for draft in drafts {
                let stored = ctx.storage.insert_memory(draft).map_err(|e| e.to_string())?;
                if ctx.embeddings.is_available() {
                    match ctx.embeddings.embed(&draft.content).await {
                        Ok(embedded) => {
                            if let Err(e) = ctx.storage.upsert_embedding(
                                &stored.id,
                                &embedded.vector,
                                &embedded.model,
                            ) {
                                tracing::warn!("embedding upsert failed for {}: {e}", stored.id);
                            }
                        }
                        Err(e) => {
                            tracing::warn!("embedding failed for {}: {e}", stored.id)
                        }
                    }
                }
            }
            Ok(())
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn queue() -> TaskQueue {
        TaskQueue::new(QueueConfig {
            max_workers: 1,
            default_timeout: Duration::from_secs(5),
            default_max_retries: 1,
        })
    }

    fn access_task(label: &str) -> TaskPayload {
        TaskPayload::RecordAccess {
            ids: vec![label.to_string()],
        }
    }

    fn payload_label(task: &Task) -> String {
        match &task.payload {
            TaskPayload::RecordAccess { ids } => ids[0].clone(),
            _ => panic!("unexpected payload"),
        }
    }

    #[test]
    fn test_priority_order_with_fifo_ties() {
        let queue = queue();
        queue.enqueue(access_task("low"), 1);
        queue.enqueue(access_task("high-1"), 9);
        queue.enqueue(access_task("high-2"), 9);

        assert_eq!(payload_label(&queue.take_next().unwrap()), "high-1");
        assert_eq!(payload_label(&queue.take_next().unwrap()), "high-2");
        assert_eq!(payload_label(&queue.take_next().unwrap()), "low");
        assert!(queue.take_next().is_none());
    }

    #[test]
    fn test_cancel_pending_only() {
        let queue = queue();
        let id = queue.enqueue(access_task("victim"), 1);
        assert!(queue.cancel(&id));
        assert_eq!(queue.status(&id), Some(TaskStatus::Cancelled));
        // Cancelled tasks never pop
        assert!(queue.take_next().is_none());
        // Second cancel is a no-op
        assert!(!queue.cancel(&id));

        let running = queue.enqueue(access_task("running"), 1);
        let _task = queue.take_next().unwrap();
        assert!(!queue.cancel(&running));
    }

    #[test]
    fn test_fail_then_manual_retry() {
        let queue = queue();
        let id = queue.enqueue_with(access_task("doomed"), 1, 0, Duration::from_secs(5));
        let task = queue.take_next().unwrap();
        queue.fail_or_retry(task, "boom".to_string());

        assert_eq!(queue.status(&id), Some(TaskStatus::Failed));
        assert_eq!(queue.failed_error(&id).as_deref(), Some("boom"));
        // No retry budget: manual retry refused
        assert!(queue.retry(&id).is_err());

        let retryable = queue.enqueue_with(access_task("retry-me"), 1, 2, Duration::from_secs(5));
        let mut task = queue.take_next().unwrap();
        task.retry_count = task.max_retries; // exhausted
        queue.fail_or_retry(task, "still broken".to_string());
        assert_eq!(queue.status(&retryable), Some(TaskStatus::Failed));

        queue.retry(&retryable).unwrap();
        assert_eq!(queue.status(&retryable), Some(TaskStatus::Pending));
        let again = queue.take_next().unwrap();
        assert_eq!(again.retry_count, 0);
    }

    #[test]
    fn test_auto_retry_requeues_until_budget() {
        let queue = queue();
        let id = queue.enqueue_with(access_task("flaky"), 1, 2, Duration::from_secs(5));

        let task = queue.take_next().unwrap();
        queue.fail_or_retry(task, "first".into());
        assert_eq!(queue.status(&id), Some(TaskStatus::Pending));

        let task = queue.take_next().unwrap();
        assert_eq!(task.retry_count, 1);
        queue.fail_or_retry(task, "second".into());
        let task = queue.take_next().unwrap();
        assert_eq!(task.retry_count, 2);
        queue.fail_or_retry(task, "third".into());

        assert_eq!(queue.status(&id), Some(TaskStatus::Failed));
        assert_eq!(queue.stats().retried, 2);
        assert_eq!(queue.stats().failed, 1);
    }

    #[test]
    fn test_stats_counters() {
        let queue = queue();
        let id = queue.enqueue(access_task("a"), 1);
        queue.enqueue(access_task("b"), 1);
        assert_eq!(queue.stats().pending, 2);

        let task = queue.take_next().unwrap();
        assert_eq!(task.id, id);
        assert_eq!(queue.stats().processing, 1);

        queue.complete(&task.id, Duration::from_millis(40));
        let stats = queue.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.processing, 0);
        assert!(stats.avg_processing_ms >= 40.0);
        assert_eq!(queue.status(&id), Some(TaskStatus::Completed));
    }

    // ========================================================================
    // WORKER TESTS
    // ========================================================================

    async fn worker_fixture() -> (Arc<TaskQueue>, Arc<TaskContext>, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(Some(dir.path().join("t.db")), 16).unwrap());
        let ctx = Arc::new(TaskContext {
            storage,
            embeddings: Arc::new(EmbeddingService::lightweight(16)),
        });
        let queue = Arc::new(TaskQueue::new(QueueConfig {
            max_workers: 1,
            default_timeout: Duration::from_secs(5),
            default_max_retries: 0,
        }));
        (queue, ctx, dir)
    }

    #[tokio::test]
    async fn test_worker_generates_embedding() {
        let (queue, ctx, _dir) = worker_fixture().await;
        let stored = ctx
            .storage
            .insert_memory(&MemoryDraft::new("embed me in the background"))
            .unwrap();

        let (shutdown_tx, _) = broadcast::channel(1);
        let handles = spawn_workers(queue.clone(), ctx.clone(), 1, &shutdown_tx);

        let id = queue.enqueue(
            TaskPayload::GenerateEmbedding {
                memory_id: stored.id.clone(),
                content: stored.content.clone(),
            },
            5,
        );

        for _ in 0..50 {
            if queue.status(&id) == Some(TaskStatus::Completed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(queue.status(&id), Some(TaskStatus::Completed));

        let after = ctx.storage.require_memory(&stored.id).unwrap();
        assert!(after.has_embedding);

        let _ = shutdown_tx.send(());
        for handle in handles {
            let _ = handle.await;
        }
    }

    #[tokio::test]
    async fn test_worker_moves_bad_task_to_failed() {
        let (queue, ctx, _dir) = worker_fixture().await;
        let (shutdown_tx, _) = broadcast::channel(1);
        let handles = spawn_workers(queue.clone(), ctx.clone(), 1, &shutdown_tx);

        let id = queue.enqueue(
            TaskPayload::GenerateEmbedding {
                memory_id: "no-such-memory".into(),
                content: "orphan".into(),
            },
            5,
        );

        for _ in 0..50 {
            if queue.status(&id) == Some(TaskStatus::Failed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(queue.status(&id), Some(TaskStatus::Failed));
        assert!(queue.failed_error(&id).unwrap().contains("not found"));

        let _ = shutdown_tx.send(());
        for handle in handles {
            let _ = handle.await;
        }
    }
}
