//! Background substrate: queue workers drain embedding work and the
//! scheduler's cleanup job forgets stale rows without any request traffic.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mnemo_core::{
    spawn_workers, BatchScheduler, JobSpec, MemoryDraft, MemoryKind, QueueConfig, SchedulerConfig,
    TaskContext, TaskPayload, TaskQueue, TaskStatus,
};
use mnemo_e2e_tests::{backdate, remember, stack};
use tokio::sync::broadcast;

#[tokio::test]
async fn worker_pool_embeds_written_memories() {
    let (stack, _dir) = stack();
    let queue = Arc::new(TaskQueue::new(QueueConfig::default()));
    let ctx = Arc::new(TaskContext {
        storage: stack.storage.clone(),
        embeddings: stack.embeddings.clone(),
    });
    let (shutdown_tx, _) = broadcast::channel(1);
    let handles = spawn_workers(queue.clone(), ctx, 2, &shutdown_tx);

    let stored = stack
        .storage
        .insert_memory(&MemoryDraft::new("embedded off the request path"))
        .unwrap();
    let task_id = queue.enqueue(
        TaskPayload::GenerateEmbedding {
            memory_id: stored.id.clone(),
            content: stored.content.clone(),
        },
        5,
    );

    for _ in 0..100 {
        if queue.status(&task_id) == Some(TaskStatus::Completed) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(queue.status(&task_id), Some(TaskStatus::Completed));
    assert!(stack.storage.require_memory(&stored.id).unwrap().has_embedding);
    assert!(queue.stats().completed >= 1);

    let _ = shutdown_tx.send(());
    for handle in handles {
        let _ = handle.await;
    }
}

#[tokio::test]
async fn scheduled_cleanup_forgets_stale_rows() {
    let (stack, _dir) = stack();
    let stale = remember(&stack, "ephemeral scratch", MemoryKind::Working, 0.2).await;
    backdate(&stack, &stale, 24 * 120);
    let keeper = remember(&stack, "durable fact", MemoryKind::Semantic, 0.9).await;

    let config = SchedulerConfig {
        retry_attempts: 1,
        retry_delay: Duration::from_millis(20),
        job_timeout: Duration::from_secs(10),
        shutdown_grace: Duration::from_secs(2),
        ..SchedulerConfig::default()
    };
    let mut scheduler = BatchScheduler::new(config).with_storage(stack.storage.clone());
    let forgetting = stack.forgetting.clone();
    scheduler.register(JobSpec::new(
        "cleanup",
        Duration::from_secs(600),
        0,
        move || {
            let forgetting = forgetting.clone();
            Box::pin(async move {
                forgetting
                    .run_cleanup(false, Utc::now())
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            })
        },
    ));
    let handle = scheduler.spawn();

    // The job runs once immediately on start
    for _ in 0..100 {
        if handle.snapshot().get("cleanup").map(|s| s.runs).unwrap_or(0) >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let stats = handle.snapshot();
    handle.stop().await;

    assert!(stats["cleanup"].runs >= 1);
    assert_eq!(stats["cleanup"].failures, 0);

    match stack.storage.get_memory(&stale).unwrap() {
        None => {}
        Some(memory) => assert!(memory.demoted),
    }
    assert!(stack.storage.get_memory(&keeper).unwrap().is_some());
}
