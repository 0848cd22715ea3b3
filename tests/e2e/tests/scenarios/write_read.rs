//! Basic write/read: a remembered memory is the top recall hit.

use mnemo_core::{MemoryKind, SearchFilters};
use mnemo_e2e_tests::{remember, stack};

#[tokio::test]
async fn remembered_memory_is_first_recall_hit() {
    let (stack, _dir) = stack();
    let id = remember(&stack, "Hello world", MemoryKind::Episodic, 0.5).await;

    let result = stack
        .hybrid
        .search("hello", &SearchFilters::default(), 10)
        .await
        .unwrap();

    assert!(!result.items.is_empty());
    assert_eq!(result.items[0].memory.id, id);
    assert!(result.items[0].final_score > 0.0);
}

#[tokio::test]
async fn recall_ranks_closer_content_higher() {
    let (stack, _dir) = stack();
    let relevant = remember(
        &stack,
        "The kafka consumer group rebalances on deploy",
        MemoryKind::Semantic,
        0.5,
    )
    .await;
    remember(
        &stack,
        "Lunch options near the office on Fridays",
        MemoryKind::Episodic,
        0.5,
    )
    .await;

    let result = stack
        .hybrid
        .search("kafka consumer rebalance", &SearchFilters::default(), 5)
        .await
        .unwrap();

    assert_eq!(result.items[0].memory.id, relevant);
}

#[tokio::test]
async fn recall_reports_scores_and_reason() {
    let (stack, _dir) = stack();
    remember(
        &stack,
        "Grafana dashboards live under the observability folder",
        MemoryKind::Semantic,
        0.6,
    )
    .await;

    let result = stack
        .hybrid
        .search("grafana dashboards", &SearchFilters::default(), 5)
        .await
        .unwrap();

    let top = &result.items[0];
    assert!(top.text_score.is_some() || top.vector_score.is_some());
    assert!((0.0..=1.0).contains(&(top.final_score)));
    assert!(result.took_ms < 10_000);
}
