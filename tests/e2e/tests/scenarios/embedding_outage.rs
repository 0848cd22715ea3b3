//! Embedding outage: writes succeed and recall degrades to text scoring.

use mnemo_core::{MemoryKind, SearchFilters, SearchType};
use mnemo_e2e_tests::{remember, stack_without_embeddings};

#[tokio::test]
async fn remember_succeeds_without_any_provider() {
    let (stack, _dir) = stack_without_embeddings();
    let id = remember(
        &stack,
        "the standup moved to 9:30",
        MemoryKind::Episodic,
        0.5,
    )
    .await;

    let stored = stack.storage.require_memory(&id).unwrap();
    assert!(!stored.has_embedding);
}

#[tokio::test]
async fn recall_finds_content_via_text_alone() {
    let (stack, _dir) = stack_without_embeddings();
    let id = remember(
        &stack,
        "the standup moved to 9:30",
        MemoryKind::Episodic,
        0.5,
    )
    .await;

    let result = stack
        .hybrid
        .search("standup", &SearchFilters::default(), 10)
        .await
        .unwrap();

    assert_eq!(result.search_type, SearchType::TextOnly);
    assert_eq!(result.items[0].memory.id, id);
    assert!(result.items[0].vector_score.is_none());
    assert!(result.items[0].final_score > 0.0);
}

#[tokio::test]
async fn vector_only_lookups_return_empty_when_degraded() {
    let (stack, _dir) = stack_without_embeddings();
    remember(&stack, "nothing vectorized here", MemoryKind::Episodic, 0.5).await;

    // No embeddings exist, so the index has no candidates
    let query = vec![0.5_f32; mnemo_e2e_tests::TEST_DIMENSIONS];
    let hits = stack
        .storage
        .search_vector(&query, &SearchFilters::default(), 10, 0.7)
        .unwrap();
    assert!(hits.is_empty());
}
