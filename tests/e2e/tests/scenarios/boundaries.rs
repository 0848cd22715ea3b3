//! Boundary behaviors: retry surfacing, dimension mismatch, query limits.

use mnemo_core::storage::{with_retry, RetryPolicy, STATEMENT};
use mnemo_core::{ErrorKind, MemoryKind, SearchFilters, VectorSearchEngine};
use mnemo_e2e_tests::{remember, stack, TEST_DIMENSIONS};
use std::time::Duration;

#[tokio::test]
async fn retry_surfaces_last_error_after_budget() {
    let policy = RetryPolicy {
        attempts: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    };
    let mut calls = 0;
    let result: mnemo_core::Result<()> = with_retry(&policy, "boundary", || {
        calls += 1;
        Err(rusqlite_busy())
    });
    assert_eq!(calls, 3);
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);
    assert!(err.to_string().contains("locked by another writer"));
}

fn rusqlite_busy() -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
        Some("locked by another writer".to_string()),
    )
}

#[tokio::test]
async fn non_busy_errors_pass_through_unretried() {
    let mut calls = 0;
    let result: mnemo_core::Result<()> = with_retry(&STATEMENT, "boundary", || {
        calls += 1;
        Err(rusqlite::Error::QueryReturnedNoRows)
    });
    assert_eq!(calls, 1);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn mismatched_query_dimension_is_lenient_or_strict() {
    let (stack, _dir) = stack();
    remember(&stack, "dimension guard", MemoryKind::Semantic, 0.5).await;

    let engine = VectorSearchEngine::new(stack.storage.clone());
    let wrong = vec![1.0_f32; TEST_DIMENSIONS + 3];

    let lenient = engine
        .search(&wrong, &SearchFilters::default(), 10, 0.5, false)
        .unwrap();
    assert!(lenient.is_empty());

    let strict = engine.search(&wrong, &SearchFilters::default(), 10, 0.5, true);
    assert_eq!(strict.unwrap_err().kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn empty_query_rejected_single_char_accepted() {
    let (stack, _dir) = stack();
    remember(&stack, "q boundary", MemoryKind::Episodic, 0.5).await;

    let err = stack
        .hybrid
        .search("   ", &SearchFilters::default(), 10)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let ok = stack
        .hybrid
        .search("q", &SearchFilters::default(), 10)
        .await
        .unwrap();
    assert!(ok.items.len() <= 10);
}

#[tokio::test]
async fn results_respect_limit_and_uniqueness() {
    let (stack, _dir) = stack();
    for i in 0..12 {
        remember(
            &stack,
            &format!("boundary corpus entry {i}"),
            MemoryKind::Episodic,
            0.5,
        )
        .await;
    }

    let result = stack
        .hybrid
        .search("boundary corpus", &SearchFilters::default(), 5)
        .await
        .unwrap();
    assert!(result.items.len() <= 5);

    let mut ids: Vec<_> = result.items.iter().map(|i| i.memory.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), result.items.len());

    // Sorted by final score descending
    for pair in result.items.windows(2) {
        assert!(pair[0].final_score >= pair[1].final_score);
    }
}
