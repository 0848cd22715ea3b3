//! Forgetting lifecycle: dry-run safety, plan stability, pin protection.

use chrono::Utc;
use mnemo_core::MemoryKind;
use mnemo_e2e_tests::{backdate, remember, stack};

const STALE_HOURS: i64 = 24 * 90;

async fn seed_stale(stack: &mnemo_e2e_tests::CoreStack, n: usize) -> Vec<String> {
    let mut ids = Vec::new();
    for i in 0..n {
        let id = remember(
            stack,
            &format!("stale working note {i}"),
            MemoryKind::Working,
            0.3,
        )
        .await;
        backdate(stack, &id, STALE_HOURS);
        ids.push(id);
    }
    ids
}

#[tokio::test]
async fn dry_run_reports_candidates_without_mutating() {
    let (stack, _dir) = stack();
    let ids = seed_stale(&stack, 5).await;

    let outcome = stack.forgetting.run_cleanup(true, Utc::now()).unwrap();
    assert!(outcome.dry_run);
    assert_eq!(outcome.plan.forget_candidates(), 5);
    assert_eq!(outcome.hard_deleted, 0);
    assert_eq!(outcome.soft_deleted, 0);

    // All five rows still present after the dry run
    for id in &ids {
        assert!(stack.storage.get_memory(id).unwrap().is_some());
    }
}

#[tokio::test]
async fn dry_run_and_execute_agree_on_unchanged_data() {
    let (stack, _dir) = stack();
    seed_stale(&stack, 5).await;

    let now = Utc::now();
    let dry = stack.forgetting.run_cleanup(true, now).unwrap();
    let wet = stack.forgetting.run_cleanup(false, now).unwrap();

    assert_eq!(dry.plan.hard_delete, wet.plan.hard_delete);
    assert_eq!(dry.plan.soft_delete, wet.plan.soft_delete);
    assert_eq!(dry.plan.review, wet.plan.review);
}

#[tokio::test]
async fn pinned_memory_survives_cleanup() {
    let (stack, _dir) = stack();
    let ids = seed_stale(&stack, 5).await;
    stack.storage.set_pinned(&ids[0], true).unwrap();

    let outcome = stack.forgetting.run_cleanup(false, Utc::now()).unwrap();
    assert_eq!(outcome.hard_deleted + outcome.soft_deleted, 4);

    let survivor = stack.storage.require_memory(&ids[0]).unwrap();
    assert!(survivor.pinned);

    for id in &ids[1..] {
        match stack.storage.get_memory(id).unwrap() {
            None => {}
            Some(memory) => assert!(memory.demoted, "{id} neither removed nor demoted"),
        }
    }
}

#[tokio::test]
async fn fresh_important_memories_are_retained() {
    let (stack, _dir) = stack();
    let id = remember(
        &stack,
        "the signing key rotates quarterly",
        MemoryKind::Semantic,
        0.9,
    )
    .await;

    let outcome = stack.forgetting.run_cleanup(false, Utc::now()).unwrap();
    assert_eq!(outcome.plan.forget_candidates(), 0);
    assert!(stack.storage.get_memory(&id).unwrap().is_some());
}

#[tokio::test]
async fn stats_reflect_candidates_and_kinds() {
    let (stack, _dir) = stack();
    seed_stale(&stack, 3).await;
    remember(&stack, "a keeper", MemoryKind::Semantic, 0.9).await;

    let stats = stack.forgetting.stats(Utc::now()).unwrap();
    assert_eq!(stats.total_memories, 4);
    assert_eq!(stats.forget_candidates, 3);
    assert_eq!(stats.by_kind.get("working"), Some(&3));
    assert!(stats.mean_forget_score > 0.0 && stats.mean_forget_score <= 1.0);
}
