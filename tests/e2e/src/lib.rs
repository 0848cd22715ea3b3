//! End-to-end test harness
//!
//! Builds the core stack on a throwaway database and offers the helpers
//! scenario tests share: remembering with an immediate embedding (standing
//! in for the background worker) and backdating rows to simulate age.

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use mnemo_core::{
    EmbeddingService, ForgettingConfig, ForgettingEngine, HybridSearchEngine, MemoryDraft,
    MemoryKind, SearchConfig, Storage, TextSearchEngine, VectorSearchEngine,
};

pub const TEST_DIMENSIONS: usize = 64;

/// The assembled engine under test
pub struct CoreStack {
    pub storage: Arc<Storage>,
    pub embeddings: Arc<EmbeddingService>,
    pub hybrid: Arc<HybridSearchEngine>,
    pub forgetting: Arc<ForgettingEngine>,
}

fn build(embeddings: EmbeddingService) -> (CoreStack, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let storage = Arc::new(
        Storage::open(Some(dir.path().join("e2e.db")), TEST_DIMENSIONS).expect("open storage"),
    );
    let embeddings = Arc::new(embeddings);
    let hybrid = Arc::new(HybridSearchEngine::new(
        TextSearchEngine::new(storage.clone()),
        VectorSearchEngine::new(storage.clone()),
        embeddings.clone(),
        SearchConfig::default(),
    ));
    let forgetting = Arc::new(ForgettingEngine::new(
        storage.clone(),
        ForgettingConfig::default(),
    ));
    (
        CoreStack {
            storage,
            embeddings,
            hybrid,
            forgetting,
        },
        dir,
    )
}

/// Stack with the deterministic lightweight embedding provider.
pub fn stack() -> (CoreStack, TempDir) {
    build(EmbeddingService::lightweight(TEST_DIMENSIONS))
}

/// Stack with embeddings disabled outright (provider outage).
pub fn stack_without_embeddings() -> (CoreStack, TempDir) {
    build(EmbeddingService::disabled(TEST_DIMENSIONS))
}

/// Remember a memory and, when the provider allows, embed it immediately
/// the way the background worker would.
pub async fn remember(
    stack: &CoreStack,
    content: &str,
    kind: MemoryKind,
    importance: f64,
) -> String {
    let draft = MemoryDraft {
        content: content.to_string(),
        kind,
        importance,
        ..MemoryDraft::default()
    };
    let stored = stack.storage.insert_memory(&draft).expect("insert");
    if stack.embeddings.is_available() {
        let embedded = stack.embeddings.embed(content).await.expect("embed");
        stack
            .storage
            .upsert_embedding(&stored.id, &embedded.vector, &embedded.model)
            .expect("upsert embedding");
    }
    stored.id
}

/// Rewrite creation/access timestamps `hours` into the past.
pub fn backdate(stack: &CoreStack, id: &str, hours: i64) {
    let past = (Utc::now() - chrono::Duration::hours(hours)).to_rfc3339();
    stack
        .storage
        .run(
            "UPDATE memories SET created_at = ?1, last_accessed_at = ?1 WHERE id = ?2",
            &[&past, &id],
        )
        .expect("backdate");
}
