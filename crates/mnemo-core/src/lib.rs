//! # Mnemo Core
//!
//! Agent-facing long-term memory engine:
//!
//! - **Hybrid retrieval**: FTS5 lexical search fused with HNSW vector
//!   similarity under query-adaptive weights
//! - **Policy-driven forgetting**: per-memory forget scores from age, usage,
//!   importance and pinning, with soft/hard cleanup plans
//! - **Embedded storage**: one SQLite file holding rows, the inverted text
//!   index, embedding blobs, tags, links and feedback, with retry-on-busy
//!   helpers for concurrent writers
//! - **Background substrate**: a periodic job scheduler and a priority task
//!   queue that keep embedding generation and cleanup off the request path
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mnemo_core::{EmbeddingService, MemoryDraft, Storage};
//!
//! let storage = std::sync::Arc::new(Storage::open(None, 512)?);
//! let stored = storage.insert_memory(&MemoryDraft::new("the deploy key lives in vault"))?;
//! ```

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod embeddings;
pub mod error;
pub mod forgetting;
pub mod memory;
pub mod observability;
pub mod scheduler;
pub mod search;
pub mod storage;
pub mod tasks;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Memory types
pub use memory::{
    FeedbackEvent, FeedbackKind, Link, LinkKind, Memory, MemoryDraft, MemoryKind, Privacy,
};

// Errors
pub use error::{ErrorKind, MemoryError, Result};

// Configuration
pub use config::{
    Config, EmbeddingConfig, EmbeddingProviderKind, ForgettingConfig, KindTtls, QueueConfig,
    SchedulerConfig, SearchConfig,
};

// Storage layer
pub use storage::{OptimizeReport, Storage, StoredEmbedding};

// Embeddings
pub use embeddings::{
    cosine_similarity, fit_dimensions, EmbeddedVector, EmbeddingError, EmbeddingProvider,
    EmbeddingService, LightweightProvider, OllamaProvider, OpenRouterProvider,
};

// Search engines
pub use search::{
    AdaptiveWeights, HybridSearchEngine, HybridSearchResult, MatchReason, RankedMemory,
    SearchFilters, SearchStats, SearchType, TextSearchEngine, VectorIndex, VectorSearchEngine,
};

// Forgetting policy
pub use forgetting::{
    decide, forget_score, CleanupDecision, CleanupOutcome, CleanupPlan, ForgettingEngine,
    ForgettingStats,
};

// Background substrate
pub use scheduler::{BatchScheduler, JobSpec, JobStats, SchedulerHandle};
pub use tasks::{
    spawn_workers, QueueStats, Task, TaskContext, TaskKind, TaskPayload, TaskQueue, TaskStatus,
};

// Observability
pub use observability::{
    Alert, AlertLevel, AlertMonitor, AlertThresholds, ErrorCategory, ErrorLog, ErrorSeverity,
    HealthSample, MetricsRegistry, MetricsSnapshot,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        Config, EmbeddingService, ForgettingEngine, HybridSearchEngine, Memory, MemoryDraft,
        MemoryError, MemoryKind, Result, SearchFilters, Storage, TaskQueue,
    };
}
