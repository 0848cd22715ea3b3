//! Search Module
//!
//! Retrieval engines over the storage layer:
//! - Lexical search against the FTS5 inverted index
//! - Vector search against the in-process HNSW index
//! - Hybrid merge with query-adaptive weights

mod hybrid;
mod text;
mod vector;

pub use hybrid::{
    normalize_query, AdaptiveWeights, HybridSearchEngine, HybridSearchResult, MatchReason,
    RankedMemory, SearchStats, SearchType,
};
pub use text::{sanitize_match_query, TextSearchEngine};
pub use vector::{VectorIndex, VectorSearchEngine};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::memory::MemoryKind;

/// Optional predicate filters applied by every retrieval path
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchFilters {
    /// Restrict to these kinds
    #[serde(default)]
    pub kinds: Option<Vec<MemoryKind>>,
    /// Require all of these tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Restrict by pin state
    #[serde(default)]
    pub pinned: Option<bool>,
    /// Created at or after
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Created at or before
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.kinds.is_none()
            && self.tags.is_none()
            && self.pinned.is_none()
            && self.since.is_none()
            && self.until.is_none()
    }
}
