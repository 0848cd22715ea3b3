//! Hybrid Search
//!
//! Merges lexical and vector hits under adaptive query-dependent weights:
//!
//! - single curated technical token  -> favor vectors
//! - phrase of three or more tokens  -> favor text
//! - short non-phrase query          -> mild vector bias
//!
//! Adjusted weights are renormalized to sum to 1 and memoized per
//! normalized query so repeated recalls rank identically. When the
//! embedding service is unavailable the merge degrades to text-only
//! scoring (and says so in the result).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;

use crate::config::SearchConfig;
use crate::embeddings::{is_technical_term, EmbeddingService};
use crate::error::{MemoryError, Result};
use crate::memory::Memory;
use crate::search::{SearchFilters, TextSearchEngine, VectorSearchEngine};

// ============================================================================
// TYPES
// ============================================================================

/// Hybrid weights after adaptive adjustment; always sums to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdaptiveWeights {
    pub vector: f32,
    pub text: f32,
}

impl AdaptiveWeights {
    fn renormalized(vector: f32, text: f32) -> Self {
        let sum = vector + text;
        if sum <= 0.0 {
            return Self {
                vector: 0.5,
                text: 0.5,
            };
        }
        Self {
            vector: vector / sum,
            text: text / sum,
        }
    }
}

/// How a result was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    /// Lexical match only
    Text,
    /// Semantic match only
    Semantic,
    /// Matched by both signals
    Both,
}

impl MatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchReason::Text => "text",
            MatchReason::Semantic => "semantic",
            MatchReason::Both => "both",
        }
    }
}

/// Which retrieval path produced the result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Hybrid,
    TextOnly,
    VectorOnly,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Hybrid => "hybrid",
            SearchType::TextOnly => "text_only",
            SearchType::VectorOnly => "vector_only",
        }
    }
}

/// A ranked recall hit
#[derive(Debug, Clone, Serialize)]
pub struct RankedMemory {
    pub memory: Memory,
    pub text_score: Option<f32>,
    pub vector_score: Option<f32>,
    pub final_score: f32,
    pub reason: MatchReason,
}

/// Full result of one hybrid search
#[derive(Debug, Clone)]
pub struct HybridSearchResult {
    pub items: Vec<RankedMemory>,
    pub weights: AdaptiveWeights,
    pub search_type: SearchType,
    pub text_hits: usize,
    pub vector_hits: usize,
    pub took_ms: u64,
}

/// Cumulative per-engine statistics
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SearchStats {
    pub total_searches: u64,
    pub text_hits: u64,
    pub vector_hits: u64,
}

// ============================================================================
// QUERY ANALYSIS
// ============================================================================

/// Lowercase, trim, collapse whitespace: the memoization key.
pub fn normalize_query(query: &str) -> String {
    query
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Apply the adaptive weighting rules to a normalized query.
///
/// At most one rule fires; the result is renormalized to sum to 1.
fn analyze_query(normalized: &str, base: AdaptiveWeights) -> AdaptiveWeights {
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    let is_phrase = tokens.len() >= 3;

    let (vector, text) = if tokens.len() == 1 && is_technical_term(tokens[0]) {
        // Single technical token: semantic neighbors beat exact words
        ((base.vector + 0.2).min(0.8), (base.text - 0.2).max(0.2))
    } else if is_phrase {
        // Phrases carry exact wording worth matching lexically
        ((base.vector - 0.2).max(0.2), (base.text + 0.2).min(0.8))
    } else if normalized.len() <= 10 {
        ((base.vector + 0.1).min(0.7), (base.text - 0.1).max(0.3))
    } else {
        (base.vector, base.text)
    };

    AdaptiveWeights::renormalized(vector, text)
}

// ============================================================================
// HYBRID SEARCH ENGINE
// ============================================================================

/// Merges text and vector retrieval under adaptive weights
pub struct HybridSearchEngine {
    text: TextSearchEngine,
    vector: VectorSearchEngine,
    embeddings: Arc<EmbeddingService>,
    config: SearchConfig,
    weights: Mutex<HashMap<String, AdaptiveWeights>>,
    stats: Mutex<SearchStats>,
}

impl HybridSearchEngine {
    pub fn new(
        text: TextSearchEngine,
        vector: VectorSearchEngine,
        embeddings: Arc<EmbeddingService>,
        config: SearchConfig,
    ) -> Self {
        Self {
            text,
            vector,
            embeddings,
            config,
            weights: Mutex::new(HashMap::new()),
            stats: Mutex::new(SearchStats::default()),
        }
    }

    /// Adaptive weights for a query, memoized per normalized form.
    pub fn weights_for(&self, query: &str) -> AdaptiveWeights {
        let key = normalize_query(query);
        let base = AdaptiveWeights::renormalized(self.config.vector_weight, self.config.text_weight);
        let mut map = match self.weights.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *map.entry(key.clone())
            .or_insert_with(|| analyze_query(&key, base))
    }

    /// Snapshot of the cumulative statistics.
    pub fn stats(&self) -> SearchStats {
        match self.stats.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Run a hybrid search. Empty queries are rejected; a missing embedding
    /// capability degrades to text-only scoring.
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<HybridSearchResult> {
        if query.trim().is_empty() {
            return Err(MemoryError::InvalidInput("query cannot be empty".into()));
        }
        let started = Instant::now();
        let limit = limit.max(1);
        let weights = self.weights_for(query);
        let source_limit = limit * 2;

        let text_hits = self.text.search(query, filters, source_limit)?;

        let mut vector_available = self.embeddings.is_available();
        let vector_hits: Vec<(Memory, f32)> = if vector_available {
            match self.embeddings.embed(query).await {
                Ok(embedded) => self.vector.search(
                    &embedded.vector,
                    filters,
                    source_limit,
                    self.config.hybrid_vector_threshold,
                    false,
                )?,
                Err(e) => {
                    tracing::warn!("query embedding failed, text-only recall: {e}");
                    vector_available = false;
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let search_type = if vector_available {
            SearchType::Hybrid
        } else {
            SearchType::TextOnly
        };

        let items = merge(text_hits, vector_hits, weights, limit);

        {
            let mut stats = match self.stats.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            stats.total_searches += 1;
            stats.text_hits += items
                .iter()
                .filter(|i| i.text_score.is_some())
                .count() as u64;
            stats.vector_hits += items
                .iter()
                .filter(|i| i.vector_score.is_some())
                .count() as u64;
        }

        let (text_count, vector_count) = (
            items.iter().filter(|i| i.text_score.is_some()).count(),
            items.iter().filter(|i| i.vector_score.is_some()).count(),
        );

        Ok(HybridSearchResult {
            items,
            weights,
            search_type,
            text_hits: text_count,
            vector_hits: vector_count,
            took_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Merge per-source hits into final rankings.
fn merge(
    text_hits: Vec<(Memory, f32)>,
    vector_hits: Vec<(Memory, f32)>,
    weights: AdaptiveWeights,
    limit: usize,
) -> Vec<RankedMemory> {
    let mut by_id: HashMap<String, RankedMemory> = HashMap::new();

    for (memory, score) in text_hits {
        by_id.insert(
            memory.id.clone(),
            RankedMemory {
                memory,
                text_score: Some(score),
                vector_score: None,
                final_score: weights.text * score,
                reason: MatchReason::Text,
            },
        );
    }

    for (memory, score) in vector_hits {
        match by_id.get_mut(&memory.id) {
            Some(existing) => {
                existing.vector_score = Some(score);
                existing.final_score = weights.text * existing.text_score.unwrap_or(0.0)
                    + weights.vector * score;
                existing.reason = MatchReason::Both;
            }
            None => {
                by_id.insert(
                    memory.id.clone(),
                    RankedMemory {
                        memory,
                        text_score: None,
                        vector_score: Some(score),
                        final_score: weights.vector * score,
                        reason: MatchReason::Semantic,
                    },
                );
            }
        }
    }

    let mut items: Vec<RankedMemory> = by_id.into_values().collect();
    // Ties break on importance, then recency, then id for stable output
    items.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| b.memory.importance.total_cmp(&a.memory.importance))
            .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
    items.truncate(limit);
    items
}

// ============================================================================
// TESTS
// ============================================================================
