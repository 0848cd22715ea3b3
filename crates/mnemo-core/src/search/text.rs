//! Text Search
//!
//! Lexical queries against the FTS5 inverted index. User input is sanitized
//! into a quoted OR expression so FTS5 operators in free text cannot break
//! the query, and bm25 ranks are min-max rescaled per query so 1.0 always
//! means "best match in this result set".

use std::sync::Arc;

use crate::error::Result;
use crate::memory::Memory;
use crate::search::SearchFilters;
use crate::storage::Storage;

/// Sanitize free text into an FTS5 MATCH expression.
///
/// Tokens are reduced to alphanumerics, double-quoted, and joined with OR.
/// Returns `None` when nothing searchable remains.
pub fn sanitize_match_query(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

/// Min-max rescale raw relevances into [0, 1]; a uniform set maps to 1.0.
fn normalize_scores(hits: Vec<(Memory, f64)>) -> Vec<(Memory, f32)> {
    if hits.is_empty() {
        return Vec::new();
    }
    let min = hits.iter().map(|(_, r)| *r).fold(f64::INFINITY, f64::min);
    let max = hits
        .iter()
        .map(|(_, r)| *r)
        .fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    hits.into_iter()
        .map(|(memory, raw)| {
            let score = if range > f64::EPSILON {
                ((raw - min) / range) as f32
            } else {
                1.0
            };
            (memory, score)
        })
        .collect()
}

/// Lexical search engine over the inverted index
pub struct TextSearchEngine {
    storage: Arc<Storage>,
}

impl TextSearchEngine {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Ranked lexical query with optional predicate filters.
    pub fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<(Memory, f32)>> {
        let match_expr = match sanitize_match_query(query) {
            Some(expr) => expr,
            None => return Ok(Vec::new()),
        };
        let hits = self.storage.search_text(&match_expr, filters, limit)?;
        Ok(normalize_scores(hits))
    }
}

// ============================================================================
// TESTS
// ============================================================================
