//! similar_memories - vector-only neighbors of an existing memory
//!
//! Uses the stricter vector-only threshold. A memory without an embedding
//! yields an empty list rather than an error (retrieval is degraded, not
//! broken).

use serde::Deserialize;
use serde_json::Value;

use mnemo_core::SearchFilters;

use super::{memory_json, ToolResult};
use crate::context::AppContext;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": {
                "type": "string",
                "description": "Memory id to find neighbors of"
            },
            "limit": {
                "type": "integer",
                "description": "Maximum results (default: 10)",
                "minimum": 1,
                "maximum": 100
            },
            "threshold": {
                "type": "number",
                "description": "Minimum cosine similarity (default: 0.7)",
                "minimum": 0.0,
                "maximum": 1.0
            }
        },
        "required": ["id"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SimilarArgs {
    id: String,
    limit: Option<i64>,
    threshold: Option<f64>,
}

pub async fn execute(ctx: &AppContext, args: Option<Value>) -> ToolResult {
    let args: SimilarArgs = super::parse_args(args)?;
    // NotFound for unknown ids, even when degraded
    ctx.storage.require_memory(&args.id)?;

    let limit = args
        .limit
        .unwrap_or(ctx.config.search.default_limit as i64)
        .clamp(1, ctx.config.search.max_limit as i64) as usize;
    let threshold = args
        .threshold
        .unwrap_or(ctx.config.search.strict_vector_threshold as f64)
        .clamp(0.0, 1.0) as f32;

    let embedding = match ctx.storage.get_embedding(&args.id)? {
        Some(embedding) => embedding,
        None => {
            // No vector for this memory: similarity search degrades to empty
            return Ok(serde_json::json!({
                "id": args.id,
                "total": 0,
                "degraded": true,
                "results": [],
            }));
        }
    };

    let hits = ctx.storage.search_vector(
        &embedding.vector,
        &SearchFilters::default(),
        limit + 1,
        threshold,
    )?;

    let results: Vec<Value> = hits
        .into_iter()
        .filter(|(memory, _)| memory.id != args.id)
        .take(limit)
        .map(|(memory, similarity)| {
            let mut entry = memory_json(&memory);
            entry["similarity"] = serde_json::json!(similarity);
            entry
        })
        .collect();

    Ok(serde_json::json!({
        "id": args.id,
        "total": results.len(),
        "degraded": false,
        "results": results,
    }))
}

// ============================================================================
// TESTS
// ============================================================================
