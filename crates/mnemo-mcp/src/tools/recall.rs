//! recall - ranked hybrid retrieval
//!
//! Delegates to the hybrid engine and updates access times for hits via a
//! background task, off the critical path.

use serde::Deserialize;
use serde_json::Value;

use mnemo_core::{MemoryKind, SearchFilters, TaskPayload};

use super::{memory_json, ToolError, ToolResult};
use crate::context::AppContext;

/// Access-time updates are cheap bookkeeping; lowest urgency
const ACCESS_TASK_PRIORITY: u8 = 1;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Search query",
                "minLength": 1
            },
            "limit": {
                "type": "integer",
                "description": "Maximum results (default: 10)",
                "minimum": 1,
                "maximum": 100
            },
            "kinds": {
                "type": "array",
                "items": {
                    "type": "string",
                    "enum": ["working", "episodic", "semantic", "procedural"]
                },
                "description": "Restrict to these kinds"
            },
            "tags": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Require all of these tags"
            },
            "pinned": {
                "type": "boolean",
                "description": "Restrict by pin state"
            },
            "since": {
                "type": "string",
                "description": "Only memories created at or after this RFC 3339 timestamp"
            },
            "until": {
                "type": "string",
                "description": "Only memories created at or before this RFC 3339 timestamp"
            }
        },
        "required": ["query"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecallArgs {
    query: String,
    limit: Option<i64>,
    kinds: Option<Vec<String>>,
    tags: Option<Vec<String>>,
    pinned: Option<bool>,
    since: Option<chrono::DateTime<chrono::Utc>>,
    until: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn execute(ctx: &AppContext, args: Option<Value>) -> ToolResult {
    let args: RecallArgs = super::parse_args(args)?;
    if args.query.trim().is_empty() {
        return Err(ToolError::invalid_input("query cannot be empty"));
    }

    let limit = args
        .limit
        .unwrap_or(ctx.config.search.default_limit as i64)
        .clamp(1, ctx.config.search.max_limit as i64) as usize;

    let kinds = args
        .kinds
        .map(|raw| {
            raw.iter()
                .map(|k| MemoryKind::parse_name(k))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()
        .map_err(ToolError::from)?;

    let filters = SearchFilters {
        kinds,
        tags: args.tags,
        pinned: args.pinned,
        since: args.since,
        until: args.until,
    };

    let result = ctx.hybrid.search(&args.query, &filters, limit).await?;

    // Touch access times in the background; recall never waits on it
    let hit_ids: Vec<String> = result.items.iter().map(|i| i.memory.id.clone()).collect();
    if !hit_ids.is_empty() {
        ctx.queue
            .enqueue(TaskPayload::RecordAccess { ids: hit_ids }, ACCESS_TASK_PRIORITY);
    }

    let items: Vec<Value> = result
        .items
        .iter()
        .map(|item| {
            let mut entry = memory_json(&item.memory);
            entry["text_score"] = serde_json::json!(item.text_score);
            entry["vector_score"] = serde_json::json!(item.vector_score);
            entry["final_score"] = serde_json::json!(item.final_score);
            entry["reason"] = serde_json::json!(item.reason.as_str());
            entry
        })
        .collect();

    Ok(serde_json::json!({
        "query": args.query,
        "total": items.len(),
        "search_type": result.search_type.as_str(),
        "weights": { "vector": result.weights.vector, "text": result.weights.text },
        "took_ms": result.took_ms,
        "results": items,
    }))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::{test_context, test_context_no_embeddings};
    use crate::tools::remember;

    async fn remember_content(ctx: &AppContext, content: &str) -> String {
        let result = remember::execute(
            ctx,
            Some(serde_json::json!({ "content": content })),
        )
        .await
        .unwrap();
        result["memory_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_recall_empty_query_fails() {
        let (ctx, _dir) = test_context();
        let err = execute(&ctx, Some(serde_json::json!({ "query": "  " })))
            .await
            .unwrap_err();
        assert_eq!(err.kind, mnemo_core::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_recall_single_char_query_accepted() {
        let (ctx, _dir) = test_context();
        let result = execute(&ctx, Some(serde_json::json!({ "query": "x" })))
            .await
            .unwrap();
        assert_eq!(result["total"], 0);
    }

    #[tokio::test]
    async fn test_recall_finds_remembered_content() {
        let (ctx, _dir) = test_context();
        let id = remember_content(&ctx, "The billing cron runs at midnight UTC").await;

        let result = execute(&ctx, Some(serde_json::json!({ "query": "billing cron" })))
            .await
            .unwrap();
        let results = result["results"].as_array().unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0]["id"], id.as_str());
        assert!(results[0]["final_score"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_recall_respects_limit_and_sorting() {
        let (ctx, _dir) = test_context();
        for i in 0..8 {
            remember_content(&ctx, &format!("meeting notes entry number {i}")).await;
        }

        let result = execute(
            &ctx,
            Some(serde_json::json!({ "query": "meeting notes", "limit": 3 })),
        )
        .await
        .unwrap();
        let results = result["results"].as_array().unwrap();
        assert!(results.len() <= 3);

        let scores: Vec<f64> = results
            .iter()
            .map(|r| r["final_score"].as_f64().unwrap())
            .collect();
        for pair in scores.windows(2) {
            assert!(pair[0] >= pair[1]);
        }

        let mut ids: Vec<&str> = results.iter().map(|r| r["id"].as_str().unwrap()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), results.len());
    }

    #[tokio::test]
    async fn test_recall_degrades_without_embeddings() {
        let (ctx, _dir) = test_context_no_embeddings();
        let id = remember_content(&ctx, "text only retrieval still works").await;

        let result = execute(&ctx, Some(serde_json::json!({ "query": "retrieval" })))
            .await
            .unwrap();
        assert_eq!(result["search_type"], "text_only");
        assert_eq!(result["results"][0]["id"], id.as_str());
    }

    #[tokio::test]
    async fn test_recall_kind_filter() {
        let (ctx, _dir) = test_context();
        remember::execute(
            &ctx,
            Some(serde_json::json!({ "content": "working scratchpad", "kind": "working" })),
        )
        .await
        .unwrap();
        remember::execute(
            &ctx,
            Some(serde_json::json!({ "content": "scratchpad history", "kind": "episodic" })),
        )
        .await
        .unwrap();

        let result = execute(
            &ctx,
            Some(serde_json::json!({ "query": "scratchpad", "kinds": ["working"] })),
        )
        .await
        .unwrap();
        let results = result["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["kind"], "working");
    }

    #[tokio::test]
    async fn test_recall_empty_result_is_ok_not_error() {
        let (ctx, _dir) = test_context();
        let result = execute(
            &ctx,
            Some(serde_json::json!({ "query": "nothing matches this" })),
        )
        .await
        .unwrap();
        assert_eq!(result["total"], 0);
        assert!(result["results"].as_array().unwrap().is_empty());
    }
}
