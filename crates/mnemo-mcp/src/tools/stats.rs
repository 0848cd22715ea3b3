//! forgetting_stats / performance_stats - administrative summaries

use chrono::Utc;
use serde_json::Value;

use super::ToolResult;
use crate::context::AppContext;

pub fn forgetting_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

pub fn performance_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

pub async fn execute_forgetting(ctx: &AppContext, _args: Option<Value>) -> ToolResult {
    let stats = ctx.forgetting.stats(Utc::now())?;
    Ok(serde_json::json!({
        "total_memories": stats.total_memories,
        "pinned": stats.pinned,
        "forget_candidates": stats.forget_candidates,
        "review_candidates": stats.review_candidates,
        "mean_forget_score": stats.mean_forget_score,
        "by_kind": stats.by_kind,
    }))
}

pub async fn execute_performance(ctx: &AppContext, _args: Option<Value>) -> ToolResult {
    let snapshot = ctx.metrics.snapshot();
    let queue = ctx.queue.stats();
    let search = ctx.hybrid.stats();
    let sample = ctx.health_sample();
    let active_alerts = ctx.alerts.active();

    Ok(serde_json::json!({
        "uptime_secs": snapshot.uptime_secs,
        "operations": {
            "counters": snapshot.counters,
            "timers": snapshot.timers,
            "error_rate": snapshot.error_rate(),
            "avg_response_ms": snapshot.avg_response_ms(),
        },
        "queue": queue,
        "search": {
            "total_searches": search.total_searches,
            "text_hits": search.text_hits,
            "vector_hits": search.vector_hits,
        },
        "embedding_cache_hit_pct": ctx.embeddings.cache_hit_rate(),
        "memory_mb": sample.memory_mb,
        "alerts": {
            "active": active_alerts.len(),
            "recent": active_alerts,
        },
        "recent_errors": ctx.errors.recent(10),
    }))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::remember;
    use crate::tools::testutil::test_context;

    #[tokio::test]
    async fn test_forgetting_stats_counts() {
        let (ctx, _dir) = test_context();
        for kind in ["working", "semantic"] {
            remember::execute(
                &ctx,
                Some(serde_json::json!({ "content": format!("a {kind} fact"), "kind": kind })),
            )
            .await
            .unwrap();
        }

        let result = execute_forgetting(&ctx, None).await.unwrap();
        assert_eq!(result["total_memories"], 2);
        assert_eq!(result["by_kind"]["working"], 1);
        assert_eq!(result["by_kind"]["semantic"], 1);
    }

    #[tokio::test]
    async fn test_performance_stats_shape() {
        let (ctx, _dir) = test_context();
        ctx.metrics.incr("tool.remember");
        ctx.metrics
            .record_timing("tool.remember", std::time::Duration::from_millis(5), true);

        let result = execute_performance(&ctx, None).await.unwrap();
        assert!(result["uptime_secs"].is_number());
        assert_eq!(result["operations"]["counters"]["tool.remember"], 1);
        assert!(result["embedding_cache_hit_pct"].is_number());
        assert_eq!(result["alerts"]["active"], 0);
    }
}
