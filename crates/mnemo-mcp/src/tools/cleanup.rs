//! cleanup_memory - run the forgetting policy
//!
//! Defaults to dry-run so an accidental call never mutates anything.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use super::ToolResult;
use crate::context::AppContext;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "dry_run": {
                "type": "boolean",
                "description": "Compute the plan without mutating (default: true)",
                "default": true
            }
        }
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CleanupArgs {
    dry_run: Option<bool>,
}

pub async fn execute(ctx: &AppContext, args: Option<Value>) -> ToolResult {
    let args: CleanupArgs = super::parse_optional_args(args)?;
    let dry_run = args.dry_run.unwrap_or(true);

    let outcome = ctx.forgetting.run_cleanup(dry_run, Utc::now())?;

    Ok(serde_json::json!({
        "dry_run": outcome.dry_run,
        "scanned": outcome.plan.scanned,
        "forget_candidates": outcome.plan.forget_candidates(),
        "hard_delete": outcome.plan.hard_delete,
        "soft_delete": outcome.plan.soft_delete,
        "review": outcome.plan.review,
        "hard_deleted": outcome.hard_deleted,
        "soft_deleted": outcome.soft_deleted,
        "mean_forget_score": outcome.plan.mean_forget_score,
        "duration_ms": outcome.duration_ms,
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

    async fn seed_stale(ctx: &AppContext, n: usize) -> Vec<String> {
        let mut ids = Vec::new();
        for i in 0..n {
            let result = remember::execute(
                ctx,
                Some(serde_json::json!({
                    "content": format!("stale working note {i}"),
                    "kind": "working",
                    "importance": 0.3
                })),
            )
            .await
            .unwrap();
            let id = result["memory_id"].as_str().unwrap().to_string();
            // Age it past the working TTL
            let past = (Utc::now() - chrono::Duration::days(90)).to_rfc3339();
            ctx.storage
                .run(
                    "UPDATE memories SET created_at = ?1, last_accessed_at = ?1 WHERE id = ?2",
                    &[&past, &id],
                )
                .unwrap();
            ids.push(id);
        }
        ids
    }

    #[tokio::test]
    async fn test_default_is_dry_run() {
        let (ctx, _dir) = test_context();
        let ids = seed_stale(&ctx, 5).await;

        let result = execute(&ctx, None).await.unwrap();
        assert_eq!(result["dry_run"], true);
        assert_eq!(result["forget_candidates"], 5);
        assert_eq!(result["hard_deleted"], 0);

        for id in &ids {
            assert!(ctx.storage.get_memory(id).unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_execute_removes_unpinned() {
        let (ctx, _dir) = test_context();
        let ids = seed_stale(&ctx, 5).await;
        ctx.storage.set_pinned(&ids[0], true).unwrap();

        let result = execute(&ctx, Some(serde_json::json!({ "dry_run": false })))
            .await
            .unwrap();
        assert_eq!(result["dry_run"], false);
        let removed =
            result["hard_deleted"].as_u64().unwrap() + result["soft_deleted"].as_u64().unwrap();
        assert_eq!(removed, 4);

        assert!(ctx.storage.require_memory(&ids[0]).unwrap().pinned);
    }
}
