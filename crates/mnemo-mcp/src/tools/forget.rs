//! forget - user-initiated removal
//!
//! Soft forget demotes (unpin + neglect event); hard forget cascades the
//! row away. Pinned memories must be unpinned before a hard forget.

use serde::Deserialize;
use serde_json::Value;

use super::{ToolError, ToolResult};
use crate::context::AppContext;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": {
                "type": "string",
                "description": "Memory id"
            },
            "hard": {
                "type": "boolean",
                "description": "Cascade-delete the row instead of demoting it (default: false)",
                "default": false
            }
        },
        "required": ["id"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ForgetArgs {
    id: String,
    #[serde(default)]
    hard: bool,
}

pub async fn execute(ctx: &AppContext, args: Option<Value>) -> ToolResult {
    let args: ForgetArgs = super::parse_args(args)?;
    let memory = ctx.storage.require_memory(&args.id)?;

    if args.hard {
        if memory.pinned {
            return Err(ToolError::invalid_input(
                "pinned memories must be unpinned before a hard forget",
            ));
        }
        ctx.storage.forget_hard(&args.id)?;
    } else {
        ctx.storage.forget_soft(&args.id)?;
    }

    Ok(serde_json::json!({
        "id": args.id,
        "forgotten": if args.hard { "hard" } else { "soft" },
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

    async fn seed(ctx: &AppContext) -> String {
        let result = remember::execute(
            ctx,
            Some(serde_json::json!({ "content": "disposable memory" })),
        )
        .await
        .unwrap();
        result["memory_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_soft_forget_demotes() {
        let (ctx, _dir) = test_context();
        let id = seed(&ctx).await;

        let result = execute(&ctx, Some(serde_json::json!({ "id": id })))
            .await
            .unwrap();
        assert_eq!(result["forgotten"], "soft");

        let after = ctx.storage.require_memory(&id).unwrap();
        assert!(after.demoted);
        assert!(!after.pinned);
    }

    #[tokio::test]
    async fn test_hard_forget_removes_row() {
        let (ctx, _dir) = test_context();
        let id = seed(&ctx).await;

        let result = execute(&ctx, Some(serde_json::json!({ "id": id, "hard": true })))
            .await
            .unwrap();
        assert_eq!(result["forgotten"], "hard");
        assert!(ctx.storage.get_memory(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hard_forget_refuses_pinned() {
        let (ctx, _dir) = test_context();
        let id = seed(&ctx).await;
        ctx.storage.set_pinned(&id, true).unwrap();

        let err = execute(&ctx, Some(serde_json::json!({ "id": id, "hard": true })))
            .await
            .unwrap_err();
        assert_eq!(err.kind, mnemo_core::ErrorKind::InvalidInput);
        assert!(ctx.storage.get_memory(&id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let (ctx, _dir) = test_context();
        let err = execute(&ctx, Some(serde_json::json!({ "id": "ghost" })))
            .await
            .unwrap_err();
        assert_eq!(err.kind, mnemo_core::ErrorKind::NotFound);
    }
}
