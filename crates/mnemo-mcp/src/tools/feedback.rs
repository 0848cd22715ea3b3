//! record_feedback - append-only usage signals

use serde::Deserialize;
use serde_json::Value;

use mnemo_core::FeedbackKind;

use super::{ToolError, ToolResult};
use crate::context::AppContext;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "memory_id": {
                "type": "string",
                "description": "Memory id"
            },
            "event": {
                "type": "string",
                "description": "Feedback event kind",
                "enum": ["used", "helpful", "not_helpful", "edited", "neglected"]
            },
            "score": {
                "type": "number",
                "description": "Optional signal strength (default: 1.0)"
            }
        },
        "required": ["memory_id", "event"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FeedbackArgs {
    memory_id: String,
    event: String,
    score: Option<f64>,
}

pub async fn execute(ctx: &AppContext, args: Option<Value>) -> ToolResult {
    let args: FeedbackArgs = super::parse_args(args)?;
    let event = FeedbackKind::parse_name(&args.event).map_err(ToolError::from)?;
    ctx.storage
        .add_feedback(&args.memory_id, event, args.score.unwrap_or(1.0))?;

    Ok(serde_json::json!({
        "memory_id": args.memory_id,
        "event": event.as_str(),
        "recorded": true,
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
    async fn test_feedback_appends_in_order() {
        let (ctx, _dir) = test_context();
        let result = remember::execute(
            &ctx,
            Some(serde_json::json!({ "content": "rated memory" })),
        )
        .await
        .unwrap();
        let id = result["memory_id"].as_str().unwrap().to_string();

        for event in ["used", "helpful"] {
            execute(
                &ctx,
                Some(serde_json::json!({ "memory_id": id, "event": event })),
            )
            .await
            .unwrap();
        }

        let events = ctx.storage.feedback_for(&id).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, FeedbackKind::Used);
        assert_eq!(events[1].event, FeedbackKind::Helpful);
    }

    #[tokio::test]
    async fn test_feedback_rejects_unknown_event() {
        let (ctx, _dir) = test_context();
        let err = execute(
            &ctx,
            Some(serde_json::json!({ "memory_id": "x", "event": "loved" })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, mnemo_core::ErrorKind::InvalidInput);
    }
}
