//! get_memory - fetch one memory with its links and feedback

use serde::Deserialize;
use serde_json::Value;

use super::{memory_json, ToolResult};
use crate::context::AppContext;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": {
                "type": "string",
                "description": "Memory id"
            }
        },
        "required": ["id"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetArgs {
    id: String,
}

pub async fn execute(ctx: &AppContext, args: Option<Value>) -> ToolResult {
    let args: GetArgs = super::parse_args(args)?;
    let memory = ctx.storage.require_memory(&args.id)?;
    let links = ctx.storage.links_for(&args.id)?;
    let feedback = ctx.storage.feedback_for(&args.id)?;

    let mut payload = memory_json(&memory);
    payload["links"] = serde_json::json!(links
        .iter()
        .map(|l| serde_json::json!({
            "link_id": l.id,
            "source_id": l.source_id,
            "target_id": l.target_id,
            "relation": l.relation.as_str(),
        }))
        .collect::<Vec<_>>());
    payload["feedback_events"] = serde_json::json!(feedback.len());
    Ok(payload)
}

// ============================================================================
// TESTS
// ============================================================================
