//! pin / unpin - toggle forgetting exemption
//!
//! Idempotent: pinning a pinned memory (or unpinning an unpinned one)
//! succeeds and reports the resulting state.

use serde::Deserialize;
use serde_json::Value;

use super::ToolResult;
use crate::context::AppContext;

pub fn pin_schema() -> Value {
    id_schema("Memory id to pin")
}

pub fn unpin_schema() -> Value {
    id_schema("Memory id to unpin")
}

fn id_schema(description: &str) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": {
                "type": "string",
                "description": description
            }
        },
        "required": ["id"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PinArgs {
    id: String,
}

pub async fn execute(ctx: &AppContext, args: Option<Value>, pinned: bool) -> ToolResult {
    let args: PinArgs = super::parse_args(args)?;
    let memory = ctx.storage.set_pinned(&args.id, pinned)?;
    Ok(serde_json::json!({
        "id": memory.id,
        "pinned": memory.pinned,
    }))
}

// ============================================================================
// TESTS
// ============================================================================
