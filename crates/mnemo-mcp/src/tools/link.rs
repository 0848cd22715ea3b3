//! link_memories - directed relations between memories

use serde::Deserialize;
use serde_json::Value;

use mnemo_core::LinkKind;

use super::{ToolError, ToolResult};
use crate::context::AppContext;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "source_id": {
                "type": "string",
                "description": "Source memory id"
            },
            "target_id": {
                "type": "string",
                "description": "Target memory id"
            },
            "relation": {
                "type": "string",
                "description": "Relation kind",
                "enum": ["cause_of", "derived_from", "duplicates", "contradicts"]
            }
        },
        "required": ["source_id", "target_id", "relation"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LinkArgs {
    source_id: String,
    target_id: String,
    relation: String,
}

pub async fn execute(ctx: &AppContext, args: Option<Value>) -> ToolResult {
    let args: LinkArgs = super::parse_args(args)?;
    if args.source_id == args.target_id {
        return Err(ToolError::invalid_input("cannot link a memory to itself"));
    }
    let relation = LinkKind::parse_name(&args.relation).map_err(ToolError::from)?;
    let link = ctx
        .storage
        .add_link(&args.source_id, &args.target_id, relation)?;

    Ok(serde_json::json!({
        "link_id": link.id,
        "source_id": link.source_id,
        "target_id": link.target_id,
        "relation": link.relation.as_str(),
    }))
}

// ============================================================================
// TESTS
// ============================================================================
