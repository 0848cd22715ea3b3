//! database_optimize - ANALYZE, index maintenance, WAL checkpoint

use serde::Deserialize;
use serde_json::Value;

use super::ToolResult;
use crate::context::AppContext;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "analyze": {
                "type": "boolean",
                "description": "Run ANALYZE and PRAGMA optimize (default: true)",
                "default": true
            },
            "create_indexes": {
                "type": "boolean",
                "description": "(Re)create the recommended indexes (default: false)",
                "default": false
            }
        }
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptimizeArgs {
    analyze: Option<bool>,
    create_indexes: Option<bool>,
}

pub async fn execute(ctx: &AppContext, args: Option<Value>) -> ToolResult {
    let args: OptimizeArgs = super::parse_optional_args(args)?;
    let report = ctx.storage.optimize(
        args.analyze.unwrap_or(true),
        args.create_indexes.unwrap_or(false),
    )?;
    Ok(serde_json::to_value(report).unwrap_or_default())
}

// ============================================================================
// TESTS
// ============================================================================
