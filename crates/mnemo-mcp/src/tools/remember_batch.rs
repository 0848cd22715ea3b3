//! remember_batch - bulk ingestion through the task queue
//!
//! Validates every item up front, then hands the whole batch to a single
//! background task so large session dumps never block the request handler.

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use mnemo_core::{MemoryDraft, TaskPayload};

use super::{ToolError, ToolResult};
use crate::context::AppContext;

/// Batch inserts are heavier than single embeddings but still user-visible
const BATCH_TASK_PRIORITY: u8 = 4;
/// Hard cap per call; larger dumps should be split by the client
const MAX_BATCH_ITEMS: usize = 50;
/// A batch may need many embedding calls; give it a wider budget
const BATCH_TIMEOUT: Duration = Duration::from_secs(120);

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "items": {
                "type": "array",
                "description": "Memories to store (max 50)",
                "items": {
                    "type": "object",
                    "properties": {
                        "content": { "type": "string", "minLength": 1 },
                        "kind": {
                            "type": "string",
                            "enum": ["working", "episodic", "semantic", "procedural"]
                        },
                        "tags": { "type": "array", "items": { "type": "string" } },
                        "importance": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                        "source": { "type": "string" },
                        "privacy": {
                            "type": "string",
                            "enum": ["private", "team", "public"]
                        }
                    },
                    "required": ["content"]
                },
                "minItems": 1
            }
        },
        "required": ["items"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchArgs {
    items: Vec<MemoryDraft>,
}

pub async fn execute(ctx: &AppContext, args: Option<Value>) -> ToolResult {
    let args: BatchArgs = super::parse_args(args)?;
    if args.items.is_empty() {
        return Err(ToolError::invalid_input("items cannot be empty"));
    }
    if args.items.len() > MAX_BATCH_ITEMS {
        return Err(ToolError::invalid_input(format!(
            "at most {MAX_BATCH_ITEMS} items per batch, got {}",
            args.items.len()
        )));
    }
    // Reject the whole batch before any of it is queued
    for (i, draft) in args.items.iter().enumerate() {
        draft
            .validate()
            .map_err(|e| ToolError::invalid_input(format!("item {i}: {e}")))?;
    }

    let queued = args.items.len();
    let task_id = ctx.queue.enqueue_with(
        TaskPayload::BatchRemember { drafts: args.items },
        BATCH_TASK_PRIORITY,
        ctx.config.queue.default_max_retries,
        BATCH_TIMEOUT,
    );

    Ok(serde_json::json!({
        "queued": queued,
        "task_id": task_id,
    }))
}

// ============================================================================
// TESTS
// ============================================================================
