//! remember - store a new memory
//!
//! Inserts the row synchronously and queues embedding generation in the
//! background; a broken embedding provider never fails the write.

use serde::Deserialize;
use serde_json::Value;

use mnemo_core::{MemoryDraft, MemoryKind, Privacy, TaskPayload};

use super::{ToolError, ToolResult};
use crate::context::AppContext;

/// Priority for embedding tasks spawned from writes
const EMBEDDING_TASK_PRIORITY: u8 = 5;

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "content": {
                "type": "string",
                "description": "The text to remember",
                "minLength": 1
            },
            "kind": {
                "type": "string",
                "description": "Memory kind (default: episodic)",
                "enum": ["working", "episodic", "semantic", "procedural"]
            },
            "tags": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Tags for later filtering"
            },
            "importance": {
                "type": "number",
                "description": "Importance in [0, 1] (default: 0.5)",
                "minimum": 0.0,
                "maximum": 1.0
            },
            "source": {
                "type": "string",
                "description": "Optional origin label"
            },
            "privacy": {
                "type": "string",
                "description": "Privacy scope (default: private)",
                "enum": ["private", "team", "public"]
            }
        },
        "required": ["content"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RememberArgs {
    content: String,
    kind: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    importance: Option<f64>,
    source: Option<String>,
    privacy: Option<String>,
}

pub async fn execute(ctx: &AppContext, args: Option<Value>) -> ToolResult {
    let args: RememberArgs = super::parse_args(args)?;

    let draft = MemoryDraft {
        content: args.content,
        kind: match args.kind.as_deref() {
            Some(raw) => MemoryKind::parse_name(raw).map_err(ToolError::from)?,
            None => MemoryKind::default(),
        },
        importance: args.importance.unwrap_or(0.5),
        privacy: match args.privacy.as_deref() {
            Some(raw) => Privacy::parse_name(raw).map_err(ToolError::from)?,
            None => Privacy::default(),
        },
        tags: args.tags,
        source: args.source,
    };

    let stored = ctx.storage.insert_memory(&draft)?;

    // Embedding happens off the request path; the write never waits on it
    let embedding_created = if ctx.embeddings.is_available() {
        ctx.queue.enqueue(
            TaskPayload::GenerateEmbedding {
                memory_id: stored.id.clone(),
                content: stored.content.clone(),
            },
            EMBEDDING_TASK_PRIORITY,
        );
        true
    } else {
        false
    };

    Ok(serde_json::json!({
        "memory_id": stored.id,
        "kind": stored.kind.as_str(),
        "embedding_created": embedding_created,
    }))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::{test_context, test_context_no_embeddings};

    #[tokio::test]
    async fn test_remember_returns_memory_id() {
        let (ctx, _dir) = test_context();
        let args = serde_json::json!({
            "content": "The retro board lives in the team wiki",
            "kind": "episodic",
            "importance": 0.5
        });
        let result = execute(&ctx, Some(args)).await.unwrap();

        let id = result["memory_id"].as_str().unwrap();
        assert!(!id.is_empty());
        assert_eq!(result["embedding_created"], true);

        let stored = ctx.storage.require_memory(id).unwrap();
        assert_eq!(stored.content, "The retro board lives in the team wiki");
    }

    #[tokio::test]
    async fn test_remember_rejects_empty_content() {
        let (ctx, _dir) = test_context();
        let args = serde_json::json!({ "content": "   " });
        let err = execute(&ctx, Some(args)).await.unwrap_err();
        assert_eq!(err.kind, mnemo_core::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_remember_rejects_bad_importance() {
        let (ctx, _dir) = test_context();
        let args = serde_json::json!({ "content": "x", "importance": 1.5 });
        assert!(execute(&ctx, Some(args)).await.is_err());
    }

    #[tokio::test]
    async fn test_remember_rejects_unknown_fields() {
        let (ctx, _dir) = test_context();
        let args = serde_json::json!({ "content": "x", "boost": 99 });
        assert!(execute(&ctx, Some(args)).await.is_err());
    }

    #[tokio::test]
    async fn test_remember_without_embeddings_still_succeeds() {
        let (ctx, _dir) = test_context_no_embeddings();
        let args = serde_json::json!({ "content": "no vectors for me" });
        let result = execute(&ctx, Some(args)).await.unwrap();
        assert!(result["memory_id"].as_str().is_some());
        assert_eq!(result["embedding_created"], false);
    }

    #[tokio::test]
    async fn test_remember_enqueues_embedding_task() {
        let (ctx, _dir) = test_context();
        let args = serde_json::json!({ "content": "queued for embedding" });
        execute(&ctx, Some(args)).await.unwrap();
        assert_eq!(ctx.queue.stats().pending, 1);
    }
}
