//! Server Core
//!
//! Routes JSON-RPC requests to tool handlers. Tool results are shaped into
//! the uniform `{ok, payload|error}` envelope; per-call timings and
//! failures feed the metrics registry and the structured error log.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{debug, warn};

use mnemo_core::{ErrorCategory, ErrorKind, ErrorSeverity};

use crate::context::AppContext;
use crate::protocol::messages::{
    CallToolRequest, InitializeRequest, InitializeResult, ListToolsResult, ServerCapabilities,
    ServerInfo, ToolDescription,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
use crate::tools::{self, ToolError, ToolResult};

/// JSON-RPC server bound to one application context
pub struct McpServer {
    ctx: Arc<AppContext>,
    initialized: bool,
}

impl McpServer {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            initialized: false,
        }
    }

    /// Handle one request; `None` for notifications.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("handling request: {}", request.method);

        if !self.initialized
            && request.method != "initialize"
            && request.method != "notifications/initialized"
        {
            warn!("rejecting '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(json!({})),
            method => {
                warn!("unknown method: {method}");
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(&mut self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        // Use the client's version when it is older than ours
        let negotiated = if request.protocol_version.as_str() < PROTOCOL_VERSION {
            request.protocol_version.clone()
        } else {
            PROTOCOL_VERSION.to_string()
        };

        self.initialized = true;
        tracing::info!("session initialized with protocol version {negotiated}");

        let result = InitializeResult {
            protocol_version: negotiated,
            server_info: ServerInfo {
                name: self.ctx.config.server_name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), json!(false));
                    map
                }),
            },
            instructions: Some(
                "Mnemo is a long-term memory store. Use 'remember' to save information, \
                 'recall' to retrieve it, and 'pin' to protect memories from automatic \
                 forgetting. Low-value memories decay and are cleaned up over time."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        let tools = vec![
            ToolDescription {
                name: "remember".to_string(),
                description: Some(
                    "Store a memory. Inserts the row immediately; embedding generation \
                     runs in the background and never fails the write."
                        .to_string(),
                ),
                input_schema: tools::remember::schema(),
            },
            ToolDescription {
                name: "remember_batch".to_string(),
                description: Some(
                    "Store up to 50 memories in one background batch; returns the queued \
                     task id."
                        .to_string(),
                ),
                input_schema: tools::remember_batch::schema(),
            },
            ToolDescription {
                name: "recall".to_string(),
                description: Some(
                    "Hybrid retrieval: full-text and vector similarity fused under \
                     query-adaptive weights, ranked by final score."
                        .to_string(),
                ),
                input_schema: tools::recall::schema(),
            },
            ToolDescription {
                name: "similar_memories".to_string(),
                description: Some(
                    "Vector-only neighbors of an existing memory under the strict \
                     similarity threshold. Empty when the memory has no embedding."
                        .to_string(),
                ),
                input_schema: tools::similar::schema(),
            },
            ToolDescription {
                name: "forget".to_string(),
                description: Some(
                    "Forget a memory. Default is a soft forget (demote); hard=true \
                     cascade-deletes the row and everything attached to it."
                        .to_string(),
                ),
                input_schema: tools::forget::schema(),
            },
            ToolDescription {
                name: "pin".to_string(),
                description: Some(
                    "Pin a memory, exempting it from automatic forgetting.".to_string(),
                ),
                input_schema: tools::pin::pin_schema(),
            },
            ToolDescription {
                name: "unpin".to_string(),
                description: Some("Remove a memory's pin.".to_string()),
                input_schema: tools::pin::unpin_schema(),
            },
            ToolDescription {
                name: "cleanup_memory".to_string(),
                description: Some(
                    "Run the forgetting policy. dry_run=true (default) reports the plan \
                     without mutating."
                        .to_string(),
                ),
                input_schema: tools::cleanup::schema(),
            },
            ToolDescription {
                name: "forgetting_stats".to_string(),
                description: Some(
                    "Forget-score aggregates: candidate counts, mean score, kind \
                     distribution."
                        .to_string(),
                ),
                input_schema: tools::stats::forgetting_schema(),
            },
            ToolDescription {
                name: "performance_stats".to_string(),
                description: Some(
                    "Operation counters, timings, queue and cache statistics, active \
                     alerts, recent errors."
                        .to_string(),
                ),
                input_schema: tools::stats::performance_schema(),
            },
            ToolDescription {
                name: "database_optimize".to_string(),
                description: Some(
                    "ANALYZE, optional index maintenance, and a WAL checkpoint.".to_string(),
                ),
                input_schema: tools::optimize::schema(),
            },
            ToolDescription {
                name: "link_memories".to_string(),
                description: Some(
                    "Create a directed link (cause_of, derived_from, duplicates, \
                     contradicts) between two memories."
                        .to_string(),
                ),
                input_schema: tools::link::schema(),
            },
            ToolDescription {
                name: "record_feedback".to_string(),
                description: Some(
                    "Append a usage signal (used, helpful, not_helpful, edited, \
                     neglected) for a memory."
                        .to_string(),
                ),
                input_schema: tools::feedback::schema(),
            },
            ToolDescription {
                name: "get_memory".to_string(),
                description: Some(
                    "Fetch one memory with its tags, links and feedback summary.".to_string(),
                ),
                input_schema: tools::get::schema(),
            },
        ];

        serde_json::to_value(ListToolsResult { tools })
            .map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("missing tool call parameters")),
        };

        let started = Instant::now();
        let ctx = &self.ctx;
        let result: ToolResult = match request.name.as_str() {
            "remember" => tools::remember::execute(ctx, request.arguments).await,
            "remember_batch" => tools::remember_batch::execute(ctx, request.arguments).await,
            "recall" => tools::recall::execute(ctx, request.arguments).await,
            "similar_memories" => tools::similar::execute(ctx, request.arguments).await,
            "forget" => tools::forget::execute(ctx, request.arguments).await,
            "pin" => tools::pin::execute(ctx, request.arguments, true).await,
            "unpin" => tools::pin::execute(ctx, request.arguments, false).await,
            "cleanup_memory" => tools::cleanup::execute(ctx, request.arguments).await,
            "forgetting_stats" => tools::stats::execute_forgetting(ctx, request.arguments).await,
            "performance_stats" => tools::stats::execute_performance(ctx, request.arguments).await,
            "database_optimize" => tools::optimize::execute(ctx, request.arguments).await,
            "link_memories" => tools::link::execute(ctx, request.arguments).await,
            "record_feedback" => tools::feedback::execute(ctx, request.arguments).await,
            "get_memory" => tools::get::execute(ctx, request.arguments).await,
            unknown => Err(ToolError::new(
                ErrorKind::NotFound,
                format!("unknown tool: {unknown}"),
            )),
        };

        let elapsed = started.elapsed();
        let name = format!("tool.{}", request.name);
        ctx.metrics.incr(&name);
        ctx.metrics.record_timing(&name, elapsed, result.is_ok());

        Ok(match result {
            Ok(payload) => json!({ "ok": true, "payload": payload }),
            Err(error) => {
                ctx.errors.record(
                    severity_for(error.kind),
                    category_for(error.kind),
                    format!("{} failed: {}", request.name, error.message),
                    None,
                );
                json!({
                    "ok": false,
                    "error": {
                        "kind": error.kind.as_str(),
                        "code": error.code(),
                        "message": error.message,
                    }
                })
            }
        })
    }
}

fn severity_for(kind: ErrorKind) -> ErrorSeverity {
    match kind {
        ErrorKind::InvalidInput | ErrorKind::NotFound => ErrorSeverity::Low,
        ErrorKind::Busy | ErrorKind::Timeout | ErrorKind::Unavailable => ErrorSeverity::Medium,
        ErrorKind::Conflict => ErrorSeverity::Critical,
        ErrorKind::Internal => ErrorSeverity::High,
    }
}

fn category_for(kind: ErrorKind) -> ErrorCategory {
    match kind {
        ErrorKind::InvalidInput => ErrorCategory::Validation,
        ErrorKind::Busy | ErrorKind::Conflict => ErrorCategory::Database,
        ErrorKind::Timeout => ErrorCategory::Performance,
        _ => ErrorCategory::Unknown,
    }
}

// ============================================================================
// TESTS
// ============================================================================
