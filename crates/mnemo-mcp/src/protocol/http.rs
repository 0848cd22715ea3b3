//! HTTP Transport
//!
//! JSON-RPC over HTTP POST plus a liveness endpoint:
//! - POST /rpc     - JSON-RPC request -> JSON response
//! - GET  /healthz - storage liveness and queue/metrics summary

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tracing::info;

use super::types::{JsonRpcRequest, JsonRpcResponse};
use crate::context::AppContext;
use crate::server::McpServer;

/// Listen configuration
pub struct HttpTransportConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4100,
        }
    }
}

struct AppState {
    server: Mutex<McpServer>,
    ctx: Arc<AppContext>,
}

/// HTTP transport bound to one shared server instance
pub struct HttpTransport {
    config: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Self {
        Self { config }
    }

    /// Serve until the shutdown channel fires.
    pub async fn run(
        self,
        ctx: Arc<AppContext>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        let state = Arc::new(AppState {
            server: Mutex::new(McpServer::new(ctx.clone())),
            ctx,
        });

        let app = Router::new()
            .route("/rpc", post(handle_rpc))
            .route("/healthz", get(handle_health))
            .with_state(state);

        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        info!("JSON-RPC HTTP server listening on http://{addr}");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        info!("HTTP server shut down");
        Ok(())
    }
}

async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    let mut server = state.server.lock().await;
    match server.handle_request(request).await {
        Some(response) => Json(response),
        // Notifications produce no response body; answer with an empty ack
        None => Json(JsonRpcResponse::success(None, json!({}))),
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let storage_ok = state.ctx.storage.liveness().is_ok();
    let queue = state.ctx.queue.stats();
    Json(json!({
        "status": if storage_ok { "ok" } else { "degraded" },
        "storage": storage_ok,
        "queue": { "pending": queue.pending, "failed": queue.failed },
        "version": mnemo_core::VERSION,
    }))
}
