//! Tools
//!
//! One module per tool: a `schema()` describing the input object and an
//! `execute()` that validates arguments, orchestrates the engine, and
//! returns the payload. The server wraps payloads and errors into the
//! uniform `{ok, payload|error}` envelope.

pub mod cleanup;
pub mod feedback;
pub mod forget;
pub mod get;
pub mod link;
pub mod optimize;
pub mod pin;
pub mod recall;
pub mod remember;
pub mod remember_batch;
pub mod similar;
pub mod stats;

use mnemo_core::{ErrorKind, MemoryError};
use serde_json::Value;

/// Error crossing the tool boundary; carries the taxonomy kind.
#[derive(Debug, Clone)]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn code(&self) -> u16 {
        self.kind.code()
    }
}

impl From<MemoryError> for ToolError {
    fn from(err: MemoryError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind.as_str())
    }
}

/// Uniform tool result
pub type ToolResult = std::result::Result<Value, ToolError>;

/// Parse the arguments object for a tool that requires one.
pub fn parse_args<T: serde::de::DeserializeOwned>(args: Option<Value>) -> Result<T, ToolError> {
    let value = args.ok_or_else(|| ToolError::invalid_input("missing arguments"))?;
    serde_json::from_value(value).map_err(|e| ToolError::invalid_input(format!("invalid arguments: {e}")))
}

/// Parse arguments for a tool whose fields all have defaults.
pub fn parse_optional_args<T>(args: Option<Value>) -> Result<T, ToolError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match args {
        Some(Value::Null) | None => Ok(T::default()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| ToolError::invalid_input(format!("invalid arguments: {e}"))),
    }
}

/// Serialize a memory for tool responses.
pub fn memory_json(memory: &mnemo_core::Memory) -> Value {
    serde_json::json!({
        "id": memory.id,
        "kind": memory.kind.as_str(),
        "content": memory.content,
        "importance": memory.importance,
        "privacy": memory.privacy.as_str(),
        "pinned": memory.pinned,
        "demoted": memory.demoted,
        "tags": memory.tags,
        "source": memory.source,
        "created_at": memory.created_at.to_rfc3339(),
        "last_accessed_at": memory.last_accessed_at.map(|t| t.to_rfc3339()),
        "has_embedding": memory.has_embedding,
        "embedding_model": memory.embedding_model,
    })
}

// ============================================================================
// TEST SUPPORT
// ============================================================================

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use mnemo_core::{Config, EmbeddingProviderKind};
    use tempfile::TempDir;

    use crate::context::AppContext;

    /// Context on a throwaway database with lightweight embeddings.
    pub fn test_context() -> (Arc<AppContext>, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.db_path = Some(dir.path().join("test.db"));
        config.embedding.dimensions = 64;
        let ctx = AppContext::initialize(config).unwrap();
        (ctx, dir)
    }

    /// Context whose embedding capability is entirely disabled.
    pub fn test_context_no_embeddings() -> (Arc<AppContext>, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.db_path = Some(dir.path().join("test.db"));
        config.embedding.dimensions = 64;
        config.embedding.provider = EmbeddingProviderKind::Disabled;
        let ctx = AppContext::initialize(config).unwrap();
        (ctx, dir)
    }
}
