//! Storage Module
//!
//! SQLite-based storage layer with:
//! - FTS5 full-text index kept in sync by triggers
//! - Embedded vector blobs feeding the in-process HNSW index
//! - Retry-on-busy typed helpers and transaction wrapper
//! - Foreign-key cascades from memories to tags/links/feedback/embeddings

mod migrations;
mod retry;
mod sqlite;

pub use migrations::{apply_migrations, MIGRATIONS, SCHEMA_VERSION};
pub use retry::{is_busy, with_retry, RetryPolicy, STATEMENT, TRANSACTION};
pub use sqlite::{OptimizeReport, Storage, StoredEmbedding};
