//! SQLite Storage Implementation
//!
//! Single embedded store owning all persistent state: memory rows, tags,
//! links, feedback events, embedding blobs, the FTS5 inverted index, and the
//! in-process HNSW vector index rebuilt from the blobs at open.
//!
//! Uses separate reader/writer connections behind mutexes so all methods
//! take `&self` and the handle is `Send + Sync`; upper layers share it as
//! `Arc<Storage>`. Every statement and transaction goes through the retry
//! helpers, which absorb transient SQLITE_BUSY contention.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, ToSql};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;
use uuid::Uuid;

use crate::embeddings::{vector_from_bytes, vector_to_bytes};
use crate::error::{MemoryError, Result};
use crate::memory::{
    FeedbackEvent, FeedbackKind, Link, LinkKind, Memory, MemoryDraft, MemoryKind, Privacy,
};
use crate::search::{SearchFilters, VectorIndex};
use crate::storage::retry::{self, with_retry};

/// Columns needed to materialize a [`Memory`], with tags folded in via a
/// correlated subquery (unit separator keeps tags unambiguous).
const MEMORY_COLUMNS: &str = "m.id, m.kind, m.content, m.importance, m.privacy, m.pinned, \
     m.demoted, m.source, m.created_at, m.last_accessed_at, m.has_embedding, m.embedding_model, \
     (SELECT group_concat(t.tag, char(31)) FROM memory_tags t WHERE t.memory_id = m.id)";

/// A persisted embedding row
#[derive(Debug, Clone)]
pub struct StoredEmbedding {
    pub memory_id: String,
    pub vector: Vec<f32>,
    pub dimensions: usize,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

/// Result of `database_optimize`
#[derive(Debug, Clone, serde::Serialize)]
pub struct OptimizeReport {
    pub analyzed: bool,
    pub indexes_created: bool,
    pub wal_checkpointed: bool,
    pub duration_ms: u64,
}

// ============================================================================
// STORAGE
// ============================================================================

/// Main storage handle
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    vector_index: Mutex<VectorIndex>,
    dimensions: usize,
    path: PathBuf,
}

impl Storage {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(MemoryError::from_sqlite)
    }

    /// Open (or create) the store at `db_path`, defaulting to the platform
    /// data directory. `dimensions` fixes the vector index dimension D.
    pub fn open(db_path: Option<PathBuf>, dimensions: usize) -> Result<Self> {
        let path = match db_path {
            Some(p) => {
                if let Some(parent) = p.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                p
            }
            None => {
                let proj_dirs = ProjectDirs::from("dev", "mnemo", "mnemo").ok_or_else(|| {
                    MemoryError::Internal("could not determine project directories".to_string())
                })?;
                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                data_dir.join("mnemo.db")
            }
        };

        let writer_conn = Connection::open(&path).map_err(MemoryError::from_sqlite)?;
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path).map_err(MemoryError::from_sqlite)?;
        Self::configure_connection(&reader_conn)?;

        let vector_index = VectorIndex::with_dimensions(dimensions)?;

        let storage = Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            vector_index: Mutex::new(vector_index),
            dimensions,
            path,
        };
        let loaded = storage.load_vector_index()?;
        if loaded > 0 {
            tracing::info!("loaded {loaded} embeddings into the vector index");
        }

        Ok(storage)
    }

    /// Vector index dimension D
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Database file path
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| MemoryError::Internal("writer lock poisoned".to_string()))
    }

    fn lock_reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| MemoryError::Internal("reader lock poisoned".to_string()))
    }

    fn lock_index(&self) -> Result<std::sync::MutexGuard<'_, VectorIndex>> {
        self.vector_index
            .lock()
            .map_err(|_| MemoryError::Internal("vector index lock poisoned".to_string()))
    }

    // ========================================================================
    // TYPED HELPERS
    // ========================================================================

    /// Execute a single mutating statement, returning affected rows.
    pub fn run(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize> {
        let conn = self.lock_writer()?;
        with_retry(&retry::STATEMENT, sql, || conn.execute(sql, params))
    }

    /// Fetch at most one row.
    pub fn get_one<T>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        map: impl Fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        let conn = self.lock_reader()?;
        with_retry(&retry::STATEMENT, sql, || {
            match conn.query_row(sql, params, &map) {
                Ok(value) => Ok(Some(value)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    /// Fetch all matching rows.
    pub fn get_all<T>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        map: impl Fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let conn = self.lock_reader()?;
        with_retry(&retry::STATEMENT, sql, || {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, &map)?;
            rows.collect::<rusqlite::Result<Vec<T>>>()
        })
    }

    /// Execute a multi-statement script on the writer.
    pub fn exec(&self, script: &str) -> Result<()> {
        let conn = self.lock_writer()?;
        with_retry(&retry::STATEMENT, "exec", || conn.execute_batch(script))
    }

    /// Run `f` inside a writer transaction, retrying the whole transaction
    /// on contention with the transaction backoff budget.
    pub fn run_in_transaction<T>(
        &self,
        mut f: impl FnMut(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.lock_writer()?;
        let policy = retry::TRANSACTION;
        let mut attempt = 0u32;
        loop {
            let result = (|| -> Result<T> {
                let tx = conn.transaction().map_err(MemoryError::from_sqlite)?;
                let value = f(&tx)?;
                tx.commit().map_err(MemoryError::from_sqlite)?;
                Ok(value)
            })();
            match result {
                Ok(value) => return Ok(value),
                Err(MemoryError::Busy(msg)) => {
                    if attempt >= policy.attempts {
                        tracing::warn!("transaction busy after {} attempts: {msg}", attempt + 1);
                        return Err(MemoryError::Busy(msg));
                    }
                    std::thread::sleep(policy.delay_for(attempt));
                    attempt += 1;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Flush the write-ahead log and release readers.
    ///
    /// Callers may invoke this after a persistent `Busy` to break reader
    /// starvation.
    pub fn wal_checkpoint(&self) -> Result<()> {
        let conn = self.lock_writer()?;
        with_retry(&retry::STATEMENT, "wal_checkpoint", || {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| {
                row.get::<_, i64>(0)
            })
        })?;
        Ok(())
    }

    /// Liveness probe used by health checks.
    pub fn liveness(&self) -> Result<()> {
        self.get_one("SELECT 1", &[], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    // ========================================================================
    // ROW MAPPING
    // ========================================================================

    fn memory_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
        let kind_raw: String = row.get(1)?;
        let privacy_raw: String = row.get(4)?;
        let created_raw: String = row.get(8)?;
        let accessed_raw: Option<String> = row.get(9)?;
        let tags_raw: Option<String> = row.get(12)?;

        Ok(Memory {
            id: row.get(0)?,
            kind: MemoryKind::parse_name(&kind_raw).map_err(|e| conversion_error(1, e))?,
            content: row.get(2)?,
            importance: row.get(3)?,
            privacy: Privacy::parse_name(&privacy_raw).map_err(|e| conversion_error(4, e))?,
            pinned: row.get::<_, i64>(5)? != 0,
            demoted: row.get::<_, i64>(6)? != 0,
            source: row.get(7)?,
            created_at: parse_ts(&created_raw).map_err(|e| conversion_error(8, e))?,
            last_accessed_at: match accessed_raw {
                Some(raw) => Some(parse_ts(&raw).map_err(|e| conversion_error(9, e))?),
                None => None,
            },
            has_embedding: row.get::<_, i64>(10)? != 0,
            embedding_model: row.get(11)?,
            tags: tags_raw
                .map(|raw| raw.split('\u{1f}').map(str::to_string).collect())
                .unwrap_or_default(),
        })
    }

    // ========================================================================
    // MEMORY CRUD
    // ========================================================================

    /// Insert a validated draft, returning the stored memory.
    pub fn insert_memory(&self, draft: &MemoryDraft) -> Result<Memory> {
        draft.validate()?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        self.run_in_transaction(|tx| {
            tx.execute(
                "INSERT INTO memories (id, kind, content, importance, privacy, pinned,
                                       demoted, source, created_at, has_embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6, ?7, 0)",
                rusqlite::params![
                    id,
                    draft.kind.as_str(),
                    draft.content,
                    draft.importance,
                    draft.privacy.as_str(),
                    draft.source,
                    now.to_rfc3339(),
                ],
            )
            .map_err(MemoryError::from_sqlite)?;
            for tag in &draft.tags {
                tx.execute(
                    "INSERT OR IGNORE INTO memory_tags (memory_id, tag) VALUES (?1, ?2)",
                    rusqlite::params![id, tag],
                )
                .map_err(MemoryError::from_sqlite)?;
            }
            Ok(())
        })?;

        self.require_memory(&id)
    }

    /// Fetch a memory by id.
    pub fn get_memory(&self, id: &str) -> Result<Option<Memory>> {
        let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories m WHERE m.id = ?1");
        self.get_one(&sql, &[&id], Self::memory_from_row)
    }

    /// Fetch a memory by id, `NotFound` if absent.
    pub fn require_memory(&self, id: &str) -> Result<Memory> {
        self.get_memory(id)?
            .ok_or_else(|| MemoryError::NotFound(format!("memory {id}")))
    }

    /// Pin or unpin a memory. Idempotent; returns the updated row.
    pub fn set_pinned(&self, id: &str, pinned: bool) -> Result<Memory> {
        let changed = self.run(
            "UPDATE memories SET pinned = ?1 WHERE id = ?2",
            &[&(pinned as i64), &id],
        )?;
        if changed == 0 {
            return Err(MemoryError::NotFound(format!("memory {id}")));
        }
        self.require_memory(id)
    }

    /// Best-effort access-time update for recall hits.
    pub fn record_access(&self, ids: &[String], at: DateTime<Utc>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = placeholders(ids.len(), 2);
        let sql =
            format!("UPDATE memories SET last_accessed_at = ?1 WHERE id IN ({placeholders})");
        let mut values: Vec<SqlValue> = vec![SqlValue::Text(at.to_rfc3339())];
        values.extend(ids.iter().map(|id| SqlValue::Text(id.clone())));
        let conn = self.lock_writer()?;
        with_retry(&retry::STATEMENT, "record_access", || {
            conn.execute(&sql, params_from_iter(values.iter()))
        })
    }

    /// Soft-delete: clear the pin, mark the row demoted, and append a
    /// `neglected` feedback event. The row remains recallable.
    pub fn forget_soft(&self, id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.run_in_transaction(|tx| {
            let changed = tx
                .execute(
                    "UPDATE memories SET pinned = 0, demoted = 1 WHERE id = ?1",
                    rusqlite::params![id],
                )
                .map_err(MemoryError::from_sqlite)?;
            if changed == 0 {
                return Err(MemoryError::NotFound(format!("memory {id}")));
            }
            tx.execute(
                "INSERT INTO feedback_events (memory_id, event, score, created_at)
                 VALUES (?1, ?2, 0.0, ?3)",
                rusqlite::params![id, FeedbackKind::Neglected.as_str(), now],
            )
            .map_err(MemoryError::from_sqlite)?;
            Ok(())
        })
    }

    /// Hard-delete: cascades to tags, links, feedback and the embedding,
    /// and evicts the vector from the index.
    pub fn forget_hard(&self, id: &str) -> Result<()> {
        let changed = self.run("DELETE FROM memories WHERE id = ?1", &[&id])?;
        if changed == 0 {
            return Err(MemoryError::NotFound(format!("memory {id}")));
        }
        let mut index = self.lock_index()?;
        let _ = index.remove(id);
        Ok(())
    }

    /// Execute one cleanup batch in a single transaction: hard-delete and
    /// demote the given id sets. Returns (hard_deleted, soft_deleted).
    pub fn execute_cleanup_batch(
        &self,
        hard: &[String],
        soft: &[String],
        at: DateTime<Utc>,
    ) -> Result<(usize, usize)> {
        if hard.is_empty() && soft.is_empty() {
            return Ok((0, 0));
        }
        let ts = at.to_rfc3339();
        let (hard_n, soft_n) = self.run_in_transaction(|tx| {
            let mut hard_n = 0usize;
            if !hard.is_empty() {
                let sql = format!(
                    "DELETE FROM memories WHERE id IN ({}) AND pinned = 0",
                    placeholders(hard.len(), 1)
                );
                let values: Vec<SqlValue> =
                    hard.iter().map(|id| SqlValue::Text(id.clone())).collect();
                hard_n = tx
                    .execute(&sql, params_from_iter(values.iter()))
                    .map_err(MemoryError::from_sqlite)?;
            }
            let mut soft_n = 0usize;
            if !soft.is_empty() {
                let sql = format!(
                    "UPDATE memories SET pinned = 0, demoted = 1 WHERE id IN ({})",
                    placeholders(soft.len(), 1)
                );
                let values: Vec<SqlValue> =
                    soft.iter().map(|id| SqlValue::Text(id.clone())).collect();
                soft_n = tx
                    .execute(&sql, params_from_iter(values.iter()))
                    .map_err(MemoryError::from_sqlite)?;
                for id in soft {
                    tx.execute(
                        "INSERT INTO feedback_events (memory_id, event, score, created_at)
                         VALUES (?1, ?2, 0.0, ?3)",
                        rusqlite::params![id, FeedbackKind::Neglected.as_str(), ts],
                    )
                    .map_err(MemoryError::from_sqlite)?;
                }
            }
            Ok((hard_n, soft_n))
        })?;

        if hard_n > 0 {
            let mut index = self.lock_index()?;
            for id in hard {
                let _ = index.remove(id);
            }
        }
        Ok((hard_n, soft_n))
    }

    // ========================================================================
    // EMBEDDINGS
    // ========================================================================

    /// Store (or replace) the embedding for a memory and index it.
    pub fn upsert_embedding(&self, memory_id: &str, vector: &[f32], model: &str) -> Result<()> {
        if self.get_memory(memory_id)?.is_none() {
            return Err(MemoryError::NotFound(format!("memory {memory_id}")));
        }
        let now = Utc::now().to_rfc3339();
        let blob = vector_to_bytes(vector);
        let dims = vector.len() as i64;
        self.run_in_transaction(|tx| {
            tx.execute(
                "INSERT OR REPLACE INTO memory_embeddings
                     (memory_id, vector, dimensions, model, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![memory_id, blob, dims, model, now],
            )
            .map_err(MemoryError::from_sqlite)?;
            tx.execute(
                "UPDATE memories SET has_embedding = 1, embedding_model = ?1 WHERE id = ?2",
                rusqlite::params![model, memory_id],
            )
            .map_err(MemoryError::from_sqlite)?;
            Ok(())
        })?;

        if vector.len() == self.dimensions {
            let mut index = self.lock_index()?;
            index.add(memory_id, vector)?;
        } else {
            tracing::warn!(
                "embedding for {memory_id} has {} dims, index expects {}; not indexed",
                vector.len(),
                self.dimensions
            );
        }
        Ok(())
    }

    /// Fetch the stored embedding for a memory.
    pub fn get_embedding(&self, memory_id: &str) -> Result<Option<StoredEmbedding>> {
        self.get_one(
            "SELECT memory_id, vector, dimensions, model, created_at
             FROM memory_embeddings WHERE memory_id = ?1",
            &[&memory_id],
            |row| {
                let blob: Vec<u8> = row.get(1)?;
                let created_raw: String = row.get(4)?;
                Ok(StoredEmbedding {
                    memory_id: row.get(0)?,
                    vector: vector_from_bytes(&blob).unwrap_or_default(),
                    dimensions: row.get::<_, i64>(2)? as usize,
                    model: row.get(3)?,
                    created_at: parse_ts(&created_raw).map_err(|e| conversion_error(4, e))?,
                })
            },
        )
    }

    /// Rebuild the vector index from stored blobs. Rows whose dimension does
    /// not match the configured index dimension are skipped with a warning.
    fn load_vector_index(&self) -> Result<usize> {
        let rows: Vec<(String, Vec<u8>)> = self.get_all(
            "SELECT memory_id, vector FROM memory_embeddings",
            &[],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut index = self.lock_index()?;
        let mut loaded = 0;
        for (memory_id, blob) in rows {
            match vector_from_bytes(&blob) {
                Some(vector) if vector.len() == self.dimensions => {
                    if let Err(e) = index.add(&memory_id, &vector) {
                        tracing::warn!("failed to index embedding for {memory_id}: {e}");
                    } else {
                        loaded += 1;
                    }
                }
                Some(vector) => {
                    tracing::warn!(
                        "skipping embedding for {memory_id}: {} dims, index expects {}",
                        vector.len(),
                        self.dimensions
                    );
                }
                None => tracing::warn!("corrupt embedding blob for {memory_id}"),
            }
        }
        Ok(loaded)
    }

    // ========================================================================
    // SEARCH PRIMITIVES
    // ========================================================================

    /// Lexical query against the FTS5 index. `match_expr` must already be
    /// sanitized. Returns rows with their raw relevance (higher is better).
    pub fn search_text(
        &self,
        match_expr: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<(Memory, f64)>> {
        let mut values: Vec<SqlValue> = vec![SqlValue::Text(match_expr.to_string())];
        let filter_sql = filter_clause(filters, &mut values);
        values.push(SqlValue::Integer(limit as i64));
        let limit_idx = values.len();
        let sql = format!(
            "SELECT {MEMORY_COLUMNS}, -bm25(memories_fts) AS relevance
             FROM memories_fts
             JOIN memories m ON m.id = memories_fts.id
             WHERE memories_fts MATCH ?1{filter_sql}
             ORDER BY relevance DESC
             LIMIT ?{limit_idx}"
        );

        let conn = self.lock_reader()?;
        with_retry(&retry::STATEMENT, "search_text", || {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                let memory = Self::memory_from_row(row)?;
                let relevance: f64 = row.get(13)?;
                Ok((memory, relevance))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
    }

    /// Top-K cosine neighbors of `query` passing `threshold` and the
    /// predicate filters. Similarities are clamped to [0, 1]. A query of
    /// the wrong dimension is an `InvalidInput` (strict callers report it;
    /// lenient callers treat it as empty).
    pub fn search_vector(
        &self,
        query: &[f32],
        filters: &SearchFilters,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<(Memory, f32)>> {
        if query.len() != self.dimensions {
            return Err(MemoryError::InvalidInput(format!(
                "query vector has {} dims, index expects {}",
                query.len(),
                self.dimensions
            )));
        }

        // Over-fetch so predicate filtering still fills the limit
        let candidates = {
            let index = self.lock_index()?;
            if index.is_empty() {
                return Ok(Vec::new());
            }
            index.search(query, (limit * 4).max(limit))?
        };

        let passing: Vec<(String, f32)> = candidates
            .into_iter()
            .map(|(id, score)| (id, score.clamp(0.0, 1.0)))
            .filter(|(_, score)| *score >= threshold)
            .collect();
        if passing.is_empty() {
            return Ok(Vec::new());
        }

        let mut values: Vec<SqlValue> = passing
            .iter()
            .map(|(id, _)| SqlValue::Text(id.clone()))
            .collect();
        let id_placeholders = placeholders(passing.len(), 1);
        let filter_sql = filter_clause(filters, &mut values);
        let sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM memories m WHERE m.id IN ({id_placeholders}){filter_sql}"
        );

        let fetched: Vec<Memory> = {
            let conn = self.lock_reader()?;
            with_retry(&retry::STATEMENT, "search_vector", || {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(values.iter()), Self::memory_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })?
        };

        // Preserve similarity ordering, drop filtered-out candidates
        let by_id: std::collections::HashMap<&str, &Memory> =
            fetched.iter().map(|m| (m.id.as_str(), m)).collect();
        Ok(passing
            .into_iter()
            .filter_map(|(id, score)| by_id.get(id.as_str()).map(|m| ((*m).clone(), score)))
            .take(limit)
            .collect())
    }

    // ========================================================================
    // LINKS AND FEEDBACK
    // ========================================================================

    /// Create a directed link between two existing memories.
    pub fn add_link(&self, source_id: &str, target_id: &str, relation: LinkKind) -> Result<Link> {
        self.require_memory(source_id)?;
        self.require_memory(target_id)?;
        let link = Link {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relation,
            created_at: Utc::now(),
        };
        self.run(
            "INSERT INTO memory_links (id, source_id, target_id, relation, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            &[
                &link.id,
                &link.source_id,
                &link.target_id,
                &relation.as_str(),
                &link.created_at.to_rfc3339(),
            ],
        )?;
        Ok(link)
    }

    /// All links touching a memory (either direction).
    pub fn links_for(&self, memory_id: &str) -> Result<Vec<Link>> {
        self.get_all(
            "SELECT id, source_id, target_id, relation, created_at
             FROM memory_links WHERE source_id = ?1 OR target_id = ?1
             ORDER BY created_at",
            &[&memory_id],
            |row| {
                let relation_raw: String = row.get(3)?;
                let created_raw: String = row.get(4)?;
                Ok(Link {
                    id: row.get(0)?,
                    source_id: row.get(1)?,
                    target_id: row.get(2)?,
                    relation: LinkKind::parse_name(&relation_raw)
                        .map_err(|e| conversion_error(3, e))?,
                    created_at: parse_ts(&created_raw).map_err(|e| conversion_error(4, e))?,
                })
            },
        )
    }

    /// Append a feedback event for an existing memory.
    pub fn add_feedback(&self, memory_id: &str, event: FeedbackKind, score: f64) -> Result<()> {
        self.require_memory(memory_id)?;
        self.run(
            "INSERT INTO feedback_events (memory_id, event, score, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            &[
                &memory_id,
                &event.as_str(),
                &score,
                &Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Feedback events for a memory in insertion order.
    pub fn feedback_for(&self, memory_id: &str) -> Result<Vec<FeedbackEvent>> {
        self.get_all(
            "SELECT memory_id, event, score, created_at
             FROM feedback_events WHERE memory_id = ?1 ORDER BY id",
            &[&memory_id],
            |row| {
                let event_raw: String = row.get(1)?;
                let created_raw: String = row.get(3)?;
                Ok(FeedbackEvent {
                    memory_id: row.get(0)?,
                    event: FeedbackKind::parse_name(&event_raw)
                        .map_err(|e| conversion_error(1, e))?,
                    score: row.get(2)?,
                    created_at: parse_ts(&created_raw).map_err(|e| conversion_error(3, e))?,
                })
            },
        )
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// ANALYZE / index maintenance for the administrative tool.
    pub fn optimize(&self, analyze: bool, create_indexes: bool) -> Result<OptimizeReport> {
        let started = Instant::now();
        if create_indexes {
            self.exec(
                "CREATE INDEX IF NOT EXISTS idx_memories_kind ON memories(kind);
                 CREATE INDEX IF NOT EXISTS idx_memories_pinned ON memories(pinned);
                 CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);
                 CREATE INDEX IF NOT EXISTS idx_memories_demoted ON memories(demoted);
                 CREATE INDEX IF NOT EXISTS idx_memories_accessed ON memories(last_accessed_at);",
            )?;
        }
        if analyze {
            self.exec("ANALYZE; PRAGMA optimize;")?;
        }
        self.wal_checkpoint()?;
        Ok(OptimizeReport {
            analyzed: analyze,
            indexes_created: create_indexes,
            wal_checkpointed: true,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// `?N, ?N+1, ...` placeholder list starting at `start`
fn placeholders(count: usize, start: usize) -> String {
    (0..count)
        .map(|i| format!("?{}", start + i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Append predicate filters to a query, extending `values` in step with the
/// generated `?N` placeholders.
fn filter_clause(filters: &SearchFilters, values: &mut Vec<SqlValue>) -> String {
    let mut sql = String::new();
    if let Some(kinds) = &filters.kinds {
        if !kinds.is_empty() {
            let start = values.len() + 1;
            values.extend(
                kinds
                    .iter()
                    .map(|k| SqlValue::Text(k.as_str().to_string())),
            );
            sql.push_str(&format!(
                " AND m.kind IN ({})",
                placeholders(kinds.len(), start)
            ));
        }
    }
    if let Some(pinned) = filters.pinned {
        values.push(SqlValue::Integer(pinned as i64));
        sql.push_str(&format!(" AND m.pinned = ?{}", values.len()));
    }
    if let Some(since) = filters.since {
        values.push(SqlValue::Text(since.to_rfc3339()));
        sql.push_str(&format!(" AND m.created_at >= ?{}", values.len()));
    }
    if let Some(until) = filters.until {
        values.push(SqlValue::Text(until.to_rfc3339()));
        sql.push_str(&format!(" AND m.created_at <= ?{}", values.len()));
    }
    if let Some(tags) = &filters.tags {
        if !tags.is_empty() {
            let start = values.len() + 1;
            values.extend(tags.iter().map(|t| SqlValue::Text(t.clone())));
            let list = placeholders(tags.len(), start);
            values.push(SqlValue::Integer(tags.len() as i64));
            sql.push_str(&format!(
                " AND (SELECT COUNT(DISTINCT t.tag) FROM memory_tags t
                       WHERE t.memory_id = m.id AND t.tag IN ({list})) = ?{}",
                values.len()
            ));
        }
    }
    sql
}

fn parse_ts(raw: &str) -> std::result::Result<DateTime<Utc>, MemoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MemoryError::Internal(format!("bad timestamp {raw:?}: {e}")))
}

fn conversion_error(index: usize, err: MemoryError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(err))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(Some(dir.path().join("test.db")), 8).unwrap();
        (storage, dir)
    }

    fn draft(content: &str) -> MemoryDraft {
        MemoryDraft::new(content)
    }

    #[test]
    fn test_insert_and_get() {
        let (storage, _dir) = test_storage();
        let mut d = draft("The staging cluster uses blue/green deploys");
        d.kind = MemoryKind::Semantic;
        d.tags = vec!["infra".into(), "deploys".into()];
        d.importance = 0.8;

        let stored = storage.insert_memory(&d).unwrap();
        assert!(!stored.id.is_empty());
        assert_eq!(stored.kind, MemoryKind::Semantic);
        assert!(!stored.pinned);

        let fetched = storage.require_memory(&stored.id).unwrap();
        assert_eq!(fetched.content, d.content);
        let mut tags = fetched.tags.clone();
        tags.sort();
        assert_eq!(tags, vec!["deploys".to_string(), "infra".to_string()]);
    }

    #[test]
    fn test_insert_rejects_empty_content() {
        let (storage, _dir) = test_storage();
        let err = storage.insert_memory(&draft("   ")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_pin_unpin_idempotent() {
        let (storage, _dir) = test_storage();
        let stored = storage.insert_memory(&draft("pin me")).unwrap();

        let pinned = storage.set_pinned(&stored.id, true).unwrap();
        assert!(pinned.pinned);
        let pinned_again = storage.set_pinned(&stored.id, true).unwrap();
        assert!(pinned_again.pinned);

        let unpinned = storage.set_pinned(&stored.id, false).unwrap();
        assert!(!unpinned.pinned);
    }

    #[test]
    fn test_pin_unknown_id_is_not_found() {
        let (storage, _dir) = test_storage();
        let err = storage.set_pinned("nope", true).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn test_forget_soft_unpins_and_demotes() {
        let (storage, _dir) = test_storage();
        let stored = storage.insert_memory(&draft("demote me")).unwrap();
        storage.set_pinned(&stored.id, true).unwrap();

        storage.forget_soft(&stored.id).unwrap();
        let after = storage.require_memory(&stored.id).unwrap();
        assert!(!after.pinned);
        assert!(after.demoted);

        let feedback = storage.feedback_for(&stored.id).unwrap();
        assert_eq!(feedback.len(), 1);
        assert_eq!(feedback[0].event, FeedbackKind::Neglected);
    }

    #[test]
    fn test_forget_hard_cascades() {
        let (storage, _dir) = test_storage();
        let a = storage.insert_memory(&draft("memory a")).unwrap();
        let b = storage.insert_memory(&draft("memory b")).unwrap();
        storage
            .add_link(&a.id, &b.id, LinkKind::DerivedFrom)
            .unwrap();
        storage
            .add_feedback(&a.id, FeedbackKind::Helpful, 1.0)
            .unwrap();
        storage
            .upsert_embedding(&a.id, &[0.5; 8], "test-model")
            .unwrap();

        storage.forget_hard(&a.id).unwrap();
        assert!(storage.get_memory(&a.id).unwrap().is_none());
        assert!(storage.get_embedding(&a.id).unwrap().is_none());
        assert!(storage.links_for(&b.id).unwrap().is_empty());

        let orphans: i64 = storage
            .get_one(
                "SELECT COUNT(*) FROM feedback_events WHERE memory_id = ?1",
                &[&a.id.as_str()],
                |row| row.get(0),
            )
            .unwrap()
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_embedding_roundtrip_and_metadata() {
        let (storage, _dir) = test_storage();
        let stored = storage.insert_memory(&draft("embed me")).unwrap();
        let vector = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8];

        storage
            .upsert_embedding(&stored.id, &vector, "test-model")
            .unwrap();

        let after = storage.require_memory(&stored.id).unwrap();
        assert!(after.has_embedding);
        assert_eq!(after.embedding_model.as_deref(), Some("test-model"));

        let emb = storage.get_embedding(&stored.id).unwrap().unwrap();
        assert_eq!(emb.dimensions, 8);
        assert_eq!(emb.vector.len(), 8);
        assert!((emb.vector[3] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_text_search_matches() {
        let (storage, _dir) = test_storage();
        let a = storage
            .insert_memory(&draft("Rust ownership prevents data races"))
            .unwrap();
        storage
            .insert_memory(&draft("The cafeteria serves lunch at noon"))
            .unwrap();

        let hits = storage
            .search_text("\"rust\"", &SearchFilters::default(), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, a.id);
    }

    #[test]
    fn test_text_search_kind_filter() {
        let (storage, _dir) = test_storage();
        let mut d = draft("postgres connection pooling");
        d.kind = MemoryKind::Semantic;
        storage.insert_memory(&d).unwrap();
        let mut d2 = draft("postgres upgrade scheduled");
        d2.kind = MemoryKind::Working;
        storage.insert_memory(&d2).unwrap();

        let filters = SearchFilters {
            kinds: Some(vec![MemoryKind::Working]),
            ..SearchFilters::default()
        };
        let hits = storage.search_text("\"postgres\"", &filters, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.kind, MemoryKind::Working);
    }

    #[test]
    fn test_vector_search_threshold_and_order() {
        let (storage, _dir) = test_storage();
        let a = storage.insert_memory(&draft("close neighbor")).unwrap();
        let b = storage.insert_memory(&draft("far neighbor")).unwrap();

        let base = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let near = [0.9, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let far = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.1, 0.9];
        storage.upsert_embedding(&a.id, &near, "test").unwrap();
        storage.upsert_embedding(&b.id, &far, "test").unwrap();

        let hits = storage
            .search_vector(&base, &SearchFilters::default(), 10, 0.5)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, a.id);
        assert!(hits[0].1 > 0.9);
    }

    #[test]
    fn test_vector_search_dimension_mismatch() {
        let (storage, _dir) = test_storage();
        let err = storage
            .search_vector(&[1.0, 0.0], &SearchFilters::default(), 10, 0.5)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_cleanup_batch_protects_pinned() {
        let (storage, _dir) = test_storage();
        let keep = storage.insert_memory(&draft("pinned survivor")).unwrap();
        let drop1 = storage.insert_memory(&draft("stale one")).unwrap();
        let drop2 = storage.insert_memory(&draft("stale two")).unwrap();
        storage.set_pinned(&keep.id, true).unwrap();

        let (hard, soft) = storage
            .execute_cleanup_batch(
                &[keep.id.clone(), drop1.id.clone()],
                &[drop2.id.clone()],
                Utc::now(),
            )
            .unwrap();
        // Pinned row is excluded by the DELETE predicate
        assert_eq!(hard, 1);
        assert_eq!(soft, 1);
        assert!(storage.get_memory(&keep.id).unwrap().is_some());
        assert!(storage.get_memory(&drop1.id).unwrap().is_none());
        assert!(storage.require_memory(&drop2.id).unwrap().demoted);
    }

    #[test]
    fn test_record_access_updates_timestamp() {
        let (storage, _dir) = test_storage();
        let stored = storage.insert_memory(&draft("touch me")).unwrap();
        assert!(stored.last_accessed_at.is_none());

        let now = Utc::now();
        let n = storage.record_access(&[stored.id.clone()], now).unwrap();
        assert_eq!(n, 1);

        let after = storage.require_memory(&stored.id).unwrap();
        let accessed = after.last_accessed_at.unwrap();
        assert!((accessed - now).num_seconds().abs() < 2);
        assert!(after.created_at <= accessed);
    }

    #[test]
    fn test_feedback_is_append_only_and_ordered() {
        let (storage, _dir) = test_storage();
        let stored = storage.insert_memory(&draft("feedback target")).unwrap();
        storage
            .add_feedback(&stored.id, FeedbackKind::Used, 1.0)
            .unwrap();
        storage
            .add_feedback(&stored.id, FeedbackKind::Helpful, 0.5)
            .unwrap();

        let events = storage.feedback_for(&stored.id).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, FeedbackKind::Used);
        assert_eq!(events[1].event, FeedbackKind::Helpful);
    }

    #[test]
    fn test_optimize_report() {
        let (storage, _dir) = test_storage();
        let report = storage.optimize(true, true).unwrap();
        assert!(report.analyzed);
        assert!(report.indexes_created);
        assert!(report.wal_checkpointed);
    }

    #[test]
    fn test_wal_checkpoint() {
        let (storage, _dir) = test_storage();
        storage.insert_memory(&draft("flush me")).unwrap();
        storage.wal_checkpoint().unwrap();
    }

    #[test]
    fn test_concurrent_pins_converge() {
        let (storage, _dir) = test_storage();
        let storage = std::sync::Arc::new(storage);
        let stored = storage.insert_memory(&draft("contended")).unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let storage = storage.clone();
            let id = stored.id.clone();
            handles.push(std::thread::spawn(move || storage.set_pinned(&id, true)));
        }
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
        assert!(storage.require_memory(&stored.id).unwrap().pinned);
    }
}
