//! Database Migrations
//!
//! Schema migration definitions for the storage layer. The applied version
//! is recorded in the `meta` table; opening a database written by a newer
//! schema than this binary understands is refused.

use crate::error::{MemoryError, Result};

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: memories, tags, links, feedback, embeddings, FTS5",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Demotion tracking for soft-deleted rows",
        up: MIGRATION_V2_UP,
    },
];

/// Latest schema version this binary understands
pub const SCHEMA_VERSION: u32 = 2;

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL DEFAULT 'episodic',
    content TEXT NOT NULL CHECK (length(content) > 0),
    importance REAL NOT NULL DEFAULT 0.5
        CHECK (importance >= 0.0 AND importance <= 1.0),
    privacy TEXT NOT NULL DEFAULT 'private',
    pinned INTEGER NOT NULL DEFAULT 0,
    source TEXT,
    created_at TEXT NOT NULL,
    last_accessed_at TEXT,

    -- Embedding metadata (denormalized; the vector lives in memory_embeddings)
    has_embedding INTEGER NOT NULL DEFAULT 0,
    embedding_model TEXT
);

CREATE INDEX IF NOT EXISTS idx_memories_kind ON memories(kind);
CREATE INDEX IF NOT EXISTS idx_memories_pinned ON memories(pinned);
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);

CREATE TABLE IF NOT EXISTS memory_tags (
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    PRIMARY KEY (memory_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_tags_tag ON memory_tags(tag);

CREATE TABLE IF NOT EXISTS memory_links (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    relation TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_links_source ON memory_links(source_id);
CREATE INDEX IF NOT EXISTS idx_links_target ON memory_links(target_id);

CREATE TABLE IF NOT EXISTS feedback_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    event TEXT NOT NULL,
    score REAL NOT NULL DEFAULT 0.0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_feedback_memory ON feedback_events(memory_id);

-- Embeddings storage (binary little-endian f32 blob)
CREATE TABLE IF NOT EXISTS memory_embeddings (
    memory_id TEXT PRIMARY KEY REFERENCES memories(id) ON DELETE CASCADE,
    vector BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    model TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- FTS5 virtual table for full-text search over content
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    id,
    content,
    content='memories',
    content_rowid='rowid',
    tokenize='porter unicode61'
);

-- Triggers to keep FTS in sync
CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, id, content)
    VALUES (NEW.rowid, NEW.id, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content);
    INSERT INTO memories_fts(rowid, id, content)
    VALUES (NEW.rowid, NEW.id, NEW.content);
END;

INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', '1');
"#;

/// V2: soft deletes mark rows as demoted so cleanup can pick them up later
const MIGRATION_V2_UP: &str = r#"
ALTER TABLE memories ADD COLUMN demoted INTEGER NOT NULL DEFAULT 0;
CREATE INDEX IF NOT EXISTS idx_memories_demoted ON memories(demoted);

UPDATE meta SET value = '2' WHERE key = 'schema_version';
"#;

/// Read the schema version recorded in `meta` (0 for a fresh database)
pub fn current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let has_meta: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'meta'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n > 0)?;
    if !has_meta {
        return Ok(0);
    }
    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    Ok(version.and_then(|v| v.parse().ok()).unwrap_or(0))
}

/// Apply pending migrations, returning how many ran.
///
/// Refuses to touch a database recorded at a newer version than
/// [`SCHEMA_VERSION`].
pub fn apply_migrations(conn: &rusqlite::Connection) -> Result<u32> {
    let current = current_version(conn).map_err(MemoryError::from_sqlite)?;
    if current > SCHEMA_VERSION {
        return Err(MemoryError::Conflict(format!(
            "database schema v{current} is newer than supported v{SCHEMA_VERSION}"
        )));
    }

    let mut applied = 0;
    for migration in MIGRATIONS {
        if migration.version > current {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)
                .map_err(MemoryError::from_sqlite)?;
            // ALTER TABLE in a migration does not rewrite FTS content, so
            // keep the sync triggers as the single source of truth.
            conn.execute(
                "UPDATE meta SET value = ?1 WHERE key = 'schema_version'",
                [migration.version.to_string()],
            )
            .map_err(MemoryError::from_sqlite)?;
            applied += 1;
        }
    }

    Ok(applied)
}

// ============================================================================
// TESTS
// ============================================================================
