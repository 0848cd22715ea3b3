//! Memory - The fundamental unit of storage and retrieval
//!
//! Each memory is a free-text fragment with typed metadata:
//! - Kind (governs TTL and forget weights)
//! - Importance and privacy scope
//! - Pin flag exempting it from automatic forgetting
//! - Tags, optional source, embedding metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};

// ============================================================================
// MEMORY KIND
// ============================================================================

/// Taxonomic class of a memory.
///
/// Working and episodic memories age out against a TTL; semantic and
/// procedural memories have no TTL and only decay through disuse.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// Scratch context for the current task
    Working,
    /// What happened - events, conversations, specific moments
    #[default]
    Episodic,
    /// What is known - facts, concepts, generalizations
    Semantic,
    /// How-to knowledge - skills, procedures
    Procedural,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Working => "working",
            MemoryKind::Episodic => "episodic",
            MemoryKind::Semantic => "semantic",
            MemoryKind::Procedural => "procedural",
        }
    }

    /// Parse from a string name; unknown names are rejected.
    pub fn parse_name(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "working" => Ok(MemoryKind::Working),
            "episodic" => Ok(MemoryKind::Episodic),
            "semantic" => Ok(MemoryKind::Semantic),
            "procedural" => Ok(MemoryKind::Procedural),
            other => Err(MemoryError::InvalidInput(format!(
                "unknown memory kind: {other}"
            ))),
        }
    }

    pub const ALL: [MemoryKind; 4] = [
        MemoryKind::Working,
        MemoryKind::Episodic,
        MemoryKind::Semantic,
        MemoryKind::Procedural,
    ];
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// PRIVACY SCOPE
// ============================================================================

/// Coarse privacy scope tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Private,
    Team,
    Public,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Private => "private",
            Privacy::Team => "team",
            Privacy::Public => "public",
        }
    }

    pub fn parse_name(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "private" => Ok(Privacy::Private),
            "team" => Ok(Privacy::Team),
            "public" => Ok(Privacy::Public),
            other => Err(MemoryError::InvalidInput(format!(
                "unknown privacy scope: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Privacy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// LINKS
// ============================================================================

/// Relation kind of a directed link between two memories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    CauseOf,
    DerivedFrom,
    Duplicates,
    Contradicts,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::CauseOf => "cause_of",
            LinkKind::DerivedFrom => "derived_from",
            LinkKind::Duplicates => "duplicates",
            LinkKind::Contradicts => "contradicts",
        }
    }

    pub fn parse_name(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cause_of" => Ok(LinkKind::CauseOf),
            "derived_from" => Ok(LinkKind::DerivedFrom),
            "duplicates" => Ok(LinkKind::Duplicates),
            "contradicts" => Ok(LinkKind::Contradicts),
            other => Err(MemoryError::InvalidInput(format!(
                "unknown link relation: {other}"
            ))),
        }
    }
}

/// A directed relation between two memories.
///
/// Links are resolved by id lookup at query time; no in-memory graph is
/// retained. Deleting either endpoint hard-deletes the link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation: LinkKind,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// FEEDBACK
// ============================================================================

/// Kind of an append-only feedback event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Used,
    Helpful,
    NotHelpful,
    Edited,
    Neglected,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::Used => "used",
            FeedbackKind::Helpful => "helpful",
            FeedbackKind::NotHelpful => "not_helpful",
            FeedbackKind::Edited => "edited",
            FeedbackKind::Neglected => "neglected",
        }
    }

    pub fn parse_name(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "used" => Ok(FeedbackKind::Used),
            "helpful" => Ok(FeedbackKind::Helpful),
            "not_helpful" => Ok(FeedbackKind::NotHelpful),
            "edited" => Ok(FeedbackKind::Edited),
            "neglected" => Ok(FeedbackKind::Neglected),
            other => Err(MemoryError::InvalidInput(format!(
                "unknown feedback event: {other}"
            ))),
        }
    }
}

/// Appended usage signal; never mutated after insert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub memory_id: String,
    pub event: FeedbackKind,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// MEMORY
// ============================================================================

/// A persisted memory row with its tags and embedding metadata
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Taxonomic class
    pub kind: MemoryKind,
    /// The memorized text (non-empty UTF-8)
    pub content: String,
    /// Importance in [0, 1]
    pub importance: f64,
    /// Privacy scope
    pub privacy: Privacy,
    /// Pinned memories are exempt from automatic forgetting
    pub pinned: bool,
    /// Set by a soft delete; demoted rows are hard-delete candidates
    pub demoted: bool,
    /// Tags for filtering
    pub tags: Vec<String>,
    /// Optional origin label
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Updated best-effort on recall hits
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Whether an embedding row exists for this memory
    pub has_embedding: bool,
    /// Which model produced the embedding
    pub embedding_model: Option<String>,
}

impl Memory {
    /// Age relative to `now`, never negative
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        ((now - self.created_at).num_seconds().max(0) as f64) / 3600.0
    }
}

// ============================================================================
// DRAFT (INSERT INPUT)
// ============================================================================

/// Input for creating a new memory.
///
/// Uses `deny_unknown_fields` so unknown fields are rejected at the tool
/// boundary instead of being silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryDraft {
    /// The text to remember
    pub content: String,
    /// Taxonomic class (default: episodic)
    #[serde(default)]
    pub kind: MemoryKind,
    /// Importance in [0, 1] (default: 0.5)
    #[serde(default = "default_importance")]
    pub importance: f64,
    /// Privacy scope (default: private)
    #[serde(default)]
    pub privacy: Privacy,
    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,
    /// Optional origin label
    #[serde(default)]
    pub source: Option<String>,
}

fn default_importance() -> f64 {
    0.5
}

impl Default for MemoryDraft {
    fn default() -> Self {
        Self {
            content: String::new(),
            kind: MemoryKind::default(),
            importance: 0.5,
            privacy: Privacy::default(),
            tags: Vec::new(),
            source: None,
        }
    }
}

impl MemoryDraft {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Validate the semantic invariants before insert.
    pub fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(MemoryError::InvalidInput(
                "content cannot be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.importance) {
            return Err(MemoryError::InvalidInput(format!(
                "importance must be in [0, 1], got {}",
                self.importance
            )));
        }
        for tag in &self.tags {
            if tag.trim().is_empty() || tag.len() > 64 {
                return Err(MemoryError::InvalidInput(format!(
                    "tag must be 1-64 characters: {tag:?}"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
