//! Forgetting Policy Engine
//!
//! Scores every memory for forgettability and drives cleanup:
//!
//! ```text
//! f = a * age_factor + u * (1 - usage_factor) + i * (1 - importance)
//! ```
//!
//! - `age_factor`: age over the kind TTL, clipped to [0, 1]; infinite TTLs
//!   (semantic, procedural) contribute 0
//! - `usage_factor`: exponentially decayed recency of access
//! - pinned rows are exempt outright (score sentinel of negative infinity)
//!
//! Scores partition into hard-delete / soft-delete / review / retain bands.
//! Execution runs one transaction per bounded batch; dry-run computes the
//! same plan without mutating.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ForgettingConfig;
use crate::error::Result;
use crate::memory::MemoryKind;
use crate::storage::Storage;

// ============================================================================
// SCORING
// ============================================================================

/// Row projection needed to score a memory
#[derive(Debug, Clone)]
pub struct ForgetRow {
    pub id: String,
    pub kind: MemoryKind,
    pub importance: f64,
    pub pinned: bool,
    pub demoted: bool,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

/// What cleanup should do with a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupDecision {
    HardDelete,
    SoftDelete,
    Review,
    Retain,
}

/// Forget score for one row; pinned rows return negative infinity.
pub fn forget_score(config: &ForgettingConfig, row: &ForgetRow, now: DateTime<Utc>) -> f64 {
    if row.pinned {
        return f64::NEG_INFINITY;
    }

    let age_hours = ((now - row.created_at).num_seconds().max(0) as f64) / 3600.0;
    let age_factor = match config.ttls.hours_for(row.kind) {
        Some(ttl) if ttl > 0.0 => (age_hours / ttl).clamp(0.0, 1.0),
        Some(_) => 1.0,
        None => 0.0,
    };

    let accessed = row.last_accessed_at.unwrap_or(row.created_at);
    let idle_hours = ((now - accessed).num_seconds().max(0) as f64) / 3600.0;
    let usage_factor = if config.usage_half_life_hours > 0.0 {
        (-std::f64::consts::LN_2 * idle_hours / config.usage_half_life_hours).exp()
    } else {
        0.0
    };

    let score = config.age_weight * age_factor
        + config.usage_weight * (1.0 - usage_factor)
        + config.importance_weight * (1.0 - row.importance);
    score.clamp(0.0, 1.0)
}

/// Band a score into a cleanup decision.
pub fn decide(config: &ForgettingConfig, score: f64, pinned: bool) -> CleanupDecision {
    if pinned || score.is_infinite() {
        return CleanupDecision::Retain;
    }
    if score >= config.hard_threshold {
        CleanupDecision::HardDelete
    } else if score >= config.soft_threshold {
        CleanupDecision::SoftDelete
    } else if score >= config.review_threshold {
        CleanupDecision::Review
    } else {
        CleanupDecision::Retain
    }
}

// ============================================================================
// PLANS AND STATS
// ============================================================================

/// Partition of candidate ids produced by a planning pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupPlan {
    pub hard_delete: Vec<String>,
    pub soft_delete: Vec<String>,
    pub review: Vec<String>,
    pub scanned: usize,
    pub mean_forget_score: f64,
}

impl CleanupPlan {
    pub fn forget_candidates(&self) -> usize {
        self.hard_delete.len() + self.soft_delete.len()
    }
}

/// Result of executing (or dry-running) a plan
#[derive(Debug, Clone, Serialize)]
pub struct CleanupOutcome {
    pub plan: CleanupPlan,
    pub hard_deleted: usize,
    pub soft_deleted: usize,
    pub dry_run: bool,
    pub duration_ms: u64,
}

/// Aggregates for the `forgetting_stats` tool
#[derive(Debug, Clone, Serialize)]
pub struct ForgettingStats {
    pub total_memories: i64,
    pub pinned: i64,
    pub forget_candidates: usize,
    pub review_candidates: usize,
    pub mean_forget_score: f64,
    pub by_kind: BTreeMap<String, i64>,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Policy engine bound to a storage handle
pub struct ForgettingEngine {
    storage: Arc<Storage>,
    config: ForgettingConfig,
}

impl ForgettingEngine {
    pub fn new(storage: Arc<Storage>, config: ForgettingConfig) -> Self {
        Self {
            storage,
            config: config.normalized(),
        }
    }

    pub fn config(&self) -> &ForgettingConfig {
        &self.config
    }

    fn scan_rows(&self) -> Result<Vec<ForgetRow>> {
        self.storage.get_all(
            "SELECT m.id, m.kind, m.importance, m.pinned, m.demoted,
                    m.created_at, m.last_accessed_at
             FROM memories m",
            &[],
            |row| {
                let kind_raw: String = row.get(1)?;
                let created_raw: String = row.get(5)?;
                let accessed_raw: Option<String> = row.get(6)?;
                Ok(ForgetRow {
                    id: row.get(0)?,
                    kind: MemoryKind::parse_name(&kind_raw).unwrap_or_default(),
                    importance: row.get(2)?,
                    pinned: row.get::<_, i64>(3)? != 0,
                    demoted: row.get::<_, i64>(4)? != 0,
                    created_at: parse_row_ts(&created_raw)?,
                    last_accessed_at: accessed_raw.as_deref().map(parse_row_ts).transpose()?,
                })
            },
        )
    }

    /// Compute a cleanup plan without mutating anything.
    pub fn plan(&self, now: DateTime<Utc>) -> Result<CleanupPlan> {
        let rows = self.scan_rows()?;
        let mut plan = CleanupPlan {
            scanned: rows.len(),
            ..CleanupPlan::default()
        };

        let mut score_sum = 0.0;
        let mut scored = 0usize;
        for row in &rows {
            let score = forget_score(&self.config, row, now);
            if score.is_finite() {
                score_sum += score;
                scored += 1;
            }
            match decide(&self.config, score, row.pinned) {
                CleanupDecision::HardDelete => plan.hard_delete.push(row.id.clone()),
                // A previously demoted row that reaches the soft band again
                // is already as soft-deleted as it gets
                CleanupDecision::SoftDelete if !row.demoted => {
                    plan.soft_delete.push(row.id.clone())
                }
                CleanupDecision::SoftDelete => {}
                CleanupDecision::Review => plan.review.push(row.id.clone()),
                CleanupDecision::Retain => {}
            }
        }
        if scored > 0 {
            plan.mean_forget_score = score_sum / scored as f64;
        }

        // Deterministic plans regardless of scan order
        plan.hard_delete.sort();
        plan.soft_delete.sort();
        plan.review.sort();
        Ok(plan)
    }

    /// Plan and, unless `dry_run`, execute in bounded single-transaction
    /// batches. Hard deletions cascade; soft deletions unpin, demote and
    /// append a `neglected` feedback event.
    pub fn run_cleanup(&self, dry_run: bool, now: DateTime<Utc>) -> Result<CleanupOutcome> {
        let started = Instant::now();
        let plan = self.plan(now)?;

        if dry_run {
            return Ok(CleanupOutcome {
                plan,
                hard_deleted: 0,
                soft_deleted: 0,
                dry_run: true,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        let batch = self.config.max_batch_size.max(1);
        let mut hard_deleted = 0usize;
        let mut soft_deleted = 0usize;

        let mut hard_iter = plan.hard_delete.chunks(batch);
        let mut soft_iter = plan.soft_delete.chunks(batch);
        loop {
            let hard = hard_iter.next().unwrap_or(&[]);
            let soft = soft_iter.next().unwrap_or(&[]);
            if hard.is_empty() && soft.is_empty() {
                break;
            }
            let (h, s) = self.storage.execute_cleanup_batch(hard, soft, now)?;
            hard_deleted += h;
            soft_deleted += s;
        }

        tracing::info!(
            "cleanup removed {hard_deleted} and demoted {soft_deleted} of {} scanned",
            plan.scanned
        );

        Ok(CleanupOutcome {
            plan,
            hard_deleted,
            soft_deleted,
            dry_run: false,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Aggregate statistics for the administrative surface.
    pub fn stats(&self, now: DateTime<Utc>) -> Result<ForgettingStats> {
        let rows = self.scan_rows()?;
        let mut by_kind: BTreeMap<String, i64> = BTreeMap::new();
        let mut pinned = 0i64;
        let mut score_sum = 0.0;
        let mut scored = 0usize;
        let mut forget_candidates = 0usize;
        let mut review_candidates = 0usize;

        for row in &rows {
            *by_kind.entry(row.kind.as_str().to_string()).or_default() += 1;
            if row.pinned {
                pinned += 1;
            }
            let score = forget_score(&self.config, row, now);
            if score.is_finite() {
                score_sum += score;
                scored += 1;
            }
            match decide(&self.config, score, row.pinned) {
                CleanupDecision::HardDelete | CleanupDecision::SoftDelete => {
                    forget_candidates += 1
                }
                CleanupDecision::Review => review_candidates += 1,
                CleanupDecision::Retain => {}
            }
        }

        Ok(ForgettingStats {
            total_memories: rows.len() as i64,
            pinned,
            forget_candidates,
            review_candidates,
            mean_forget_score: if scored > 0 {
                score_sum / scored as f64
            } else {
                0.0
            },
            by_kind,
        })
    }
}

fn parse_row_ts(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

// ============================================================================
// TESTS
// ============================================================================
