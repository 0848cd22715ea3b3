//! Structured Error Log
//!
//! Bounded ring of structured error events, mirrored to `tracing` at a
//! level matching the severity. The ring backs the `performance_stats`
//! surface; it is diagnostics, not an audit log.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Low => "low",
            ErrorSeverity::Medium => "medium",
            ErrorSeverity::High => "high",
            ErrorSeverity::Critical => "critical",
        }
    }
}

/// Which subsystem produced the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Database,
    Network,
    Validation,
    Auth,
    Performance,
    Memory,
    Search,
    Embedding,
    Cache,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Database => "database",
            ErrorCategory::Network => "network",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Performance => "performance",
            ErrorCategory::Memory => "memory",
            ErrorCategory::Search => "search",
            ErrorCategory::Embedding => "embedding",
            ErrorCategory::Cache => "cache",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

/// One recorded error
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub severity: ErrorSeverity,
    pub category: ErrorCategory,
    pub message: String,
    pub context: Option<String>,
    pub at: DateTime<Utc>,
}

/// Bounded in-memory error ring
pub struct ErrorLog {
    events: Mutex<VecDeque<ErrorEvent>>,
    capacity: usize,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(500)
    }
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity: capacity.max(1),
        }
    }

    /// Record an event, evicting the oldest at capacity.
    pub fn record(
        &self,
        severity: ErrorSeverity,
        category: ErrorCategory,
        message: impl Into<String>,
        context: Option<String>,
    ) {
        let event = ErrorEvent {
            severity,
            category,
            message: message.into(),
            context,
            at: Utc::now(),
        };

        match severity {
            ErrorSeverity::Low => {
                tracing::debug!(category = category.as_str(), "{}", event.message)
            }
            ErrorSeverity::Medium => {
                tracing::warn!(category = category.as_str(), "{}", event.message)
            }
            ErrorSeverity::High | ErrorSeverity::Critical => {
                tracing::error!(category = category.as_str(), "{}", event.message)
            }
        }

        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Most recent `n` events, newest first.
    pub fn recent(&self, n: usize) -> Vec<ErrorEvent> {
        let events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.iter().rev().take(n).cloned().collect()
    }

    /// Counts per severity.
    pub fn counts_by_severity(&self) -> Vec<(ErrorSeverity, usize)> {
        let events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        [
            ErrorSeverity::Low,
            ErrorSeverity::Medium,
            ErrorSeverity::High,
            ErrorSeverity::Critical,
        ]
        .into_iter()
        .map(|sev| (sev, events.iter().filter(|e| e.severity == sev).count()))
        .collect()
    }

    pub fn len(&self) -> usize {
        match self.events.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// TESTS
// ============================================================================
