//! Metrics
//!
//! Per-operation counters and timing aggregates, snapshotted for the
//! `performance_stats` tool and the alert monitor. Writers take a short
//! lock; readers copy the whole map out.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Timing aggregate for one operation
#[derive(Debug, Clone, Copy, Default)]
struct TimerAggregate {
    count: u64,
    failures: u64,
    total_ms: u64,
    max_ms: u64,
}

/// Snapshot view of a timer
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TimerSnapshot {
    pub count: u64,
    pub failures: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

/// Copy-out of all metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub timers: BTreeMap<String, TimerSnapshot>,
    pub uptime_secs: u64,
}

impl MetricsSnapshot {
    /// Total operations recorded across all timers
    pub fn total_operations(&self) -> u64 {
        self.timers.values().map(|t| t.count).sum()
    }

    /// Failure fraction across all timers (0 when nothing ran)
    pub fn error_rate(&self) -> f64 {
        let total = self.total_operations();
        if total == 0 {
            return 0.0;
        }
        let failures: u64 = self.timers.values().map(|t| t.failures).sum();
        failures as f64 / total as f64
    }

    /// Mean duration across all timers, weighted by call count
    pub fn avg_response_ms(&self) -> f64 {
        let total = self.total_operations();
        if total == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .timers
            .values()
            .map(|t| t.avg_ms * t.count as f64)
            .sum();
        sum / total as f64
    }
}

/// Process-wide metrics registry
pub struct MetricsRegistry {
    counters: Mutex<BTreeMap<String, u64>>,
    timers: Mutex<BTreeMap<String, TimerAggregate>>,
    started_at: Instant,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(BTreeMap::new()),
            timers: Mutex::new(BTreeMap::new()),
            started_at: Instant::now(),
        }
    }

    /// Bump a named counter by one.
    pub fn incr(&self, name: &str) {
        self.incr_by(name, 1);
    }

    pub fn incr_by(&self, name: &str, amount: u64) {
        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *counters.entry(name.to_string()).or_default() += amount;
    }

    /// Record one timed operation.
    pub fn record_timing(&self, name: &str, elapsed: Duration, ok: bool) {
        let ms = elapsed.as_millis() as u64;
        let mut timers = match self.timers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let agg = timers.entry(name.to_string()).or_default();
        agg.count += 1;
        agg.total_ms += ms;
        agg.max_ms = agg.max_ms.max(ms);
        if !ok {
            agg.failures += 1;
        }
    }

    /// Copy out everything.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = match self.counters.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let timers = match self.timers.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        MetricsSnapshot {
            counters,
            timers: timers
                .into_iter()
                .map(|(name, agg)| {
                    (
                        name,
                        TimerSnapshot {
                            count: agg.count,
                            failures: agg.failures,
                            avg_ms: if agg.count > 0 {
                                agg.total_ms as f64 / agg.count as f64
                            } else {
                                0.0
                            },
                            max_ms: agg.max_ms,
                        },
                    )
                })
                .collect(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = MetricsRegistry::new();
        metrics.incr("recall");
        metrics.incr("recall");
        metrics.incr_by("remember", 3);

        let snap = metrics.snapshot();
        assert_eq!(snap.counters.get("recall"), Some(&2));
        assert_eq!(snap.counters.get("remember"), Some(&3));
    }

    #[test]
    fn test_timers_aggregate() {
        let metrics = MetricsRegistry::new();
        metrics.record_timing("recall", Duration::from_millis(10), true);
        metrics.record_timing("recall", Duration::from_millis(30), false);

        let snap = metrics.snapshot();
        let timer = &snap.timers["recall"];
        assert_eq!(timer.count, 2);
        assert_eq!(timer.failures, 1);
        assert_eq!(timer.max_ms, 30);
        assert!((timer.avg_ms - 20.0).abs() < 1e-9);
        assert!((snap.error_rate() - 0.5).abs() < 1e-9);
        assert!((snap.avg_response_ms() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = MetricsRegistry::new().snapshot();
        assert_eq!(snap.error_rate(), 0.0);
        assert_eq!(snap.avg_response_ms(), 0.0);
        assert_eq!(snap.total_operations(), 0);
    }
}
