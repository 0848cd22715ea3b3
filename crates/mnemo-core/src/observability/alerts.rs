//! Performance Alerts
//!
//! Threshold checks over the health sample the monitoring job assembles:
//! response time, process memory, error rate, throughput, DB query time
//! and embedding-cache hit rate. Each metric has a warning and a critical
//! level; a per-metric cooldown suppresses flapping. Alerts live in a
//! bounded ring with resolve/acknowledge operations.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Warning/critical threshold pair for one metric
#[derive(Debug, Clone, Copy)]
pub struct ThresholdPair {
    pub warning: f64,
    pub critical: f64,
}

/// All monitored thresholds. For `throughput_per_min` and `cache_hit_pct`
/// LOW values are bad; for the rest HIGH values are bad.
#[derive(Debug, Clone)]
pub struct AlertThresholds {
    pub response_time_ms: ThresholdPair,
    pub memory_mb: ThresholdPair,
    pub error_rate: ThresholdPair,
    pub throughput_per_min: ThresholdPair,
    pub db_query_ms: ThresholdPair,
    pub cache_hit_pct: ThresholdPair,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            response_time_ms: ThresholdPair {
                warning: 500.0,
                critical: 2000.0,
            },
            memory_mb: ThresholdPair {
                warning: 512.0,
                critical: 1024.0,
            },
            error_rate: ThresholdPair {
                warning: 0.05,
                critical: 0.2,
            },
            throughput_per_min: ThresholdPair {
                warning: 1.0,
                critical: 0.1,
            },
            db_query_ms: ThresholdPair {
                warning: 100.0,
                critical: 500.0,
            },
            cache_hit_pct: ThresholdPair {
                warning: 50.0,
                critical: 10.0,
            },
        }
    }
}

/// Point-in-time health figures assembled by the monitoring job
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct HealthSample {
    pub avg_response_ms: f64,
    pub memory_mb: f64,
    pub error_rate: f64,
    pub throughput_per_min: f64,
    pub avg_db_query_ms: f64,
    pub cache_hit_pct: f64,
    /// Total operations observed so far; gates the low-is-bad checks so an
    /// idle process does not alert on zero throughput
    pub total_operations: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

/// One triggered alert
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: String,
    pub metric: String,
    pub level: AlertLevel,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub resolved: bool,
}

struct MonitorState {
    alerts: VecDeque<Alert>,
    last_fired: HashMap<String, Instant>,
}

/// Threshold monitor with flap suppression
pub struct AlertMonitor {
    thresholds: AlertThresholds,
    cooldown: Duration,
    capacity: usize,
    state: Mutex<MonitorState>,
}

impl Default for AlertMonitor {
    fn default() -> Self {
        Self::new(AlertThresholds::default(), Duration::from_secs(300))
    }
}

impl AlertMonitor {
    pub fn new(thresholds: AlertThresholds, cooldown: Duration) -> Self {
        Self {
            thresholds,
            cooldown,
            capacity: 128,
            state: Mutex::new(MonitorState {
                alerts: VecDeque::new(),
                last_fired: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Evaluate a sample, returning newly raised alerts.
    pub fn check(&self, sample: &HealthSample) -> Vec<Alert> {
        let mut candidates: Vec<(&str, f64, &ThresholdPair, bool)> = vec![
            (
                "response_time_ms",
                sample.avg_response_ms,
                &self.thresholds.response_time_ms,
                false,
            ),
            ("memory_mb", sample.memory_mb, &self.thresholds.memory_mb, false),
            ("error_rate", sample.error_rate, &self.thresholds.error_rate, false),
            (
                "db_query_ms",
                sample.avg_db_query_ms,
                &self.thresholds.db_query_ms,
                false,
            ),
        ];
        // Low-is-bad metrics only make sense once traffic exists
        if sample.total_operations >= 10 {
            candidates.push((
                "throughput_per_min",
                sample.throughput_per_min,
                &self.thresholds.throughput_per_min,
                true,
            ));
            candidates.push((
                "cache_hit_pct",
                sample.cache_hit_pct,
                &self.thresholds.cache_hit_pct,
                true,
            ));
        }

        let mut raised = Vec::new();
        let now = Instant::now();
        let mut state = self.lock();

        for (metric, value, pair, low_is_bad) in candidates {
            let breach = if low_is_bad {
                if value <= pair.critical {
                    Some((AlertLevel::Critical, pair.critical))
                } else if value <= pair.warning {
                    Some((AlertLevel::Warning, pair.warning))
                } else {
                    None
                }
            } else if value >= pair.critical {
                Some((AlertLevel::Critical, pair.critical))
            } else if value >= pair.warning {
                Some((AlertLevel::Warning, pair.warning))
            } else {
                None
            };

            let Some((level, threshold)) = breach else {
                continue;
            };

            // Cooldown window per metric keeps alerts from flapping
            if let Some(last) = state.last_fired.get(metric) {
                if now.duration_since(*last) < self.cooldown {
                    continue;
                }
            }
            state.last_fired.insert(metric.to_string(), now);

            let alert = Alert {
                id: Uuid::new_v4().to_string(),
                metric: metric.to_string(),
                level,
                value,
                threshold,
                message: format!(
                    "{metric} {} threshold breached: {value:.2} vs {threshold:.2}",
                    match level {
                        AlertLevel::Warning => "warning",
                        AlertLevel::Critical => "critical",
                    }
                ),
                triggered_at: Utc::now(),
                acknowledged: false,
                resolved: false,
            };
            match level {
                AlertLevel::Warning => tracing::warn!("{}", alert.message),
                AlertLevel::Critical => tracing::error!("{}", alert.message),
            }

            if state.alerts.len() >= self.capacity {
                state.alerts.pop_front();
            }
            state.alerts.push_back(alert.clone());
            raised.push(alert);
        }

        raised
    }

    /// Alerts not yet resolved, newest first.
    pub fn active(&self) -> Vec<Alert> {
        self.lock()
            .alerts
            .iter()
            .rev()
            .filter(|a| !a.resolved)
            .cloned()
            .collect()
    }

    /// Mark an alert resolved; false for unknown ids.
    pub fn resolve(&self, id: &str) -> bool {
        let mut state = self.lock();
        match state.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.resolved = true;
                true
            }
            None => false,
        }
    }

    /// Mark an alert acknowledged; false for unknown ids.
    pub fn acknowledge(&self, id: &str) -> bool {
        let mut state = self.lock();
        match state.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
