//! Observability
//!
//! Counters and timing aggregates, a structured error ring, and the
//! threshold-based performance alert monitor.

mod alerts;
mod errlog;
mod metrics;

pub use alerts::{
    Alert, AlertLevel, AlertMonitor, AlertThresholds, HealthSample, ThresholdPair,
};
pub use errlog::{ErrorCategory, ErrorEvent, ErrorLog, ErrorSeverity};
pub use metrics::{MetricsRegistry, MetricsSnapshot, TimerSnapshot};

/// Resident set size of this process in MB, when the platform exposes it.
pub fn process_rss_mb() -> Option<f64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("VmRSS:") {
                let kb: f64 = rest
                    .trim()
                    .trim_end_matches("kB")
                    .trim()
                    .parse()
                    .ok()?;
                return Some(kb / 1024.0);
            }
        }
        None
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_rss_readable_on_linux() {
        if cfg!(target_os = "linux") {
            let rss = process_rss_mb().expect("VmRSS should be readable");
            assert!(rss > 0.0);
        }
    }
}
