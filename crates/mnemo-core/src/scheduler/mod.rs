//! Batch Scheduler
//!
//! Single per-process scheduler for periodic jobs (cleanup, monitoring,
//! health checks). Jobs run once at start and then at their interval, with:
//!
//! - priority ordering of simultaneously-due jobs (lower number first)
//! - a concurrency cap; excess due jobs queue on the semaphore
//! - tick skipping (with a warning) while a previous run is still going
//! - exponential-backoff retries and a per-run timeout
//! - bounded-drain shutdown; leftover work is abandoned and logged

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;

use crate::config::SchedulerConfig;
use crate::observability::process_rss_mb;
use crate::storage::Storage;

/// Outcome of one handler invocation
pub type JobResult = std::result::Result<(), String>;

/// Boxed handler future
pub type JobFuture = Pin<Box<dyn Future<Output = JobResult> + Send>>;

/// Idempotent job handler; re-invoked per attempt
pub type JobHandler = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// A registered periodic job
pub struct JobSpec {
    pub name: String,
    pub interval: Duration,
    /// Lower number runs earlier when several jobs are due together
    pub priority: u8,
    pub handler: JobHandler,
}

impl JobSpec {
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        priority: u8,
        handler: impl Fn() -> JobFuture + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            interval,
            priority,
            handler: Arc::new(handler),
        }
    }
}

/// Per-job counters, snapshotted for external reads
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStats {
    pub runs: u64,
    pub failures: u64,
    pub retries: u64,
    pub consecutive_failures: u64,
    pub skipped_ticks: u64,
    pub last_error: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
}

type SharedStats = Arc<Mutex<HashMap<String, JobStats>>>;

fn lock_stats(stats: &SharedStats) -> std::sync::MutexGuard<'_, HashMap<String, JobStats>> {
    match stats.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Periodic job scheduler; build, register jobs, then `spawn`.
pub struct BatchScheduler {
    config: SchedulerConfig,
    jobs: Vec<JobSpec>,
    stats: SharedStats,
    storage: Option<Arc<Storage>>,
}

impl BatchScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            jobs: Vec::new(),
            stats: Arc::new(Mutex::new(HashMap::new())),
            storage: None,
        }
    }

    /// Attach a storage handle for the self health-check probe.
    pub fn with_storage(mut self, storage: Arc<Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn register(&mut self, spec: JobSpec) {
        lock_stats(&self.stats).insert(spec.name.clone(), JobStats::default());
        self.jobs.push(spec);
    }

    /// Start the scheduler loop on the runtime.
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let stats = self.stats.clone();
        let grace = self.config.shutdown_grace;
        let join = tokio::spawn(self.run(shutdown_rx));
        SchedulerHandle {
            shutdown: shutdown_tx,
            join,
            stats,
            grace,
        }
    }

    async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let BatchScheduler {
            config,
            jobs,
            stats,
            storage,
        } = self;
        if jobs.is_empty() {
            tracing::warn!("scheduler started with no jobs registered");
        }

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let running: Vec<Arc<AtomicBool>> = jobs
            .iter()
            .map(|_| Arc::new(AtomicBool::new(false)))
            .collect();
        // Everything is due immediately on start
        let start = tokio::time::Instant::now();
        let mut next_due: Vec<tokio::time::Instant> = jobs.iter().map(|_| start).collect();

        let mut join_set: JoinSet<()> = JoinSet::new();
        let mut tick = tokio::time::interval(Duration::from_millis(200));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                Some(_) = join_set.join_next(), if !join_set.is_empty() => {}
                _ = tick.tick() => {
                    let now = tokio::time::Instant::now();
                    let mut due: Vec<usize> =
                        (0..jobs.len()).filter(|&i| next_due[i] <= now).collect();
                    due.sort_by_key(|&i| jobs[i].priority);

                    for i in due {
                        next_due[i] = now + jobs[i].interval;
                        if running[i].load(Ordering::SeqCst) {
                            tracing::warn!(
                                "job '{}' still running at its tick; skipping",
                                jobs[i].name
                            );
                            lock_stats(&stats)
                                .entry(jobs[i].name.clone())
                                .or_default()
                                .skipped_ticks += 1;
                            continue;
                        }
                        running[i].store(true, Ordering::SeqCst);
                        join_set.spawn(run_job(
                            jobs[i].name.clone(),
                            jobs[i].handler.clone(),
                            config.clone(),
                            semaphore.clone(),
                            running[i].clone(),
                            stats.clone(),
                            storage.clone(),
                        ));
                    }
                }
            }
        }

        // Drain with a bounded wait, then abandon what is left
        let deadline = tokio::time::Instant::now() + config.shutdown_grace;
        while !join_set.is_empty() {
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "abandoning {} job(s) still running after shutdown grace",
                        join_set.len()
                    );
                    join_set.abort_all();
                    break;
                }
            }
        }
        tracing::info!("scheduler stopped");
    }
}

/// One scheduled run: timeout, retry with backoff, stats bookkeeping.
async fn run_job(
    name: String,
    handler: JobHandler,
    config: SchedulerConfig,
    semaphore: Arc<Semaphore>,
    running: Arc<AtomicBool>,
    stats: SharedStats,
    storage: Option<Arc<Storage>>,
) {
    // Hold the flag until done even if the permit takes a while
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            running.store(false, Ordering::SeqCst);
            return;
        }
    };

    let mut attempt = 0u32;
    let outcome = loop {
        let result = tokio::time::timeout(config.job_timeout, (handler)()).await;
        let error = match result {
            Ok(Ok(())) => break Ok(()),
            Ok(Err(e)) => e,
            Err(_) => format!("timed out after {:?}", config.job_timeout),
        };

        if attempt >= config.retry_attempts {
            break Err(error);
        }
        let delay = config
            .retry_delay
            .checked_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
            .unwrap_or(config.retry_delay);
        tracing::warn!("job '{name}' failed (attempt {}): {error}; retrying in {delay:?}", attempt + 1);
        lock_stats(&stats).entry(name.clone()).or_default().retries += 1;
        tokio::time::sleep(delay).await;
        attempt += 1;
    };

    let consecutive = {
        let mut guard = lock_stats(&stats);
        let entry = guard.entry(name.clone()).or_default();
        match &outcome {
            Ok(()) => {
                entry.runs += 1;
                entry.consecutive_failures = 0;
                entry.last_run_at = Some(Utc::now());
            }
            Err(error) => {
                entry.failures += 1;
                entry.consecutive_failures += 1;
                entry.last_error = Some(error.clone());
                tracing::error!("job '{name}' failed permanently: {error}");
            }
        }
        entry.consecutive_failures
    };

    // Repeated permanent failures trigger a self health-check
    if consecutive > (config.retry_attempts as u64) * 2 {
        self_health_check(&name, storage.as_deref());
    }

    running.store(false, Ordering::SeqCst);
}

fn self_health_check(job: &str, storage: Option<&Storage>) {
    tracing::warn!("job '{job}' keeps failing; running self health-check");
    if let Some(storage) = storage {
        match storage.liveness() {
            Ok(()) => tracing::info!("storage liveness: ok"),
            Err(e) => tracing::error!("storage liveness probe failed: {e}"),
        }
    }
    if let Some(rss) = process_rss_mb() {
        if rss > 512.0 {
            tracing::warn!("memory pressure: process RSS is {rss:.0} MB");
        } else {
            tracing::info!("process RSS: {rss:.0} MB");
        }
    }
}

// ============================================================================
// HANDLE
// ============================================================================

/// Running scheduler handle; stop() signals shutdown and waits for drain.
pub struct SchedulerHandle {
    shutdown: broadcast::Sender<()>,
    join: tokio::task::JoinHandle<()>,
    stats: SharedStats,
    grace: Duration,
}

impl SchedulerHandle {
    /// Copy out the per-job counters.
    pub fn snapshot(&self) -> HashMap<String, JobStats> {
        lock_stats(&self.stats).clone()
    }

    /// Signal shutdown and wait for the loop (which itself bounds the
    /// drain) to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let wait = self.grace + Duration::from_secs(1);
        if tokio::time::timeout(wait, self.join).await.is_err() {
            tracing::warn!("scheduler did not stop within {wait:?}");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
