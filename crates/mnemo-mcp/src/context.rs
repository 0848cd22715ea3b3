//! Application Context
//!
//! Wires the engine together once at startup: storage, embedding service,
//! search engines, forgetting policy, task queue and observability. Tools
//! borrow this through an `Arc`.

use std::sync::Arc;
use std::time::Duration;

use mnemo_core::{
    AlertMonitor, AlertThresholds, Config, EmbeddingService, ErrorLog, ForgettingEngine,
    HealthSample, HybridSearchEngine, MetricsRegistry, Result, Storage, TaskContext, TaskQueue,
    TextSearchEngine, VectorSearchEngine,
};
use mnemo_core::observability::process_rss_mb;

pub struct AppContext {
    pub config: Config,
    pub storage: Arc<Storage>,
    pub embeddings: Arc<EmbeddingService>,
    pub hybrid: Arc<HybridSearchEngine>,
    pub forgetting: Arc<ForgettingEngine>,
    pub queue: Arc<TaskQueue>,
    pub metrics: Arc<MetricsRegistry>,
    pub errors: Arc<ErrorLog>,
    pub alerts: Arc<AlertMonitor>,
}

impl AppContext {
    /// Build the full engine from configuration.
    pub fn initialize(config: Config) -> Result<Arc<Self>> {
        let storage = Arc::new(Storage::open(
            config.db_path.clone(),
            config.embedding.dimensions,
        )?);
        let embeddings = Arc::new(EmbeddingService::from_config(&config.embedding));

        let hybrid = Arc::new(HybridSearchEngine::new(
            TextSearchEngine::new(storage.clone()),
            VectorSearchEngine::new(storage.clone()),
            embeddings.clone(),
            config.search.clone(),
        ));
        let forgetting = Arc::new(ForgettingEngine::new(
            storage.clone(),
            config.forgetting.clone(),
        ));
        let queue = Arc::new(TaskQueue::new(config.queue.clone()));

        Ok(Arc::new(Self {
            storage,
            embeddings,
            hybrid,
            forgetting,
            queue,
            metrics: Arc::new(MetricsRegistry::new()),
            errors: Arc::new(ErrorLog::default()),
            alerts: Arc::new(AlertMonitor::new(
                AlertThresholds::default(),
                Duration::from_secs(300),
            )),
            config,
        }))
    }

    /// Handles the task workers need.
    pub fn worker_context(&self) -> Arc<TaskContext> {
        Arc::new(TaskContext {
            storage: self.storage.clone(),
            embeddings: self.embeddings.clone(),
        })
    }

    /// Assemble the health sample the monitoring job and
    /// `performance_stats` both report.
    pub fn health_sample(&self) -> HealthSample {
        let snapshot = self.metrics.snapshot();
        let queue = self.queue.stats();
        let uptime_min = (snapshot.uptime_secs as f64 / 60.0).max(1.0 / 60.0);
        HealthSample {
            avg_response_ms: snapshot.avg_response_ms(),
            memory_mb: process_rss_mb().unwrap_or(0.0),
            error_rate: snapshot.error_rate(),
            throughput_per_min: snapshot.total_operations() as f64 / uptime_min,
            avg_db_query_ms: snapshot
                .timers
                .get("db.liveness")
                .map(|t| t.avg_ms)
                .unwrap_or(0.0),
            cache_hit_pct: self.embeddings.cache_hit_rate(),
            total_operations: snapshot.total_operations() + queue.completed,
        }
    }
}
