//! Configuration
//!
//! Read once at startup from `MNEMO_*` environment variables. Every knob has
//! a default so a bare `mnemo-mcp` starts with the lightweight embedding
//! provider and a platform-local database.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{MemoryError, Result};
use crate::memory::MemoryKind;

// ============================================================================
// EMBEDDING
// ============================================================================

/// Which embedding provider backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingProviderKind {
    /// Deterministic local hashing provider; always available
    #[default]
    Lightweight,
    /// Local Ollama HTTP server
    Ollama,
    /// OpenRouter hosted API
    OpenRouter,
    /// No embeddings at all; recall degrades to text-only
    Disabled,
}

impl EmbeddingProviderKind {
    pub fn parse_name(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "lightweight" | "local" => Ok(Self::Lightweight),
            "ollama" => Ok(Self::Ollama),
            "openrouter" => Ok(Self::OpenRouter),
            "disabled" | "none" => Ok(Self::Disabled),
            other => Err(MemoryError::InvalidInput(format!(
                "unknown embedding provider: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    /// Index dimension D; provider outputs are fitted to this
    pub dimensions: usize,
    pub ollama_url: String,
    pub ollama_model: String,
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: String,
    /// LRU capacity of the text -> vector cache
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Lightweight,
            dimensions: 512,
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "nomic-embed-text".to_string(),
            openrouter_api_key: None,
            openrouter_model: "openai/text-embedding-3-small".to_string(),
            cache_capacity: 1000,
        }
    }
}

// ============================================================================
// SEARCH
// ============================================================================

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    /// Base hybrid weights before query-adaptive adjustment
    pub vector_weight: f32,
    pub text_weight: f32,
    /// Similarity floor for vector hits feeding the hybrid merge
    pub hybrid_vector_threshold: f32,
    /// Similarity floor for the strict vector-only path
    pub strict_vector_threshold: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
            vector_weight: 0.6,
            text_weight: 0.4,
            hybrid_vector_threshold: 0.5,
            strict_vector_threshold: 0.7,
        }
    }
}

// ============================================================================
// FORGETTING
// ============================================================================

/// Per-kind TTLs in hours; -1 means infinite
#[derive(Debug, Clone, Copy)]
pub struct KindTtls {
    pub working: i64,
    pub episodic: i64,
    pub semantic: i64,
    pub procedural: i64,
}

impl Default for KindTtls {
    fn default() -> Self {
        Self {
            working: 72,
            episodic: 720,
            semantic: -1,
            procedural: -1,
        }
    }
}

impl KindTtls {
    /// TTL in hours for a kind; `None` means infinite
    pub fn hours_for(&self, kind: MemoryKind) -> Option<f64> {
        let raw = match kind {
            MemoryKind::Working => self.working,
            MemoryKind::Episodic => self.episodic,
            MemoryKind::Semantic => self.semantic,
            MemoryKind::Procedural => self.procedural,
        };
        if raw < 0 {
            None
        } else {
            Some(raw as f64)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForgettingConfig {
    /// Weight of the age term
    pub age_weight: f64,
    /// Weight of the disuse term
    pub usage_weight: f64,
    /// Weight of the (1 - importance) term
    pub importance_weight: f64,
    pub hard_threshold: f64,
    pub soft_threshold: f64,
    pub review_threshold: f64,
    /// Maximum rows mutated per cleanup transaction
    pub max_batch_size: usize,
    pub ttls: KindTtls,
    /// Half-life of the access-recency decay, in hours
    pub usage_half_life_hours: f64,
}

impl Default for ForgettingConfig {
    fn default() -> Self {
        Self {
            age_weight: 0.4,
            usage_weight: 0.3,
            importance_weight: 0.3,
            hard_threshold: 0.8,
            soft_threshold: 0.6,
            review_threshold: 0.4,
            max_batch_size: 1000,
            ttls: KindTtls::default(),
            usage_half_life_hours: 168.0,
        }
    }
}

impl ForgettingConfig {
    /// Renormalize the score weights to sum to 1, warning on drift.
    pub fn normalized(mut self) -> Self {
        let sum = self.age_weight + self.usage_weight + self.importance_weight;
        if sum <= 0.0 {
            tracing::warn!("forget weights sum to {sum}, resetting to defaults");
            let d = Self::default();
            self.age_weight = d.age_weight;
            self.usage_weight = d.usage_weight;
            self.importance_weight = d.importance_weight;
        } else if (sum - 1.0).abs() > 1e-9 {
            tracing::warn!("forget weights sum to {sum}, renormalizing");
            self.age_weight /= sum;
            self.usage_weight /= sum;
            self.importance_weight /= sum;
        }
        self
    }
}

// ============================================================================
// SCHEDULER / QUEUE
// ============================================================================

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub cleanup_interval: Duration,
    pub monitoring_interval: Duration,
    pub health_interval: Duration,
    pub max_concurrent_jobs: usize,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub job_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(600),
            monitoring_interval: Duration::from_secs(60),
            health_interval: Duration::from_secs(30),
            max_concurrent_jobs: 3,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            job_timeout: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_workers: usize,
    pub default_timeout: Duration,
    pub default_max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            default_timeout: Duration::from_secs(30),
            default_max_retries: 3,
        }
    }
}

// ============================================================================
// TOP-LEVEL CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    /// Database file path; `None` selects the platform data directory
    pub db_path: Option<PathBuf>,
    pub server_name: String,
    pub http_port: u16,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub forgetting: ForgettingConfig,
    pub scheduler: SchedulerConfig,
    pub queue: QueueConfig,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            server_name: "mnemo".to_string(),
            http_port: 4100,
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            forgetting: ForgettingConfig::default(),
            scheduler: SchedulerConfig::default(),
            queue: QueueConfig::default(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env_var(key) {
        Some(raw) => raw.parse().map_err(|_| {
            MemoryError::InvalidInput(format!("invalid value for {key}: {raw:?}"))
        }),
        None => Ok(default),
    }
}

impl Config {
    /// Read configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let embedding = EmbeddingConfig {
            provider: match env_var("MNEMO_EMBEDDING_PROVIDER") {
                Some(raw) => EmbeddingProviderKind::parse_name(&raw)?,
                None => EmbeddingProviderKind::Lightweight,
            },
            dimensions: env_parse("MNEMO_EMBEDDING_DIM", defaults.embedding.dimensions)?,
            ollama_url: env_var("MNEMO_OLLAMA_URL").unwrap_or(defaults.embedding.ollama_url),
            ollama_model: env_var("MNEMO_OLLAMA_MODEL").unwrap_or(defaults.embedding.ollama_model),
            openrouter_api_key: env_var("OPENROUTER_API_KEY"),
            openrouter_model: env_var("MNEMO_OPENROUTER_MODEL")
                .unwrap_or(defaults.embedding.openrouter_model),
            cache_capacity: env_parse("MNEMO_EMBEDDING_CACHE", defaults.embedding.cache_capacity)?,
        };

        let search = SearchConfig {
            default_limit: env_parse("MNEMO_DEFAULT_LIMIT", defaults.search.default_limit)?,
            max_limit: env_parse("MNEMO_MAX_LIMIT", defaults.search.max_limit)?,
            ..defaults.search
        };

        let forgetting = ForgettingConfig {
            age_weight: env_parse("MNEMO_FORGET_AGE_WEIGHT", defaults.forgetting.age_weight)?,
            usage_weight: env_parse("MNEMO_FORGET_USAGE_WEIGHT", defaults.forgetting.usage_weight)?,
            importance_weight: env_parse(
                "MNEMO_FORGET_IMPORTANCE_WEIGHT",
                defaults.forgetting.importance_weight,
            )?,
            hard_threshold: env_parse("MNEMO_HARD_THRESHOLD", defaults.forgetting.hard_threshold)?,
            soft_threshold: env_parse("MNEMO_SOFT_THRESHOLD", defaults.forgetting.soft_threshold)?,
            review_threshold: env_parse(
                "MNEMO_REVIEW_THRESHOLD",
                defaults.forgetting.review_threshold,
            )?,
            max_batch_size: env_parse("MNEMO_CLEANUP_BATCH", defaults.forgetting.max_batch_size)?,
            ttls: KindTtls {
                working: env_parse("MNEMO_TTL_WORKING_HOURS", defaults.forgetting.ttls.working)?,
                episodic: env_parse("MNEMO_TTL_EPISODIC_HOURS", defaults.forgetting.ttls.episodic)?,
                semantic: env_parse("MNEMO_TTL_SEMANTIC_HOURS", defaults.forgetting.ttls.semantic)?,
                procedural: env_parse(
                    "MNEMO_TTL_PROCEDURAL_HOURS",
                    defaults.forgetting.ttls.procedural,
                )?,
            },
            usage_half_life_hours: env_parse(
                "MNEMO_USAGE_HALF_LIFE_HOURS",
                defaults.forgetting.usage_half_life_hours,
            )?,
        }
        .normalized();

        // Cleanup may not run more often than once a minute
        let cleanup_secs: u64 = env_parse("MNEMO_CLEANUP_INTERVAL_SECS", 600)?;
        let scheduler = SchedulerConfig {
            cleanup_interval: Duration::from_secs(cleanup_secs.max(60)),
            monitoring_interval: Duration::from_secs(env_parse(
                "MNEMO_MONITORING_INTERVAL_SECS",
                60,
            )?),
            health_interval: Duration::from_secs(env_parse("MNEMO_HEALTH_INTERVAL_SECS", 30)?),
            max_concurrent_jobs: env_parse(
                "MNEMO_MAX_CONCURRENT_JOBS",
                defaults.scheduler.max_concurrent_jobs,
            )?,
            retry_attempts: env_parse("MNEMO_JOB_RETRIES", defaults.scheduler.retry_attempts)?,
            retry_delay: Duration::from_millis(env_parse("MNEMO_JOB_RETRY_DELAY_MS", 1000)?),
            job_timeout: Duration::from_secs(env_parse("MNEMO_JOB_TIMEOUT_SECS", 300)?),
            shutdown_grace: defaults.scheduler.shutdown_grace,
        };

        let queue = QueueConfig {
            max_workers: env_parse("MNEMO_QUEUE_WORKERS", defaults.queue.max_workers)?,
            default_timeout: Duration::from_secs(env_parse("MNEMO_TASK_TIMEOUT_SECS", 30)?),
            default_max_retries: env_parse("MNEMO_TASK_RETRIES", defaults.queue.default_max_retries)?,
        };

        Ok(Self {
            db_path: env_var("MNEMO_DB_PATH").map(PathBuf::from),
            server_name: env_var("MNEMO_SERVER_NAME").unwrap_or(defaults.server_name),
            http_port: env_parse("MNEMO_HTTP_PORT", defaults.http_port)?,
            embedding,
            search,
            forgetting,
            scheduler,
            queue,
            log_level: env_var("MNEMO_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_file: env_var("MNEMO_LOG_FILE").map(PathBuf::from),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.search.default_limit, 10);
        assert_eq!(cfg.search.max_limit, 100);
        assert_eq!(cfg.embedding.dimensions, 512);
        assert_eq!(cfg.forgetting.max_batch_size, 1000);
        assert_eq!(cfg.scheduler.max_concurrent_jobs, 3);
    }

    #[test]
    fn test_ttl_infinite() {
        let ttls = KindTtls::default();
        assert_eq!(ttls.hours_for(MemoryKind::Working), Some(72.0));
        assert_eq!(ttls.hours_for(MemoryKind::Semantic), None);
        assert_eq!(ttls.hours_for(MemoryKind::Procedural), None);
    }

    #[test]
    fn test_forget_weights_renormalize() {
        let cfg = ForgettingConfig {
            age_weight: 0.8,
            usage_weight: 0.6,
            importance_weight: 0.6,
            ..ForgettingConfig::default()
        }
        .normalized();
        let sum = cfg.age_weight + cfg.usage_weight + cfg.importance_weight;
        assert!((sum - 1.0).abs() < 1e-9);
        assert!((cfg.age_weight - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!(
            EmbeddingProviderKind::parse_name("ollama").unwrap(),
            EmbeddingProviderKind::Ollama
        );
        assert_eq!(
            EmbeddingProviderKind::parse_name("NONE").unwrap(),
            EmbeddingProviderKind::Disabled
        );
        assert!(EmbeddingProviderKind::parse_name("cuda").is_err());
    }
}
