//! Embedding Module
//!
//! Polymorphic embedding generation behind the [`EmbeddingProvider`]
//! capability trait, with three implementations: a local Ollama server, the
//! hosted OpenRouter API, and the built-in deterministic hashing provider.
//!
//! The [`EmbeddingService`] owns the provider chain: an LRU cache consulted
//! before any external call, the configured primary provider, and the
//! lightweight fallback that is always available. Provider outputs are
//! fitted (truncate/pad + L2 renormalize) to the configured index
//! dimension so the vector index stays single-dimension.

mod lightweight;
mod ollama;
mod openrouter;

pub use lightweight::{
    is_technical_term, stable_hash, LightweightProvider, LIGHTWEIGHT_DIMENSIONS,
    LIGHTWEIGHT_MODEL, TECHNICAL_TERMS,
};
pub use ollama::OllamaProvider;
pub use openrouter::OpenRouterProvider;

use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};

// ============================================================================
// ERRORS
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// No provider configured, or the whole chain is down
    #[error("embedding unavailable: {0}")]
    Unavailable(String),
    /// Provider call failed
    #[error("embedding request failed: {0}")]
    Request(String),
    /// Invalid input (empty text)
    #[error("invalid embedding input: {0}")]
    InvalidInput(String),
}

// ============================================================================
// PROVIDER CAPABILITY
// ============================================================================

/// A source of fixed-dimension text embeddings
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable label recorded on rows produced by this provider
    fn model_label(&self) -> &str;
    /// Native output dimension
    fn dimensions(&self) -> usize;
    /// Embed one text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

// ============================================================================
// VECTOR MATH AND ENCODING
// ============================================================================

/// Cosine similarity; 0 when dimensions mismatch or either norm is zero.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        dot / denominator
    } else {
        0.0
    }
}

/// Fit a vector to `dim`: truncate or zero-pad, then L2-normalize.
///
/// Truncation of a longer vector keeps the leading components, the same
/// shape used by Matryoshka-style models where the first N dimensions are
/// themselves a valid N-dimensional representation.
pub fn fit_dimensions(mut vector: Vec<f32>, dim: usize) -> Vec<f32> {
    if vector.len() > dim {
        vector.truncate(dim);
    } else if vector.len() < dim {
        vector.resize(dim, 0.0);
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

/// Encode a vector as a little-endian f32 blob for storage
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a little-endian f32 blob; `None` if the length is not a multiple
/// of four bytes.
pub fn vector_from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

// ============================================================================
// EMBEDDING SERVICE
// ============================================================================

/// A produced embedding with the model that made it
#[derive(Debug, Clone)]
pub struct EmbeddedVector {
    pub vector: Vec<f32>,
    pub model: String,
}

/// Provider chain + cache. Shared as `Arc<EmbeddingService>`.
pub struct EmbeddingService {
    primary: Option<Arc<dyn EmbeddingProvider>>,
    fallback: Option<LightweightProvider>,
    cache: Mutex<LruCache<u64, EmbeddedVector>>,
    dimensions: usize,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl EmbeddingService {
    /// Build the provider chain from configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let primary: Option<Arc<dyn EmbeddingProvider>> = match config.provider {
            EmbeddingProviderKind::Lightweight => None,
            EmbeddingProviderKind::Ollama => Some(Arc::new(
                OllamaProvider::new()
                    .with_url(config.ollama_url.clone())
                    .with_model(config.ollama_model.clone(), config.dimensions),
            )),
            EmbeddingProviderKind::OpenRouter => match &config.openrouter_api_key {
                Some(key) => Some(Arc::new(
                    OpenRouterProvider::new(key.clone())
                        .with_model(config.openrouter_model.clone(), config.dimensions),
                )),
                None => {
                    tracing::warn!("OPENROUTER_API_KEY not set; using lightweight embeddings");
                    None
                }
            },
            EmbeddingProviderKind::Disabled => {
                return Self::disabled(config.dimensions);
            }
        };

        let fallback = Some(LightweightProvider::new());
        Self::build(primary, fallback, config.dimensions, config.cache_capacity)
    }

    /// Lightweight-only service (default for tests and bare deployments).
    pub fn lightweight(dimensions: usize) -> Self {
        Self::build(None, Some(LightweightProvider::new()), dimensions, 1000)
    }

    /// Service with no provider at all; every `embed` is `Unavailable` and
    /// recall degrades to text-only scoring.
    pub fn disabled(dimensions: usize) -> Self {
        Self::build(None, None, dimensions, 8)
    }

    /// Custom chain, mainly for tests stubbing the primary.
    pub fn with_providers(
        primary: Option<Arc<dyn EmbeddingProvider>>,
        fallback: Option<LightweightProvider>,
        dimensions: usize,
    ) -> Self {
        Self::build(primary, fallback, dimensions, 1000)
    }

    fn build(
        primary: Option<Arc<dyn EmbeddingProvider>>,
        fallback: Option<LightweightProvider>,
        dimensions: usize,
        cache_capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            primary,
            fallback,
            cache: Mutex::new(LruCache::new(capacity)),
            dimensions,
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    /// Whether any provider can produce vectors
    pub fn is_available(&self) -> bool {
        self.primary.is_some() || self.fallback.is_some()
    }

    /// Configured index dimension D
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Cache hit rate in percent (100 when the cache is untouched)
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            100.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    /// Embed `text`, consulting the cache first, then the primary provider,
    /// then the lightweight fallback.
    pub async fn embed(&self, text: &str) -> Result<EmbeddedVector, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".into()));
        }
        if !self.is_available() {
            return Err(EmbeddingError::Unavailable(
                "no embedding provider configured".into(),
            ));
        }

        let key = stable_hash(text);
        if let Some(cached) = self.cache_get(key) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached);
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        let embedded = self.embed_uncached(text).await?;
        self.cache_put(key, embedded.clone());
        Ok(embedded)
    }

    async fn embed_uncached(&self, text: &str) -> Result<EmbeddedVector, EmbeddingError> {
        if let Some(primary) = &self.primary {
            match primary.embed(text).await {
                Ok(vector) => {
                    return Ok(EmbeddedVector {
                        vector: fit_dimensions(vector, self.dimensions),
                        model: primary.model_label().to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        "primary embedding provider {} failed: {e}; falling back",
                        primary.model_label()
                    );
                }
            }
        }

        match &self.fallback {
            Some(fallback) => Ok(EmbeddedVector {
                vector: fit_dimensions(fallback.embed_text(text), self.dimensions),
                model: fallback.model_label().to_string(),
            }),
            None => Err(EmbeddingError::Unavailable(
                "primary provider failed and no fallback configured".into(),
            )),
        }
    }

    fn cache_get(&self, key: u64) -> Option<EmbeddedVector> {
        match self.cache.lock() {
            Ok(mut cache) => cache.get(&key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&key).cloned(),
        }
    }

    fn cache_put(&self, key: u64, value: EmbeddedVector) {
        match self.cache.lock() {
            Ok(mut cache) => {
                cache.put(key, value);
            }
            Err(poisoned) => {
                poisoned.into_inner().put(key, value);
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
