//! Lightweight Deterministic Embeddings
//!
//! A feature-hashing provider that turns text into a fixed 512-dimension
//! vector with no model download and no network. It is the fallback for
//! every remote provider outage: always available, never fails, and
//! deterministic so identical text always lands on identical vectors.
//!
//! Tokens are hashed into signed buckets with a log-scaled term-frequency
//! weight; a curated set of technical terms is upweighted so short
//! code-adjacent queries keep their signal.

use async_trait::async_trait;

use super::{EmbeddingError, EmbeddingProvider};

/// Native dimension of the lightweight provider
pub const LIGHTWEIGHT_DIMENSIONS: usize = 512;

/// Stable model label recorded on rows produced by this provider
pub const LIGHTWEIGHT_MODEL: &str = "mnemo-hash-v1";

/// Upweight multiplier for curated technical terms
const TECH_TERM_BOOST: f32 = 2.5;

/// Curated technical vocabulary. Shared with the hybrid engine's
/// query analysis: a query consisting of exactly one of these tokens
/// is treated as a technical lookup.
pub const TECHNICAL_TERMS: &[&str] = &[
    "api", "async", "auth", "cache", "cli", "cors", "database", "db", "dns", "docker", "git",
    "graphql", "grpc", "http", "https", "json", "jwt", "kafka", "kubernetes", "linux", "mutex",
    "oauth", "postgres", "proto", "redis", "regex", "rust", "s3", "sdk", "socket", "sql",
    "sqlite", "ssl", "tcp", "thread", "tls", "toml", "udp", "uuid", "wasm", "webhook", "yaml",
];

/// Whether a token belongs to the curated technical vocabulary
pub fn is_technical_term(token: &str) -> bool {
    let lower = token.to_lowercase();
    TECHNICAL_TERMS.binary_search(&lower.as_str()).is_ok()
}

/// Stable FNV-1a hash; used for feature buckets and the service cache key.
pub fn stable_hash(text: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x1000_0000_01b3;
    let mut hash = FNV_OFFSET;
    for byte in text.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Deterministic hashing provider
#[derive(Debug, Clone, Default)]
pub struct LightweightProvider;

impl LightweightProvider {
    pub fn new() -> Self {
        Self
    }

    /// Embed synchronously; infallible.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; LIGHTWEIGHT_DIMENSIONS];

        let mut counts: std::collections::HashMap<String, u32> = std::collections::HashMap::new();
        for token in tokenize(text) {
            *counts.entry(token).or_default() += 1;
        }

        for (token, tf) in counts {
            let mut weight = 1.0 + (tf as f32).ln();
            if is_technical_term(&token) {
                weight *= TECH_TERM_BOOST;
            }
            let hash = stable_hash(&token);
            let bucket = (hash % LIGHTWEIGHT_DIMENSIONS as u64) as usize;
            let sign = if (hash >> 9) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign * weight;
        }

        // L2-normalize; all-zero stays all-zero (cosine treats it as 0)
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl EmbeddingProvider for LightweightProvider {
    fn model_label(&self) -> &str {
        LIGHTWEIGHT_MODEL
    }

    fn dimensions(&self) -> usize {
        LIGHTWEIGHT_DIMENSIONS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_text(text))
    }
}

// ============================================================================
// TESTS
// ============================================================================
