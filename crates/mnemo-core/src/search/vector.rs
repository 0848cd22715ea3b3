//! Vector Search
//!
//! HNSW index over memory embeddings via USearch, plus the engine wrapper
//! that joins index hits back to memory rows with predicate filters.
//!
//! The index is process-local and rebuilt from the stored blobs at open;
//! the database remains the single source of truth.

use std::collections::HashMap;
use std::sync::Arc;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::{ErrorKind, MemoryError, Result};
use crate::memory::Memory;
use crate::search::SearchFilters;
use crate::storage::Storage;

/// HNSW connectivity parameter (higher = better recall, more memory)
const CONNECTIVITY: usize = 16;
/// Expansion factor for index building
const EXPANSION_ADD: usize = 128;
/// Expansion factor for search
const EXPANSION_SEARCH: usize = 64;

// ============================================================================
// VECTOR INDEX
// ============================================================================

/// In-process approximate-nearest-neighbor index keyed by memory id
pub struct VectorIndex {
    index: Index,
    dimensions: usize,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    next_id: u64,
}

impl VectorIndex {
    /// Create an empty index of the given dimension.
    pub fn with_dimensions(dimensions: usize) -> Result<Self> {
        let options = IndexOptions {
            dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: CONNECTIVITY,
            expansion_add: EXPANSION_ADD,
            expansion_search: EXPANSION_SEARCH,
            multi: false,
        };
        let index = Index::new(&options)
            .map_err(|e| MemoryError::Internal(format!("vector index creation failed: {e}")))?;
        Ok(Self {
            index,
            dimensions,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            next_id: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn contains(&self, key: &str) -> bool {
        self.key_to_id.contains_key(key)
    }

    fn reserve(&self, capacity: usize) -> Result<()> {
        self.index
            .reserve(capacity)
            .map_err(|e| MemoryError::Internal(format!("vector index reserve failed: {e}")))
    }

    /// Add or replace a vector under a memory id.
    pub fn add(&mut self, key: &str, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(MemoryError::InvalidInput(format!(
                "vector has {} dims, index expects {}",
                vector.len(),
                self.dimensions
            )));
        }

        if let Some(&existing) = self.key_to_id.get(key) {
            self.index
                .remove(existing)
                .map_err(|e| MemoryError::Internal(format!("vector index update failed: {e}")))?;
            self.reserve(self.index.size() + 1)?;
            self.index
                .add(existing, vector)
                .map_err(|e| MemoryError::Internal(format!("vector index update failed: {e}")))?;
            return Ok(());
        }

        // usearch requires reserved capacity before add
        if self.index.size() >= self.index.capacity() {
            let new_capacity = std::cmp::max(self.index.capacity() * 2, 16);
            self.reserve(new_capacity)?;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.index
            .add(id, vector)
            .map_err(|e| MemoryError::Internal(format!("vector index add failed: {e}")))?;
        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());
        Ok(())
    }

    /// Remove a vector; returns whether it existed.
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        match self.key_to_id.remove(key) {
            Some(id) => {
                self.id_to_key.remove(&id);
                self.index
                    .remove(id)
                    .map_err(|e| MemoryError::Internal(format!("vector index remove failed: {e}")))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Nearest neighbors as (memory id, cosine similarity), best first.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(String, f32)>> {
        if query.len() != self.dimensions {
            return Err(MemoryError::InvalidInput(format!(
                "query has {} dims, index expects {}",
                query.len(),
                self.dimensions
            )));
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let matches = self
            .index
            .search(query, limit)
            .map_err(|e| MemoryError::Internal(format!("vector search failed: {e}")))?;

        let mut results = Vec::with_capacity(matches.keys.len());
        for (key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            if let Some(memory_id) = self.id_to_key.get(key) {
                // Cosine distance -> similarity
                results.push((memory_id.clone(), 1.0 - distance));
            }
        }
        Ok(results)
    }
}

// ============================================================================
// VECTOR SEARCH ENGINE
// ============================================================================

/// Engine wrapper joining index hits to rows with filters and a threshold
pub struct VectorSearchEngine {
    storage: Arc<Storage>,
}

impl VectorSearchEngine {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Top-K rows by cosine similarity, clamped to [0, 1].
    ///
    /// In lenient mode a dimension-mismatched query yields an empty result;
    /// strict callers get the `InvalidInput` back.
    pub fn search(
        &self,
        query: &[f32],
        filters: &SearchFilters,
        limit: usize,
        threshold: f32,
        strict: bool,
    ) -> Result<Vec<(Memory, f32)>> {
        match self.storage.search_vector(query, filters, limit, threshold) {
            Ok(hits) => Ok(hits),
            Err(e) if !strict && e.kind() == ErrorKind::InvalidInput => {
                tracing::debug!("vector search degraded to empty: {e}");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
