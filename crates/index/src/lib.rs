//! Hot vector index: one approximate-nearest-neighbour shard per principal.
//!
//! A shard is a hierarchical navigable small-world graph ([`hnsw_rs`]) over
//! L2 distance, plus a slot counter. Vectors are inserted strictly in order
//! — never through the library's parallel insertion path — because the
//! `slot_index` returned by `add` must equal the insertion ordinal, and the
//! retriever relies on that ordinal to look turns up in the hot turn store.
//! Concurrent or batched insertion would make insertion order, and therefore
//! slot indices, depend on scheduling.
//!
//! Shards are process-local, one per `(tenant, user)` principal, and
//! serialized by a per-shard `RwLock`. Persisting and reloading a shard and
//! re-running the same query must reproduce the same `(slot_indices,
//! distances)` pair — this is the restart-invariance property the retriever
//! depends on.

mod shard;

pub use shard::Shard;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors raised by the hot vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("hot index I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load persisted shard: {0}")]
    Load(String),
}

/// Tuning knobs for every shard built by one [`HotIndex`].
///
/// Defaults match the configuration the retriever assumes: `M=32`,
/// `ef_construction=200`, `ef_search=64`.
#[derive(Debug, Clone, Copy)]
pub struct ShardConfig {
    /// Neighbours per node in the HNSW graph.
    pub m: usize,
    /// Candidate list size during construction.
    pub ef_construction: usize,
    /// Candidate list size during search.
    pub ef_search: usize,
    /// Upper bound on vectors per shard, used to size the graph's layers.
    /// Shards below this count still work; it is a capacity hint, not a
    /// hard cap enforced by this crate.
    pub max_elements: usize,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            m: 32,
            ef_construction: 200,
            ef_search: 64,
            max_elements: 100_000,
        }
    }
}

/// Replace path-hostile characters in a principal key so it is safe to use
/// as a filename: `:`, `/`, and `\` become `_`.
pub fn sanitize_principal(tenant: &str, user: &str) -> String {
    let raw = format!("{tenant}:{user}");
    raw.chars()
        .map(|c| match c {
            ':' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

/// Owns every principal's shard under one directory and lazily creates or
/// loads them on first access.
pub struct HotIndex {
    dir: PathBuf,
    dim: usize,
    config: ShardConfig,
    shards: RwLock<HashMap<String, Arc<RwLock<Shard>>>>,
}

impl HotIndex {
    pub fn new(dir: impl Into<PathBuf>, dim: usize, config: ShardConfig) -> Self {
        Self {
            dir: dir.into(),
            dim,
            config,
            shards: RwLock::new(HashMap::new()),
        }
    }

    fn shard_file_exists(&self, key: &str) -> bool {
        self.dir.join(format!("{key}.hnsw.graph")).exists()
    }

    fn shard_for(&self, tenant: &str, user: &str) -> Result<Arc<RwLock<Shard>>, IndexError> {
        let key = sanitize_principal(tenant, user);
        if let Some(shard) = self.shards.read().expect("shard map lock poisoned").get(&key) {
            return Ok(Arc::clone(shard));
        }

        let mut shards = self.shards.write().expect("shard map lock poisoned");
        if let Some(shard) = shards.get(&key) {
            return Ok(Arc::clone(shard));
        }

        let shard = if self.shard_file_exists(&key) {
            Shard::load(&self.dir, &key, self.dim, self.config)?
        } else {
            Shard::empty(self.dim, self.config)
        };
        let shard = Arc::new(RwLock::new(shard));
        shards.insert(key, Arc::clone(&shard));
        Ok(shard)
    }

    /// Insert `vector` into the principal's shard, returning the
    /// pre-insertion count — the slot just assigned.
    pub fn add(&self, tenant: &str, user: &str, vector: &[f32]) -> Result<usize, IndexError> {
        if vector.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: vector.len(),
            });
        }
        let shard = self.shard_for(tenant, user)?;
        let mut shard = shard.write().expect("shard lock poisoned");
        Ok(shard.insert(vector))
    }

    /// Search the principal's shard for the `k` nearest neighbours of
    /// `query`. Returns `(distances, slot_indices)`, at most `min(k,
    /// shard_size)` entries each. An empty shard returns empty sequences.
    pub fn search(
        &self,
        tenant: &str,
        user: &str,
        query: &[f32],
        k: usize,
    ) -> Result<(Vec<f32>, Vec<usize>), IndexError> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }
        let shard = self.shard_for(tenant, user)?;
        let shard = shard.read().expect("shard lock poisoned");
        Ok(shard.search(query, k, self.config.ef_search))
    }

    /// Atomically write the principal's shard to disk under the configured
    /// directory. The file name is the path-sanitized principal key.
    pub fn persist(&self, tenant: &str, user: &str) -> Result<(), IndexError> {
        std::fs::create_dir_all(&self.dir)?;
        let key = sanitize_principal(tenant, user);
        let shard = self.shard_for(tenant, user)?;
        let shard = shard.read().expect("shard lock poisoned");
        shard.persist(&self.dir, &key)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }
}
