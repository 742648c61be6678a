//! A single principal's HNSW graph plus its insertion counter.

use crate::{IndexError, ShardConfig};
use hnsw_rs::hnswio::{HnswIo, ReloadOptions};
use hnsw_rs::prelude::*;
use std::path::Path;

/// One principal's vector shard.
///
/// `next_slot` is the ordinal of the next vector to be inserted; the
/// pre-insertion value returned by [`Shard::insert`] is therefore always
/// equal to the count of vectors already present, matching the hot turn
/// store's strict-append slot convention.
pub struct Shard {
    dim: usize,
    config: ShardConfig,
    hnsw: Hnsw<'static, f32, DistL2>,
    next_slot: usize,
}

fn layer_count(max_elements: usize) -> usize {
    16.min((max_elements.max(2) as f32).ln().trunc() as usize).max(1)
}

impl Shard {
    pub fn empty(dim: usize, config: ShardConfig) -> Self {
        let hnsw = Hnsw::new(
            config.m,
            config.max_elements,
            layer_count(config.max_elements),
            config.ef_construction,
            DistL2 {},
        );
        Self {
            dim,
            config,
            hnsw,
            next_slot: 0,
        }
    }

    pub fn load(dir: &Path, key: &str, dim: usize, config: ShardConfig) -> Result<Self, IndexError> {
        let mut reloader = HnswIo::new(dir, key);
        let hnsw: Hnsw<f32, DistL2> = reloader
            .load_hnsw_with_dist(ReloadOptions::default(), DistL2 {})
            .map_err(|e| IndexError::Load(e.to_string()))?;
        let next_slot = hnsw.get_nb_point();
        Ok(Self {
            dim,
            config,
            hnsw,
            next_slot,
        })
    }

    /// Insert `vector`, returning the slot it was assigned (the
    /// pre-insertion count). Caller has already validated dimension.
    pub fn insert(&mut self, vector: &[f32]) -> usize {
        debug_assert_eq!(vector.len(), self.dim);
        let slot = self.next_slot;
        self.hnsw.insert((vector, slot));
        self.next_slot += 1;
        slot
    }

    pub fn search(&self, query: &[f32], k: usize, ef_search: usize) -> (Vec<f32>, Vec<usize>) {
        if self.next_slot == 0 {
            return (Vec::new(), Vec::new());
        }
        let k = k.min(self.next_slot);
        let neighbours = self.hnsw.search(query, k, ef_search);
        let mut pairs: Vec<(usize, f32)> = neighbours
            .into_iter()
            .map(|n| (n.get_origin_id(), n.distance))
            .collect();
        // hnsw_rs does not pin a tie-breaking rule for equal distances;
        // pin one here so restart-invariance holds bit-for-bit.
        pairs.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
        pairs.into_iter().map(|(id, d)| (d, id)).unzip()
    }

    pub fn persist(&self, dir: &Path, key: &str) -> Result<(), IndexError> {
        self.hnsw
            .file_dump(dir, key)
            .map_err(|e| IndexError::Load(e.to_string()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.next_slot
    }

    pub fn is_empty(&self) -> bool {
        self.next_slot == 0
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn config(&self) -> ShardConfig {
        self.config
    }
}
