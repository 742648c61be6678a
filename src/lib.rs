//! Deterministic Memory Router.
//!
//! Wires the five retrieval crates — [`vectorizer`], [`index`], [`hotstore`],
//! [`coldstore`], and [`retriever`] — into a single process, and (behind the
//! `server` feature) exposes them over HTTP via [`server`].

pub mod config;

use std::sync::Arc;

pub use config::{ConfigLoadError, DmrConfig, DmrYamlConfig};

use coldstore::ColdStore;
use hotstore::{HotStoreBackend, RedbHotStore};
use index::{HotIndex, ShardConfig};
use retriever::Retriever;

/// Build a [`Retriever`] from a loaded [`DmrConfig`], opening the hot index
/// shard directory and the two redb-backed stores on disk.
pub fn build_retriever(config: &DmrConfig) -> anyhow::Result<Retriever> {
    let hot_index = Arc::new(HotIndex::new(
        config.hot_index_dir.clone(),
        config.vector_dim,
        ShardConfig::default(),
    ));
    let hot_store: Arc<dyn HotStoreBackend> = Arc::new(RedbHotStore::open(&config.hot_store_path)?);
    let cold_store = Arc::new(ColdStore::open(&config.cold_store_path)?);

    Ok(Retriever::new(hot_index, hot_store, cold_store, config.policy))
}
