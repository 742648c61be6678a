//! Per-principal keyed turn record store.
//!
//! Three tables, all scoped by the `(tenant, user)` principal: the turn
//! records themselves, an ordered `slot -> turn_id` map that mirrors the hot
//! vector index's insertion order, and a tombstone set. `put_turn` writes
//! the record and appends to the idxmap in a single redb transaction so a
//! crash cannot leave the two out of sync.
//!
//! [`HotStoreBackend`] is a capability trait rather than a concrete struct
//! so the retriever can be handed a [`NullHotStore`] when the hot tier is
//! unavailable or intentionally disabled — every call then degrades to "no
//! hot evidence" instead of failing.

mod redb_store;

pub use redb_store::RedbHotStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HotStoreError {
    #[error("hot store backend error: {0}")]
    Backend(String),

    #[error("hot store encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("hot store decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// A stored turn's payload, keyed externally by `(principal, turn_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub text: String,
    pub signature: String,
    pub ts: f64,
}

fn principal_key(tenant: &str, user: &str) -> String {
    format!("{tenant}\u{1}{user}")
}

fn turn_key(tenant: &str, user: &str, turn_id: &str) -> String {
    format!("{tenant}\u{1}{user}\u{1}{turn_id}")
}

/// The capability set the retriever needs from the hot turn store.
///
/// Implemented by [`RedbHotStore`] for real persistence and by
/// [`NullHotStore`] for a hot tier that is deliberately absent.
pub trait HotStoreBackend: Send + Sync {
    /// Idempotent upsert. Also strict-appends `turn_id` to the principal's
    /// `slot -> turn_id` map: the N-th put places `turn_id` at slot `N-1`,
    /// matching the hot vector index's next assigned slot. Callers must
    /// pair this with the corresponding `HotIndex::add` under the same
    /// discipline.
    fn put_turn(
        &self,
        tenant: &str,
        user: &str,
        turn_id: &str,
        text: &str,
        signature: &str,
        ts: f64,
    ) -> Result<(), HotStoreError>;

    fn get_turn(
        &self,
        tenant: &str,
        user: &str,
        turn_id: &str,
    ) -> Result<Option<TurnRecord>, HotStoreError>;

    /// Resolve slot indices to turn ids, preserving input order. A slot
    /// past the end of the map resolves to `None`.
    fn idxmap_mget(
        &self,
        tenant: &str,
        user: &str,
        slots: &[usize],
    ) -> Result<Vec<Option<String>>, HotStoreError>;

    /// Mark `turn_id` as forgotten and delete its record. Always returns
    /// `Ok(true)`, even if the turn never existed.
    fn tombstone(&self, tenant: &str, user: &str, turn_id: &str) -> Result<bool, HotStoreError>;

    fn tombstoned(&self, tenant: &str, user: &str, turn_id: &str) -> Result<bool, HotStoreError>;
}

/// No-op hot store used when the hot tier is unavailable or disabled.
///
/// Every read returns empty/`None`/`false`; every write is accepted and
/// discarded. The retriever sees this as a permanently empty shard, which
/// is exactly the degraded-mode behaviour the hot path is expected to fall
/// back to on any fault.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHotStore;

impl HotStoreBackend for NullHotStore {
    fn put_turn(
        &self,
        _tenant: &str,
        _user: &str,
        _turn_id: &str,
        _text: &str,
        _signature: &str,
        _ts: f64,
    ) -> Result<(), HotStoreError> {
        Ok(())
    }

    fn get_turn(
        &self,
        _tenant: &str,
        _user: &str,
        _turn_id: &str,
    ) -> Result<Option<TurnRecord>, HotStoreError> {
        Ok(None)
    }

    fn idxmap_mget(
        &self,
        _tenant: &str,
        _user: &str,
        slots: &[usize],
    ) -> Result<Vec<Option<String>>, HotStoreError> {
        Ok(vec![None; slots.len()])
    }

    fn tombstone(&self, _tenant: &str, _user: &str, _turn_id: &str) -> Result<bool, HotStoreError> {
        Ok(true)
    }

    fn tombstoned(&self, _tenant: &str, _user: &str, _turn_id: &str) -> Result<bool, HotStoreError> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_store_degrades_cleanly() {
        let store = NullHotStore;
        assert!(store.put_turn("t", "u", "id", "text", "sig", 0.0).is_ok());
        assert_eq!(store.get_turn("t", "u", "id").unwrap(), None);
        assert_eq!(
            store.idxmap_mget("t", "u", &[0, 1, 2]).unwrap(),
            vec![None, None, None]
        );
        assert!(store.tombstone("t", "u", "id").unwrap());
        assert!(!store.tombstoned("t", "u", "id").unwrap());
    }
}
