//! Authoritative durable turn storage plus a BM25 full-text index derived
//! from it.
//!
//! `cold_rows` is the source of truth; every other table here — postings,
//! document lengths, per-principal stats, and the per-principal term
//! dictionary — is a function of `cold_rows` and can be thrown away and
//! rebuilt by [`ColdStore::repair_fts`] at any time. `search_fts` treats a
//! decode failure in the derived tables as a sign of corruption: it repairs
//! once and retries, and propagates anything else.

mod bm25;
mod store;
mod tokenize;

pub use store::ColdStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ColdStoreError {
    #[error("cold store backend error: {0}")]
    Backend(String),

    #[error("cold store encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// A `cold_rows` record itself failed to decode. Unlike [`Self::Corrupt`]
    /// this is not something `repair_fts` can fix — it rebuilds the derived
    /// tables *from* `cold_rows`, so a damaged authoritative row propagates
    /// here instead of triggering a repair-and-retry.
    #[error("cold store row decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// The derived FTS structures (postings, term dictionary) could not be
    /// decoded. `search_fts` repairs from `cold_rows` exactly once on this
    /// variant and retries; any other error propagates unchanged.
    #[error("cold store FTS index corrupt: {0}")]
    Corrupt(String),
}

/// One authoritative turn row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdRow {
    pub tenant_id: String,
    pub user_id: String,
    pub turn_id: String,
    pub signature: String,
    pub ts: f64,
    pub text: String,
}
