//! Policy core: vectorize, search hot and cold in parallel tiers, merge,
//! admit under caps, and sign.
//!
//! [`Retriever`] is the single stateful value a process builds once and
//! reuses across requests. It holds the hot vector index, a hot turn store
//! behind a trait object (so a deliberately absent hot tier is just
//! [`hotstore::NullHotStore`]), and the cold store. A fault anywhere in the
//! hot path degrades that call to "no hot evidence"; a fault in the cold
//! path propagates, because cold is the system's source of truth.

mod signature;

pub use signature::{pack_signature, turn_signature};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use coldstore::{ColdRow, ColdStore, ColdStoreError};
use hotstore::{HotStoreBackend, HotStoreError};
use index::{HotIndex, IndexError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vectorizer::Vectorizer;

/// Where one piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Hot,
    Cold,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Hot => "hot",
            Source::Cold => "cold",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tuning knobs for one retrieval. Value-typed and immutable per request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalPolicy {
    pub threshold: f32,
    pub k_final: usize,
    pub max_chars: usize,
    pub k_hot_candidates: usize,
    pub k_cold_candidates: usize,
    pub budget_ms_hot: f64,
    pub budget_ms_cold: f64,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.60,
            k_final: 5,
            max_chars: 800,
            k_hot_candidates: 30,
            k_cold_candidates: 30,
            budget_ms_hot: 50.0,
            budget_ms_cold: 50.0,
        }
    }
}

/// One piece of admitted (or candidate, pre-admission) evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub turn_id: String,
    pub signature: String,
    pub score: f32,
    pub source: Source,
    pub text: String,
}

/// Errors the retriever can surface to its caller.
///
/// `retrieve` only ever produces [`RetrieverError::Cold`] — a cold-tier
/// fault after the cold store's own repair-and-retry; hot-tier faults are
/// swallowed and logged there. `ingest_turn` can additionally surface
/// [`RetrieverError::Dimension`] and [`RetrieverError::Hot`]: a write-side
/// fault is a programming error or a genuine storage failure, not something
/// to degrade silently.
#[derive(Debug, Error)]
pub enum RetrieverError {
    #[error("cold store error: {0}")]
    Cold(#[from] ColdStoreError),

    #[error("hot store error: {0}")]
    Hot(#[from] HotStoreError),

    #[error("hot index error: {0}")]
    Dimension(#[from] IndexError),
}

/// Internal only: unifies the index and hot-store error types so
/// [`Retriever::try_retrieve_hot`] can use `?` and collapse anything to
/// "hot unavailable" at its single call site.
#[derive(Debug, Error)]
enum HotPathError {
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Store(#[from] HotStoreError),
}

/// Orchestrates one principal-scoped retrieval across the hot and cold
/// tiers. Construct once per process; every method takes `&self` and is
/// safe to call concurrently — the underlying stores own their own locking.
pub struct Retriever {
    vectorizer: Vectorizer,
    hot_index: Arc<HotIndex>,
    hot_store: Arc<dyn HotStoreBackend>,
    cold_store: Arc<ColdStore>,
    policy: RetrievalPolicy,
}

impl Retriever {
    pub fn new(
        hot_index: Arc<HotIndex>,
        hot_store: Arc<dyn HotStoreBackend>,
        cold_store: Arc<ColdStore>,
        policy: RetrievalPolicy,
    ) -> Self {
        Self {
            vectorizer: Vectorizer::new(),
            hot_index,
            hot_store,
            cold_store,
            policy,
        }
    }

    pub fn policy(&self) -> &RetrievalPolicy {
        &self.policy
    }

    pub fn vectorizer(&self) -> &Vectorizer {
        &self.vectorizer
    }

    /// `retrieve(tenant, user, query)`: vectorize, search both tiers, merge,
    /// admit under caps. Deterministic for a fixed store state and policy.
    pub fn retrieve(
        &self,
        tenant: &str,
        user: &str,
        query: &str,
    ) -> Result<Vec<EvidenceItem>, RetrieverError> {
        let qv = self.vectorizer.vectorize(query);

        let hot = self.retrieve_hot(tenant, user, qv.as_slice());
        let cold = self.retrieve_cold(tenant, user, query)?;

        let mut merged = hot;
        merged.extend(cold);
        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.turn_id.cmp(&b.turn_id))
        });

        let mut admitted = Vec::with_capacity(self.policy.k_final.min(merged.len()));
        let mut total_chars = 0usize;
        for item in merged {
            if admitted.len() >= self.policy.k_final {
                break;
            }
            if item.score < self.policy.threshold {
                continue;
            }
            let item_chars = item.text.chars().count();
            if total_chars + item_chars > self.policy.max_chars {
                continue;
            }
            total_chars += item_chars;
            admitted.push(item);
        }

        Ok(admitted)
    }

    /// Materialize a new turn: vectorize, append to the hot ANN shard and
    /// hot turn store, and write the authoritative cold row. Returns the
    /// turn's content signature. Mirrors the external `/post` contract;
    /// any fault here propagates rather than degrading, since a write-side
    /// failure leaves the hot and cold tiers inconsistent if swallowed.
    pub fn ingest_turn(
        &self,
        tenant: &str,
        user: &str,
        turn_id: &str,
        text: &str,
        ts: f64,
    ) -> Result<String, RetrieverError> {
        let vec = self.vectorizer.vectorize(text);
        self.hot_index.add(tenant, user, vec.as_slice())?;

        let signature = turn_signature(tenant, user, turn_id, text);
        self.hot_store
            .put_turn(tenant, user, turn_id, text, &signature, ts)?;
        self.cold_store.put_many(&[ColdRow {
            tenant_id: tenant.to_string(),
            user_id: user.to_string(),
            turn_id: turn_id.to_string(),
            signature: signature.clone(),
            ts,
            text: text.to_string(),
        }])?;
        Ok(signature)
    }

    /// Tombstone a turn in the hot tier; cold rows are unaffected. Mirrors
    /// the external `/forget` contract. Returns `true` unconditionally, per
    /// [`HotStoreBackend::tombstone`].
    pub fn forget(&self, tenant: &str, user: &str, turn_id: &str) -> Result<bool, RetrieverError> {
        Ok(self.hot_store.tombstone(tenant, user, turn_id)?)
    }

    /// Best-effort hot lookup. Any fault anywhere in the hot path degrades
    /// the whole call to an empty contribution; nothing propagates.
    fn retrieve_hot(&self, tenant: &str, user: &str, qv: &[f32]) -> Vec<EvidenceItem> {
        match self.try_retrieve_hot(tenant, user, qv) {
            Ok(items) => items,
            Err(err) => {
                tracing::warn!(%err, "hot path failed, degrading to no hot evidence");
                Vec::new()
            }
        }
    }

    fn try_retrieve_hot(
        &self,
        tenant: &str,
        user: &str,
        qv: &[f32],
    ) -> Result<Vec<EvidenceItem>, HotPathError> {
        let (dists, slots) = self
            .hot_index
            .search(tenant, user, qv, self.policy.k_hot_candidates)?;
        if slots.is_empty() {
            return Ok(Vec::new());
        }

        let turn_ids = self.hot_store.idxmap_mget(tenant, user, &slots)?;

        let mut out = Vec::with_capacity(turn_ids.len());
        for (i, turn_id) in turn_ids.into_iter().enumerate() {
            let Some(turn_id) = turn_id else { continue };
            if self.hot_store.tombstoned(tenant, user, &turn_id)? {
                continue;
            }
            let Some(record) = self.hot_store.get_turn(tenant, user, &turn_id)? else {
                continue;
            };

            let dist = dists.get(i).copied().unwrap_or(f32::MAX);
            let score = 1.0 / (1.0 + dist.max(0.0));
            out.push(EvidenceItem {
                turn_id,
                signature: record.signature,
                score,
                source: Source::Hot,
                text: record.text,
            });
        }
        Ok(out)
    }

    fn retrieve_cold(
        &self,
        tenant: &str,
        user: &str,
        query: &str,
    ) -> Result<Vec<EvidenceItem>, RetrieverError> {
        let rows: Vec<ColdRow> = self.cold_store.search_fts(
            tenant,
            user,
            query,
            self.policy.k_cold_candidates,
            Duration::from_secs_f64(self.policy.budget_ms_cold / 1000.0),
        )?;

        let query_lower = query.to_lowercase();
        Ok(rows
            .into_iter()
            .map(|row| {
                let score = if row.text.to_lowercase().contains(&query_lower) {
                    0.75
                } else {
                    0.50
                };
                EvidenceItem {
                    turn_id: row.turn_id,
                    signature: row.signature,
                    score,
                    source: Source::Cold,
                    text: row.text,
                }
            })
            .collect())
    }
}

/// Whether the hot index search / lookup layer raised something other than
/// "not found" — exposed for callers that want to distinguish `Io`/`Load`
/// faults in their own logging, independent of the retriever's swallow
/// policy.
pub fn is_dimension_mismatch(err: &IndexError) -> bool {
    matches!(err, IndexError::DimensionMismatch { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotstore::{NullHotStore, RedbHotStore};
    use index::ShardConfig;

    fn build(tmp: &std::path::Path) -> Retriever {
        let hot_index = Arc::new(HotIndex::new(tmp.join("hot"), 20, ShardConfig::default()));
        let hot_store = Arc::new(RedbHotStore::open(tmp.join("hot.redb")).unwrap());
        let cold_store = Arc::new(ColdStore::open(tmp.join("cold.redb")).unwrap());
        Retriever::new(hot_index, hot_store, cold_store, RetrievalPolicy::default())
    }

    fn ingest(r: &Retriever, tenant: &str, user: &str, turn_id: &str, text: &str, ts: f64) {
        r.ingest_turn(tenant, user, turn_id, text, ts).unwrap();
    }

    #[test]
    fn retrieval_is_deterministic_across_repeated_calls() {
        let tmp = tempfile::tempdir().unwrap();
        let r = build(tmp.path());
        ingest(&r, "t1", "u1", "h0", "Human: alpha_0 beta_0\nAI: ok", 0.0);
        ingest(&r, "t1", "u1", "h1", "Human: alpha_1 beta_1\nAI: ok", 1.0);
        ingest(&r, "t1", "u1", "h2", "Human: alpha_2 beta_2\nAI: ok", 2.0);

        let policy = RetrievalPolicy {
            threshold: 0.10,
            k_final: 5,
            max_chars: 800,
            k_hot_candidates: 30,
            k_cold_candidates: 30,
            budget_ms_hot: 150.0,
            budget_ms_cold: 150.0,
        };
        let r = Retriever { policy, ..r };

        let first = r.retrieve("t1", "u1", "alpha").unwrap();
        let second = r.retrieve("t1", "u1", "alpha").unwrap();
        assert_eq!(first, second);

        let sig1 = pack_signature("t1", "u1", "alpha", r.policy(), &first);
        let sig2 = pack_signature("t1", "u1", "alpha", r.policy(), &second);
        assert_eq!(sig1, sig2);
    }

    #[test]
    fn cap_enforcement_bounds_count_and_chars() {
        let tmp = tempfile::tempdir().unwrap();
        let r = build(tmp.path());
        for i in 0..40 {
            let text = format!("Human: alpha_{i} filler text padding out the body\nAI: ok");
            ingest(&r, "t1", "u1", &format!("h{i}"), &text, i as f64);
        }

        let policy = RetrievalPolicy {
            threshold: 0.0,
            k_final: 5,
            max_chars: 600,
            ..RetrievalPolicy::default()
        };
        let r = Retriever { policy, ..r };

        let ev = r.retrieve("t1", "u1", "alpha").unwrap();
        assert!(ev.len() <= 5);
        let total: usize = ev.iter().map(|e| e.text.len()).sum();
        assert!(total <= 600);
    }

    #[test]
    fn hot_degradation_falls_back_to_cold_only() {
        let tmp = tempfile::tempdir().unwrap();
        let hot_index = Arc::new(HotIndex::new(tmp.path().join("hot"), 20, ShardConfig::default()));
        let hot_store: Arc<dyn HotStoreBackend> = Arc::new(NullHotStore);
        let cold_store = Arc::new(ColdStore::open(tmp.path().join("cold.redb")).unwrap());
        let r = Retriever::new(
            hot_index,
            hot_store,
            cold_store,
            RetrievalPolicy {
                threshold: 0.0,
                ..RetrievalPolicy::default()
            },
        );
        r.cold_store
            .put_many(&[ColdRow {
                tenant_id: "t1".to_string(),
                user_id: "u1".to_string(),
                turn_id: "h0".to_string(),
                signature: "sig0".to_string(),
                ts: 0.0,
                text: "alpha beta".to_string(),
            }])
            .unwrap();

        let ev = r.retrieve("t1", "u1", "alpha").unwrap();
        assert!(ev.iter().all(|e| e.source == Source::Cold));
        assert!(!ev.is_empty());
    }

    #[test]
    fn forget_removes_hot_evidence_for_that_turn() {
        let tmp = tempfile::tempdir().unwrap();
        let r = build(tmp.path());
        ingest(&r, "t1", "u1", "h0", "Human: alpha topic\nAI: ok", 0.0);

        r.forget("t1", "u1", "h0").unwrap();

        let ev = r.retrieve("t1", "u1", "alpha").unwrap();
        assert!(!ev.iter().any(|e| e.turn_id == "h0" && e.source == Source::Hot));
    }

    #[test]
    fn isolation_across_principals() {
        let tmp = tempfile::tempdir().unwrap();
        let r = build(tmp.path());
        ingest(&r, "tenant-a", "u1", "h0", "Human: alpha topic\nAI: ok", 0.0);

        let ev = r.retrieve("tenant-b", "u1", "alpha").unwrap();
        assert!(ev.is_empty());
    }
}
