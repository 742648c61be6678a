//! End-to-end scenarios against real backends: tempfile-backed redb stores
//! and a real HNSW shard, wired the way a process wires them.

use std::sync::Arc;

use coldstore::ColdRow;
use coldstore::ColdStore;
use hotstore::{HotStoreBackend, NullHotStore, RedbHotStore};
use index::{HotIndex, ShardConfig};
use retriever::{pack_signature, RetrievalPolicy, Retriever, Source};

struct Harness {
    _tmp: tempfile::TempDir,
    retriever: Retriever,
}

fn harness() -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let hot_index = Arc::new(HotIndex::new(tmp.path().join("hot"), 20, ShardConfig::default()));
    let hot_store = Arc::new(RedbHotStore::open(tmp.path().join("hot.redb")).unwrap());
    let cold_store = Arc::new(ColdStore::open(tmp.path().join("cold.redb")).unwrap());
    let retriever = Retriever::new(hot_index, hot_store, cold_store, RetrievalPolicy::default());
    Harness { _tmp: tmp, retriever }
}

#[test]
fn s1_determinism_of_retrieval_and_signature() {
    let h = harness();
    h.retriever
        .ingest_turn("T", "U", "h0", "Human: alpha_0 beta_0\nAI: ok", 0.0)
        .unwrap();
    h.retriever
        .ingest_turn("T", "U", "h1", "Human: alpha_1 beta_1\nAI: ok", 1.0)
        .unwrap();
    h.retriever
        .ingest_turn("T", "U", "h2", "Human: alpha_2 beta_2\nAI: ok", 2.0)
        .unwrap();

    let first = h.retriever.retrieve("T", "U", "alpha").unwrap();
    let second = h.retriever.retrieve("T", "U", "alpha").unwrap();
    assert_eq!(first, second);

    let sig1 = pack_signature("T", "U", "alpha", h.retriever.policy(), &first);
    let sig2 = pack_signature("T", "U", "alpha", h.retriever.policy(), &second);
    assert_eq!(sig1, sig2);
}

#[test]
fn s2_cap_enforcement() {
    let tmp = tempfile::tempdir().unwrap();
    let hot_index = Arc::new(HotIndex::new(tmp.path().join("hot"), 20, ShardConfig::default()));
    let hot_store = Arc::new(RedbHotStore::open(tmp.path().join("hot.redb")).unwrap());
    let cold_store = Arc::new(ColdStore::open(tmp.path().join("cold.redb")).unwrap());
    let r = Retriever::new(
        hot_index,
        hot_store,
        cold_store,
        RetrievalPolicy {
            k_final: 5,
            max_chars: 600,
            ..RetrievalPolicy::default()
        },
    );

    for i in 0..500 {
        let text = format!("Human: alpha_{i} padding padding padding padding padding\nAI: ok");
        r.ingest_turn("T", "U", &format!("h{i}"), &text, i as f64).unwrap();
    }

    let ev = r.retrieve("T", "U", "alpha").unwrap();
    assert!(ev.len() <= 5);
    let total: usize = ev.iter().map(|e| e.text.len()).sum();
    assert!(total <= 600);
}

#[test]
fn s3_hot_degradation_yields_cold_only_without_panicking() {
    let tmp = tempfile::tempdir().unwrap();
    let hot_index = Arc::new(HotIndex::new(tmp.path().join("hot"), 20, ShardConfig::default()));
    let hot_store: Arc<dyn HotStoreBackend> = Arc::new(NullHotStore);
    let cold_store = Arc::new(ColdStore::open(tmp.path().join("cold.redb")).unwrap());
    let r = Retriever::new(
        hot_index,
        hot_store,
        cold_store.clone(),
        RetrievalPolicy {
            threshold: 0.0,
            ..RetrievalPolicy::default()
        },
    );
    cold_store
        .put_many(&[ColdRow {
            tenant_id: "T".to_string(),
            user_id: "U".to_string(),
            turn_id: "h0".to_string(),
            signature: "sig0".to_string(),
            ts: 0.0,
            text: "alpha beta".to_string(),
        }])
        .unwrap();

    let ev = r.retrieve("T", "U", "alpha").unwrap();
    assert!(!ev.is_empty());
    assert!(ev.iter().all(|e| e.source == Source::Cold));
}

#[test]
fn s4_restart_invariance_of_hot_index() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let idx = HotIndex::new(tmp.path(), 20, ShardConfig::default());
        let mut v1 = [0f32; 20];
        v1[0] = 1.0;
        let mut v2 = [0f32; 20];
        v2[0] = 2.0;
        let mut v3 = [0f32; 20];
        v3[0] = 3.0;
        idx.add("T", "U", &v1).unwrap();
        idx.add("T", "U", &v2).unwrap();
        idx.add("T", "U", &v3).unwrap();
        idx.persist("T", "U").unwrap();
    }

    let mut q = [0f32; 20];
    q[0] = 2.2;

    let idx_a = HotIndex::new(tmp.path(), 20, ShardConfig::default());
    let (dists_a, slots_a) = idx_a.search("T", "U", &q, 3).unwrap();

    let idx_b = HotIndex::new(tmp.path(), 20, ShardConfig::default());
    let (dists_b, slots_b) = idx_b.search("T", "U", &q, 3).unwrap();

    assert_eq!(slots_a, slots_b);
    assert_eq!(dists_a, dists_b);
}

#[test]
fn s5_forget_hides_hot_evidence_permanently() {
    let h = harness();
    h.retriever
        .ingest_turn("T", "U", "h0", "Human: alpha topic\nAI: ok", 0.0)
        .unwrap();

    h.retriever.forget("T", "U", "h0").unwrap();

    let ev = h.retriever.retrieve("T", "U", "alpha").unwrap();
    assert!(!ev.iter().any(|e| e.turn_id == "h0" && e.source == Source::Hot));
}

#[test]
fn s6_signature_stability_across_independent_evidence_lists() {
    let h1 = harness();
    let h2 = harness();
    h1.retriever
        .ingest_turn("T", "U", "h0", "Human: alpha topic\nAI: ok", 0.0)
        .unwrap();
    h2.retriever
        .ingest_turn("T", "U", "h0", "Human: alpha topic\nAI: ok", 0.0)
        .unwrap();

    let ev1 = h1.retriever.retrieve("T", "U", "alpha").unwrap();
    let ev2 = h2.retriever.retrieve("T", "U", "alpha").unwrap();
    assert_eq!(ev1, ev2);

    let sig1 = pack_signature("T", "U", "alpha", h1.retriever.policy(), &ev1);
    let sig2 = pack_signature("T", "U", "alpha", h2.retriever.policy(), &ev2);
    assert_eq!(sig1, sig2);
    assert_eq!(sig1.len(), 16);
}
