//! Canonical pack signature and per-turn content signature.
//!
//! Both are truncated SHA-256 digests over a pinned textual form. The form
//! itself is arbitrary as long as it is stable; what matters is that every
//! process renders the same bytes for the same inputs.

use sha2::{Digest, Sha256};

use crate::{EvidenceItem, RetrievalPolicy, Source};

fn sha256_hex16(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// `SHA-256("{tenant}:{user}|{turn_id}|{text}")`, truncated to 16 hex chars.
pub fn turn_signature(tenant: &str, user: &str, turn_id: &str, text: &str) -> String {
    sha256_hex16(&format!("{tenant}:{user}|{turn_id}|{text}"))
}

/// Render an `f64` the way Python's `repr` would after `round(x, 6)`: a
/// fixed-point decimal with trailing zeros stripped, always keeping one
/// digit after the point.
fn render_score(score: f64) -> String {
    let rounded = (score * 1_000_000.0).round() / 1_000_000.0;
    let mut s = format!("{rounded:.6}");
    while s.ends_with('0') && !s.ends_with(".0") {
        s.pop();
    }
    s
}

fn render_tuple(turn_id: &str, signature: &str, score: f64, source: Source) -> String {
    format!(
        "('{turn_id}', '{signature}', {}, '{source}')",
        render_score(score)
    )
}

/// The canonical, sort-keyed, separator-pinned rendering of an evidence list
/// consumed by [`pack_signature`]. Sorted by `(source, turn_id, signature,
/// score)` ascending; `source` sorts on its string form ("cold" < "hot"),
/// not declaration order.
fn canonical_evidence_repr(evidence: &[EvidenceItem]) -> String {
    let mut norm: Vec<(String, String, f64, Source)> = evidence
        .iter()
        .map(|e| {
            let rounded = (e.score as f64 * 1_000_000.0).round() / 1_000_000.0;
            (e.turn_id.clone(), e.signature.clone(), rounded, e.source)
        })
        .collect();
    norm.sort_by(|a, b| {
        a.3.as_str()
            .cmp(b.3.as_str())
            .then_with(|| a.0.cmp(&b.0))
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal))
    });

    let rendered: Vec<String> = norm
        .iter()
        .map(|(turn_id, signature, score, source)| render_tuple(turn_id, signature, *score, *source))
        .collect();
    format!("[{}]", rendered.join(", "))
}

/// `pack_signature`: truncated SHA-256 over tenant, user, query, policy, and
/// the admitted evidence, canonicalised per [`canonical_evidence_repr`].
pub fn pack_signature(
    tenant: &str,
    user: &str,
    query: &str,
    policy: &RetrievalPolicy,
    evidence: &[EvidenceItem],
) -> String {
    let ev = canonical_evidence_repr(evidence);
    let s = format!(
        "t={tenant}|u={user}|q={query}|thr={:.6}|k={}|mx={}|bh={:.3}|bc={:.3}|ev={ev}",
        policy.threshold, policy.k_final, policy.max_chars, policy.budget_ms_hot, policy.budget_ms_cold,
    );
    sha256_hex16(&s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(turn_id: &str, signature: &str, score: f32, source: Source, text: &str) -> EvidenceItem {
        EvidenceItem {
            turn_id: turn_id.to_string(),
            signature: signature.to_string(),
            score,
            source,
            text: text.to_string(),
        }
    }

    #[test]
    fn turn_signature_is_deterministic() {
        let a = turn_signature("t1", "u1", "h0", "Human: hi\nAI: hello");
        let b = turn_signature("t1", "u1", "h0", "Human: hi\nAI: hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn turn_signature_is_sensitive_to_every_field() {
        let base = turn_signature("t1", "u1", "h0", "text");
        assert_ne!(base, turn_signature("t2", "u1", "h0", "text"));
        assert_ne!(base, turn_signature("t1", "u2", "h0", "text"));
        assert_ne!(base, turn_signature("t1", "u1", "h1", "text"));
        assert_ne!(base, turn_signature("t1", "u1", "h0", "other"));
    }

    #[test]
    fn pack_signature_is_stable_across_repeated_calls() {
        let policy = RetrievalPolicy::default();
        let ev = vec![
            item("h0", "sig0", 0.9, Source::Hot, "alpha"),
            item("h1", "sig1", 0.5, Source::Cold, "beta"),
        ];
        let a = pack_signature("t1", "u1", "alpha", &policy, &ev);
        let b = pack_signature("t1", "u1", "alpha", &policy, &ev);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn pack_signature_is_independent_of_input_evidence_order() {
        let policy = RetrievalPolicy::default();
        let a = vec![
            item("h0", "sig0", 0.9, Source::Hot, "alpha"),
            item("h1", "sig1", 0.5, Source::Cold, "beta"),
        ];
        let b = vec![
            item("h1", "sig1", 0.5, Source::Cold, "beta"),
            item("h0", "sig0", 0.9, Source::Hot, "alpha"),
        ];
        assert_eq!(
            pack_signature("t1", "u1", "alpha", &policy, &a),
            pack_signature("t1", "u1", "alpha", &policy, &b),
        );
    }

    #[test]
    fn pack_signature_changes_with_query() {
        let policy = RetrievalPolicy::default();
        let ev = vec![item("h0", "sig0", 0.9, Source::Hot, "alpha")];
        assert_ne!(
            pack_signature("t1", "u1", "alpha", &policy, &ev),
            pack_signature("t1", "u1", "beta", &policy, &ev),
        );
    }

    #[test]
    fn render_score_strips_trailing_zeros_like_python_repr() {
        assert_eq!(render_score(0.75), "0.75");
        assert_eq!(render_score(0.5), "0.5");
        assert_eq!(render_score(1.0), "1.0");
        assert_eq!(render_score(0.123456), "0.123456");
    }
}
