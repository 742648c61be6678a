use crate::error::ServerResult;
use crate::state::ServerState;
use axum::extract::State;
use axum::Json;
use retriever::{pack_signature, EvidenceItem};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[derive(Debug, Deserialize)]
pub struct PreRequest {
    pub tenant_id: String,
    pub user_id: String,
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct EvidenceOut {
    pub turn_id: String,
    pub signature: String,
    pub score: f32,
    pub source: String,
    pub text: String,
}

impl From<&EvidenceItem> for EvidenceOut {
    fn from(e: &EvidenceItem) -> Self {
        Self {
            turn_id: e.turn_id.clone(),
            signature: e.signature.clone(),
            score: e.score,
            source: e.source.to_string(),
            text: e.text.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PreResponse {
    pub reliable: bool,
    pub pack_signature: String,
    pub evidence: Vec<EvidenceOut>,
    pub evidence_block: String,
}

fn format_evidence_block(evidence: &[EvidenceItem]) -> String {
    if evidence.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = evidence
        .iter()
        .map(|e| {
            format!(
                "[{}|{}|{}|score={:.6}]\n{}",
                e.source.as_str().to_uppercase(),
                e.turn_id,
                e.signature,
                e.score,
                e.text
            )
        })
        .collect();
    parts.join("\n\n---\n\n")
}

/// `POST /pre` — retrieve bounded, deterministic evidence for a query and
/// sign the pack. `reliable` is true whenever at least one turn was admitted.
pub async fn pre(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<PreRequest>,
) -> ServerResult<Json<PreResponse>> {
    metrics::counter!("dmr_requests_total", "endpoint" => "pre").increment(1);
    let t0 = std::time::Instant::now();

    let evidence = state
        .retriever
        .retrieve(&req.tenant_id, &req.user_id, &req.query)?;
    let sig = pack_signature(
        &req.tenant_id,
        &req.user_id,
        &req.query,
        state.retriever.policy(),
        &evidence,
    );
    let response = PreResponse {
        reliable: !evidence.is_empty(),
        pack_signature: sig,
        evidence_block: format_evidence_block(&evidence),
        evidence: evidence.iter().map(EvidenceOut::from).collect(),
    };

    metrics::histogram!("dmr_latency_ms", "endpoint" => "pre").record(t0.elapsed().as_secs_f64() * 1000.0);
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct PostRequest {
    pub tenant_id: String,
    pub user_id: String,
    pub user_message: String,
    pub assistant_message: String,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub status: &'static str,
    pub turn_id: String,
    pub signature: String,
}

/// `POST /post` — ingest one conversational turn into both tiers.
pub async fn post(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<PostRequest>,
) -> ServerResult<Json<PostResponse>> {
    metrics::counter!("dmr_requests_total", "endpoint" => "post").increment(1);
    let t0 = std::time::Instant::now();

    let turn_id = uuid::Uuid::new_v4().simple().to_string()[..16].to_string();
    let text = format!(
        "Human: {}\nAI: {}",
        req.user_message, req.assistant_message
    );
    let signature = state.retriever.ingest_turn(
        &req.tenant_id,
        &req.user_id,
        &turn_id,
        &text,
        now_secs(),
    )?;

    metrics::histogram!("dmr_latency_ms", "endpoint" => "post").record(t0.elapsed().as_secs_f64() * 1000.0);
    Ok(Json(PostResponse {
        status: "ok",
        turn_id,
        signature,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ForgetRequest {
    pub tenant_id: String,
    pub user_id: String,
    pub turn_id: String,
}

#[derive(Debug, Serialize)]
pub struct ForgetResponse {
    pub status: &'static str,
    pub turn_id: String,
}

/// `POST /forget` — tombstone a turn in the hot tier. Idempotent.
pub async fn forget(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<ForgetRequest>,
) -> ServerResult<Json<ForgetResponse>> {
    metrics::counter!("dmr_requests_total", "endpoint" => "forget").increment(1);

    let found = state
        .retriever
        .forget(&req.tenant_id, &req.user_id, &req.turn_id)?;

    Ok(Json(ForgetResponse {
        status: if found { "ok" } else { "not_found" },
        turn_id: req.turn_id,
    }))
}
