use crate::state::ServerState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

/// Liveness probe.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Prometheus text-exposition metrics endpoint.
pub async fn metrics(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    state.metrics_handle.render()
}
