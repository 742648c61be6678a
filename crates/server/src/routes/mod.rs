//! API route handlers
//!
//! - `health`: liveness and Prometheus metrics
//! - `memory`: `/pre`, `/post`, `/forget` — the memory router's read/write surface

pub mod health;
pub mod memory;

use crate::error::{ServerError, ServerResult};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// API version and base info (GET /)
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "Deterministic Memory Router",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/pre", "/post", "/forget", "/health", "/metrics"]
    })))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
