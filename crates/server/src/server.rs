//! Server initialization and routing
//!
//! Wires a [`retriever::Retriever`] into an Axum router exposing the
//! router's external contract: `/pre`, `/post`, `/forget`, `/health`,
//! `/metrics`.

use crate::config::ServerConfig;
use crate::middleware::{log_requests, request_id};
use crate::routes::{api_info, not_found};
use crate::routes::{health, memory};
use crate::state::ServerState;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use retriever::Retriever;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the Axum router. There is no authentication or rate limiting here:
/// the router trusts its caller the way the rest of the memory layer trusts
/// its tenant/user scoping — enforced by whatever sits in front of it.
///
/// Public so integration tests can drive it directly with
/// `tower::ServiceExt::oneshot` instead of binding a real listener.
pub fn build_router(state: Arc<ServerState>) -> Router {
    let cors = if state.config.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let public_routes = Router::new()
        .route("/", get(api_info))
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics));

    let memory_routes = Router::new()
        .route("/pre", post(memory::pre))
        .route("/post", post(memory::post))
        .route("/forget", post(memory::forget))
        .layer(DefaultBodyLimit::max(state.config.max_body_size()));

    Router::new()
        .merge(public_routes)
        .merge(memory_routes)
        .fallback(not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(state.config.timeout_secs),
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(from_fn(request_id))
        .layer(from_fn(log_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the DMR HTTP server. Blocks until shut down via SIGTERM or Ctrl+C.
pub async fn start_server(config: ServerConfig, retriever: Arc<Retriever>) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json()
        .init();

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;
    let state = Arc::new(ServerState::new(config.clone(), retriever, metrics_handle));

    let app = build_router(state);
    let addr: SocketAddr = config.socket_addr()?;

    tracing::info!("starting dmr server on {}", addr);
    tracing::info!(
        "timeout: {}s, max body: {}MB, cors: {}, metrics: {}",
        config.timeout_secs,
        config.max_body_size_mb,
        config.enable_cors,
        config.metrics_enabled,
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("received SIGTERM, shutting down..."),
    }
}
