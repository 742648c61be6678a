use crate::config::ServerConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use retriever::Retriever;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// The deterministic retriever, wired to the hot and cold tiers.
    pub retriever: Arc<Retriever>,

    /// Prometheus metrics handle used to render `/metrics`.
    pub metrics_handle: PrometheusHandle,
}

impl ServerState {
    pub fn new(config: ServerConfig, retriever: Arc<Retriever>, metrics_handle: PrometheusHandle) -> Self {
        Self {
            config: Arc::new(config),
            retriever,
            metrics_handle,
        }
    }
}
