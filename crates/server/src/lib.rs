//! DMR Server - HTTP REST API for the Deterministic Memory Router
//!
//! Exposes a [`retriever::Retriever`] over HTTP:
//!
//! - `POST /pre` - retrieve bounded, signed evidence for a query
//! - `POST /post` - ingest a conversational turn into the hot and cold tiers
//! - `POST /forget` - tombstone a turn in the hot tier
//! - `GET /health` - liveness probe
//! - `GET /metrics` - Prometheus text exposition
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//! use std::sync::Arc;
//!
//! # async fn build_retriever() -> Arc<retriever::Retriever> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     let retriever = build_retriever().await;
//!     server::start_server(config, retriever).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
