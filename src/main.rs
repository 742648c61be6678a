//! `dmr` — runs the Deterministic Memory Router as an HTTP service.

#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::sync::Arc;

    dotenvy::dotenv().ok();

    let dmr_config = dmr::DmrConfig::from_env();
    let retriever = Arc::new(dmr::build_retriever(&dmr_config)?);
    let server_config = server::ServerConfig::load()?;

    server::start_server(server_config, retriever).await
}

#[cfg(not(feature = "server"))]
fn main() {
    eprintln!("dmr was built without the `server` feature; nothing to run.");
    std::process::exit(1);
}
