//! medcache server entry point.
//!
//! Boots the caching engine and serves it as an MCP server on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use medcache_client::{Engine, EngineSettings, FetchClient, FetchConfig, Network};
use medcache_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        origin = %config.origin,
        version = %config.cache_version,
        db = %config.db_path.display(),
        "starting medcache on stdio transport"
    );

    let store = CacheDb::open(&config.db_path).await?;
    let network: Arc<dyn Network> = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let settings = EngineSettings::from_config(&config)?;
    let engine = Arc::new(Engine::new(store, Arc::clone(&network), settings));

    if config.install_on_start {
        engine.install().await?;
        engine.activate().await?;
    }

    let handler = handler::MedcacheHost::new(Arc::clone(&engine), network);
    let server = serve_server(handler, stdio()).await?;
    server.waiting().await?;

    engine.settle().await;
    tracing::info!("medcache stopped");

    Ok(())
}
