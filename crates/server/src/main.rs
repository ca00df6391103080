//! disscache server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use anyhow::{Context, Result};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

use disscache_client::{BlobCache, EvictionPolicy};
use disscache_core::AppConfig;

use crate::tools::clean_blobs::CleanDefaults;

mod error;
mod handler;
mod maintenance;
mod responder;
mod service;
#[cfg(test)]
mod testing;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    let policy: EvictionPolicy = config
        .blob_eviction_policy
        .parse()
        .context("parsing blob_eviction_policy")?;
    let clean_defaults = CleanDefaults { max_size_bytes: config.blob_max_size_bytes(), policy };

    tracing::info!(
        db_path = %config.db_path.display(),
        cache_dir = %config.cache_dir.display(),
        "Starting disscache server on stdio transport"
    );

    let blobs = BlobCache::from_config(&config)?;
    let cleaner = config
        .blob_clean_interval()
        .map(|period| maintenance::spawn_blob_cleaner(blobs.clone(), clean_defaults, period));

    let service = service::Service::from_config(config, blobs.clone()).await?;
    let handler = handler::DisscacheServer::new(service, blobs, clean_defaults);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    if let Some(cleaner) = cleaner {
        cleaner.abort();
    }
    Ok(())
}
