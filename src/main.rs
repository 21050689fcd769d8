use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use rudis::rdb;
use rudis::server::RedisServer;

/// Entry point: parse flags, initialise logging, load the snapshot and run
/// the server. Startup failures exit non-zero.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let server = RedisServer::new(std::env::args())?;

    let databases = rdb::load_snapshot(&server.config.dir, &server.config.dbfilename)
        .await
        .context("failed to load snapshot")?;
    server.install_snapshot(databases).await;

    Arc::new(server).run().await
}
