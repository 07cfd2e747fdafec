//! `start-agent`: serve the supervisor agent on this host

use anyhow::{Context, Result};
use program_executor::HttpFetcher;
use std::path::PathBuf;
use std::sync::Arc;
use task_supervisor::{Agent, AgentConfig, AgentServer};
use tracing::info;

pub async fn run(dir: PathBuf, port: u16, file: PathBuf) -> Result<()> {
    let config = AgentConfig::new(dir, port, file);
    info!("Starting agent on port {}", config.port);
    info!("Root directory: {}", config.root_dir.display());

    let agent = Agent::open(&config, Arc::new(HttpFetcher::new()))
        .await
        .with_context(|| format!("Failed to open agent store {}", config.store_path.display()))?;
    let server = AgentServer::bind(config.listen_addr(), Arc::new(agent))
        .await
        .context("Failed to bind agent listener")?;
    server.serve().await?;
    Ok(())
}
