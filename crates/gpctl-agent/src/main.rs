//! gpctl agent daemon.
//!
//! Runs on every cluster host, launched by the hub's `StartAgents`.

use anyhow::{Context, Result};
use clap::Parser;
use gpctl_agent::AgentService;
use gpctl_core::logging::init_logging;
use gpctl_core::{ServiceConfig, TlsCredentials};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

/// gpctl agent: segment lifecycle service for one host.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Service configuration written by `gpctl configure`
    #[arg(short, long, env = "GPCTL_CONFIG")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let config = ServiceConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;
    init_logging(&config.log_dir, "gpctl-agent.log", args.verbose)
        .context("Failed to initialize logging")?;

    info!("gpctl agent v{}", env!("CARGO_PKG_VERSION"));

    let credentials =
        TlsCredentials::load(&config.credentials).context("Failed to load TLS credentials")?;

    let addr: SocketAddr = format!("0.0.0.0:{}", config.agent_port)
        .parse()
        .context("Failed to parse bind address")?;

    gpctl_agent::server::serve(AgentService::new(config.gphome), addr, &credentials).await
}
