//! gpctl hub daemon.
//!
//! Runs on the coordinator host, started by `gpctl start hub`.

use anyhow::{Context, Result};
use clap::Parser;
use gpctl_core::logging::init_logging;
use gpctl_core::{Credentials, ServiceConfig, TlsCredentials};
use gpctl_hub::{
    CleanupManifest, ClusterOrchestrator, ConnectionPool, GrpcDialer, HubService,
    PostgresConnector, SystemPlatform,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// gpctl hub: orchestrates the per-host agents of a cluster.
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
    init_logging(&config.log_dir, "gpctl-hub.log", args.verbose)
        .context("Failed to initialize logging")?;

    info!("gpctl hub v{}", env!("CARGO_PKG_VERSION"));

    let credentials: Arc<dyn Credentials> = Arc::new(
        TlsCredentials::load(&config.credentials).context("Failed to load TLS credentials")?,
    );

    let dialer = Arc::new(GrpcDialer::new(credentials.clone(), config.agent_port));
    let pool = Arc::new(ConnectionPool::new(dialer));
    let platform = Arc::new(SystemPlatform::new(
        config.gphome.clone(),
        args.config.clone(),
    ));
    let orchestrator = Arc::new(ClusterOrchestrator::new(
        pool.clone(),
        platform.clone(),
        Arc::new(PostgresConnector),
        config.hostnames.clone(),
        CleanupManifest::in_dir(&config.log_dir),
    ));

    let service = HubService::new(pool, platform, orchestrator, config.hostnames.clone());
    let addr: SocketAddr = format!("0.0.0.0:{}", config.hub_port)
        .parse()
        .context("Failed to parse bind address")?;

    gpctl_hub::server::serve(service, addr, credentials.as_ref()).await
}
