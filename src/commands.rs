/*!
 * Implementation of the `gpctl` subcommands
 *
 * Everything except `configure` and `start hub` goes through the hub's gRPC
 * service; the hub fans out to the agents.
 */

use crate::client::connect_hub;
use crate::progress::ProgressRenderer;
use anyhow::{bail, Context, Result};
use gpctl_core::rpc::ignore_transport_closing;
use gpctl_core::{ClusterFile, CredentialPaths, Credentials, ServiceConfig};
use gpctl_proto::{
    CleanClusterRequest, MakeClusterRequest, ServiceStatus, StartAgentsRequest,
    StatusAgentsRequest, StatusHubRequest, StopAgentsRequest, StopHubRequest,
};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{debug, info};

/// How long `start hub` waits for the hub to answer
const HUB_START_ATTEMPTS: u32 = 10;
const HUB_START_INTERVAL: Duration = Duration::from_millis(500);

/// Everything `gpctl configure` needs to write a service configuration.
#[derive(Debug, Clone)]
pub struct ConfigureOptions {
    pub gphome: PathBuf,
    pub hostnames: Vec<String>,
    pub hub_port: u16,
    pub agent_port: u16,
    pub log_dir: PathBuf,
    pub credentials: CredentialPaths,
    /// Where to write the file; `<gphome>/gpctl.toml` when unset
    pub output: Option<PathBuf>,
}

/// Writes the service configuration and returns where it was written.
pub fn configure(options: ConfigureOptions) -> Result<PathBuf> {
    let config = ServiceConfig {
        gphome: options.gphome,
        hub_port: options.hub_port,
        agent_port: options.agent_port,
        hostnames: options.hostnames,
        log_dir: options.log_dir,
        credentials: options.credentials,
    };
    config.validate().context("Invalid configuration")?;

    let path = options
        .output
        .unwrap_or_else(|| ServiceConfig::default_path(&config.gphome));
    config
        .to_file(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Wrote configuration to {}", path.display());
    Ok(path)
}

/// Launches the hub in the background and waits until it answers.
pub async fn start_hub(
    config_path: &Path,
    config: &ServiceConfig,
    credentials: &dyn Credentials,
) -> Result<ServiceStatus> {
    let hub_bin = config.gphome.join("bin").join("gpctl-hub");
    debug!("Launching {}", hub_bin.display());

    std::process::Command::new(&hub_bin)
        .arg("--config")
        .arg(config_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to launch {}", hub_bin.display()))?;

    let mut last_err = None;
    for _ in 0..HUB_START_ATTEMPTS {
        tokio::time::sleep(HUB_START_INTERVAL).await;
        match hub_status(config, credentials).await {
            Ok(status) => return Ok(status),
            Err(e) => last_err = Some(e),
        }
    }
    match last_err {
        Some(e) => Err(e.context("Hub did not come up")),
        None => bail!("Hub did not come up"),
    }
}

/// Stops the hub. A hub whose transport is already closing counts as stopped.
pub async fn stop_hub(config: &ServiceConfig, credentials: &dyn Credentials) -> Result<()> {
    let mut hub = connect_hub(config, credentials).await?;
    ignore_transport_closing(hub.stop(StopHubRequest {}).await)
        .map_err(|status| anyhow::anyhow!("Failed to stop the hub: {}", status.message()))
}

pub async fn hub_status(
    config: &ServiceConfig,
    credentials: &dyn Credentials,
) -> Result<ServiceStatus> {
    let mut hub = connect_hub(config, credentials).await?;
    let status = hub
        .status(StatusHubRequest {})
        .await
        .map_err(|status| anyhow::anyhow!("Hub status failed: {}", status.message()))?;
    Ok(status.into_inner())
}

pub async fn start_agents(config: &ServiceConfig, credentials: &dyn Credentials) -> Result<()> {
    let mut hub = connect_hub(config, credentials).await?;
    hub.start_agents(StartAgentsRequest {})
        .await
        .map_err(|status| anyhow::anyhow!("Failed to start agents: {}", status.message()))?;
    Ok(())
}

pub async fn stop_agents(config: &ServiceConfig, credentials: &dyn Credentials) -> Result<()> {
    let mut hub = connect_hub(config, credentials).await?;
    hub.stop_agents(StopAgentsRequest {})
        .await
        .map_err(|status| anyhow::anyhow!("Failed to stop agents: {}", status.message()))?;
    Ok(())
}

pub async fn agent_status(
    config: &ServiceConfig,
    credentials: &dyn Credentials,
) -> Result<Vec<ServiceStatus>> {
    let mut hub = connect_hub(config, credentials).await?;
    let reply = hub
        .status_agents(StatusAgentsRequest {})
        .await
        .map_err(|status| anyhow::anyhow!("Agent status failed: {}", status.message()))?;
    Ok(reply.into_inner().statuses)
}

/// Initializes a cluster from a cluster description file, rendering the
/// hub's progress stream until it ends.
pub async fn init_cluster(
    config: &ServiceConfig,
    credentials: &dyn Credentials,
    cluster_file: &Path,
    force: bool,
    verbose: bool,
) -> Result<()> {
    let request = ClusterFile::from_file(cluster_file)
        .and_then(|file| file.into_request(force, verbose))
        .with_context(|| format!("Invalid cluster description {}", cluster_file.display()))?;

    let mut hub = connect_hub(config, credentials).await?;
    let mut replies = hub
        .make_cluster(MakeClusterRequest::from(&request))
        .await
        .map_err(|status| anyhow::anyhow!("{}", status.message()))?
        .into_inner();

    let mut renderer = ProgressRenderer::new(verbose);
    while let Some(item) = replies.next().await {
        match item {
            Ok(reply) => renderer.handle(reply),
            Err(status) => bail!("{}", status.message()),
        }
    }
    Ok(())
}

/// Removes the data directories left behind by a failed `init`.
pub async fn clean_cluster(config: &ServiceConfig, credentials: &dyn Credentials) -> Result<()> {
    let mut hub = connect_hub(config, credentials).await?;
    hub.clean_cluster(CleanClusterRequest {})
        .await
        .map_err(|status| anyhow::anyhow!("Cleanup failed: {}", status.message()))?;
    Ok(())
}

/// One status line per service.
pub fn format_status(status: &ServiceStatus) -> String {
    format!(
        "{:<6} {:<20} {:<8} pid {:<8} up {}s",
        status.role, status.host, status.status, status.pid, status.uptime_secs
    )
}
