/*!
 * Connection from the CLI to the local hub
 */

use anyhow::{Context, Result};
use gpctl_core::{Credentials, ServiceConfig};
use gpctl_proto::hub_client::HubClient;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

/// Upper bound for connecting to the hub
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Host the CLI reaches the hub on; the hub runs on the coordinator host.
pub const HUB_HOST: &str = "localhost";

pub async fn connect_hub(
    config: &ServiceConfig,
    credentials: &dyn Credentials,
) -> Result<HubClient<Channel>> {
    let address = format!("{}://{}:{}", credentials.scheme(), HUB_HOST, config.hub_port);

    let mut endpoint = Endpoint::from_shared(address.clone())
        .with_context(|| format!("Invalid hub address {}", address))?
        .connect_timeout(CONNECT_TIMEOUT);
    if let Some(tls) = credentials.client_tls(HUB_HOST)? {
        endpoint = endpoint
            .tls_config(tls)
            .context("Invalid TLS configuration for the hub")?;
    }

    let channel = endpoint
        .connect()
        .await
        .with_context(|| format!("Could not connect to the hub at {}; is it running?", address))?;
    Ok(HubClient::new(channel))
}
