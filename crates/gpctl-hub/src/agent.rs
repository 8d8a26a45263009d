//! Typed access to one agent.
//!
//! [`AgentApi`] is the seam between the orchestrator and the transport: the
//! hub talks to [`GrpcAgent`] in production and to test doubles in tests.

use crate::error::{HubError, Result};
use async_trait::async_trait;
use gpctl_core::Credentials;
use gpctl_proto::{
    agent_client::AgentClient, GetHostNameRequest, LogMessage, MakeSegmentRequest,
    RemoveDirectoryRequest, ServiceStatus, StartSegmentRequest, StatusAgentRequest,
    StopAgentRequest, ValidateHostEnvRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;
use tracing::debug;

/// Upper bound for establishing a channel to one agent
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound for the readiness probe on an existing channel
pub const READY_TIMEOUT: Duration = Duration::from_secs(3);

/// The agent RPC surface as seen by the hub.
#[async_trait]
pub trait AgentApi: Send + Sync {
    async fn get_host_name(&self) -> std::result::Result<String, Status>;

    async fn make_segment(&self, request: MakeSegmentRequest) -> std::result::Result<(), Status>;

    async fn start_segment(&self, request: StartSegmentRequest)
        -> std::result::Result<(), Status>;

    async fn validate_host_env(
        &self,
        request: ValidateHostEnvRequest,
    ) -> std::result::Result<Vec<LogMessage>, Status>;

    async fn remove_directory(
        &self,
        request: RemoveDirectoryRequest,
    ) -> std::result::Result<(), Status>;

    async fn stop(&self) -> std::result::Result<(), Status>;

    async fn status(&self) -> std::result::Result<ServiceStatus, Status>;

    /// Whether the underlying channel can currently carry requests.
    async fn is_ready(&self) -> bool;
}

/// [`AgentApi`] over a tonic channel.
///
/// Cheap to clone: tonic's `Channel` is reference counted internally.
#[derive(Clone)]
pub struct GrpcAgent {
    client: AgentClient<Channel>,
}

impl GrpcAgent {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: AgentClient::new(channel),
        }
    }
}

#[async_trait]
impl AgentApi for GrpcAgent {
    async fn get_host_name(&self) -> std::result::Result<String, Status> {
        let reply = self
            .client
            .clone()
            .get_host_name(GetHostNameRequest {})
            .await?;
        Ok(reply.into_inner().hostname)
    }

    async fn make_segment(&self, request: MakeSegmentRequest) -> std::result::Result<(), Status> {
        self.client.clone().make_segment(request).await?;
        Ok(())
    }

    async fn start_segment(
        &self,
        request: StartSegmentRequest,
    ) -> std::result::Result<(), Status> {
        self.client.clone().start_segment(request).await?;
        Ok(())
    }

    async fn validate_host_env(
        &self,
        request: ValidateHostEnvRequest,
    ) -> std::result::Result<Vec<LogMessage>, Status> {
        let reply = self.client.clone().validate_host_env(request).await?;
        Ok(reply.into_inner().messages)
    }

    async fn remove_directory(
        &self,
        request: RemoveDirectoryRequest,
    ) -> std::result::Result<(), Status> {
        self.client.clone().remove_directory(request).await?;
        Ok(())
    }

    async fn stop(&self) -> std::result::Result<(), Status> {
        self.client.clone().stop(StopAgentRequest {}).await?;
        Ok(())
    }

    async fn status(&self) -> std::result::Result<ServiceStatus, Status> {
        let reply = self.client.clone().status(StatusAgentRequest {}).await?;
        Ok(reply.into_inner())
    }

    async fn is_ready(&self) -> bool {
        matches!(
            tokio::time::timeout(READY_TIMEOUT, self.get_host_name()).await,
            Ok(Ok(_))
        )
    }
}

/// Opens a connection to the agent on one host.
#[async_trait]
pub trait AgentDialer: Send + Sync {
    async fn dial(&self, host: &str) -> Result<Arc<dyn AgentApi>>;
}

/// Dials agents over gRPC with the configured transport credentials.
pub struct GrpcDialer {
    credentials: Arc<dyn Credentials>,
    port: u16,
}

impl GrpcDialer {
    pub fn new(credentials: Arc<dyn Credentials>, port: u16) -> Self {
        Self { credentials, port }
    }
}

#[async_trait]
impl AgentDialer for GrpcDialer {
    async fn dial(&self, host: &str) -> Result<Arc<dyn AgentApi>> {
        let dial_err = |reason: String| HubError::Dial {
            host: host.to_string(),
            reason,
        };

        let address = format!("{}://{}:{}", self.credentials.scheme(), host, self.port);
        debug!("Dialing agent at {}", address);

        let mut endpoint = Endpoint::from_shared(address)
            .map_err(|e| dial_err(format!("invalid endpoint: {}", e)))?
            .connect_timeout(DIAL_TIMEOUT);

        if let Some(tls) = self.credentials.client_tls(host)? {
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|e| dial_err(format!("invalid TLS configuration: {}", e)))?;
        }

        let channel = tokio::time::timeout(DIAL_TIMEOUT, endpoint.connect())
            .await
            .map_err(|_| dial_err(format!("timed out after {:?}", DIAL_TIMEOUT)))?
            .map_err(|e| dial_err(e.to_string()))?;

        Ok(Arc::new(GrpcAgent::new(channel)))
    }
}
