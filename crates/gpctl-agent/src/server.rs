//! gRPC server implementation for the agent.

use crate::segment::{self, SegmentManager};
use crate::validate::HostValidator;
use gpctl_core::Credentials;
use gpctl_proto::agent_server::{Agent, AgentServer};
use gpctl_proto::{
    GetHostNameReply, GetHostNameRequest, MakeSegmentReply, MakeSegmentRequest,
    RemoveDirectoryReply, RemoveDirectoryRequest, ServiceStatus, StartSegmentReply,
    StartSegmentRequest, StatusAgentRequest, StopAgentReply, StopAgentRequest,
    ValidateHostEnvReply, ValidateHostEnvRequest,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::oneshot;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

pub struct AgentService {
    validator: HostValidator,
    segments: SegmentManager,
    started: Instant,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl AgentService {
    pub fn new(gphome: PathBuf) -> Self {
        Self::with_validator(HostValidator::new(gphome.clone()), SegmentManager::new(gphome))
    }

    pub fn with_validator(validator: HostValidator, segments: SegmentManager) -> Self {
        Self {
            validator,
            segments,
            started: Instant::now(),
            shutdown: Mutex::new(None),
        }
    }

    /// Returns the service plus a receiver that fires when `Stop` is called.
    pub fn with_shutdown(self) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let service = Self {
            shutdown: Mutex::new(Some(tx)),
            ..self
        };
        (service, rx)
    }
}

#[tonic::async_trait]
impl Agent for AgentService {
    async fn get_host_name(
        &self,
        _request: Request<GetHostNameRequest>,
    ) -> Result<Response<GetHostNameReply>, Status> {
        Ok(Response::new(GetHostNameReply {
            hostname: crate::local_host_name(),
        }))
    }

    async fn make_segment(
        &self,
        request: Request<MakeSegmentRequest>,
    ) -> Result<Response<MakeSegmentReply>, Status> {
        self.segments
            .make_segment(request.into_inner())
            .await
            .inspect_err(|e| error!("MakeSegment failed: {}", e))?;
        Ok(Response::new(MakeSegmentReply {}))
    }

    async fn start_segment(
        &self,
        request: Request<StartSegmentRequest>,
    ) -> Result<Response<StartSegmentReply>, Status> {
        self.segments
            .start_segment(request.into_inner())
            .await
            .inspect_err(|e| error!("StartSegment failed: {}", e))?;
        Ok(Response::new(StartSegmentReply {}))
    }

    async fn validate_host_env(
        &self,
        request: Request<ValidateHostEnvRequest>,
    ) -> Result<Response<ValidateHostEnvReply>, Status> {
        let messages = self
            .validator
            .validate(&request.into_inner())
            .await
            .inspect_err(|e| error!("Host validation failed: {}", e))?;
        Ok(Response::new(ValidateHostEnvReply { messages }))
    }

    async fn remove_directory(
        &self,
        request: Request<RemoveDirectoryRequest>,
    ) -> Result<Response<RemoveDirectoryReply>, Status> {
        segment::remove_directory(&request.into_inner().data_directory).await?;
        Ok(Response::new(RemoveDirectoryReply {}))
    }

    async fn stop(
        &self,
        _request: Request<StopAgentRequest>,
    ) -> Result<Response<StopAgentReply>, Status> {
        info!("Stop requested, shutting down the agent");
        let sender = match self.shutdown.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => {
                let _ = tx.send(());
            }
            None => warn!("Stop requested but no shutdown handle is installed"),
        }
        Ok(Response::new(StopAgentReply {}))
    }

    async fn status(
        &self,
        _request: Request<StatusAgentRequest>,
    ) -> Result<Response<ServiceStatus>, Status> {
        Ok(Response::new(ServiceStatus {
            role: "agent".to_string(),
            host: crate::local_host_name(),
            status: "running".to_string(),
            uptime_secs: self.started.elapsed().as_secs(),
            pid: std::process::id(),
        }))
    }
}

/// Serves the agent on `addr` until `Stop` is called.
pub async fn serve(
    service: AgentService,
    addr: SocketAddr,
    credentials: &dyn Credentials,
) -> anyhow::Result<()> {
    let (service, shutdown) = service.with_shutdown();

    let mut builder = Server::builder();
    if let Some(tls) = credentials.server_tls()? {
        builder = builder.tls_config(tls)?;
    }

    info!("Agent listening on {}", addr);
    builder
        .add_service(AgentServer::new(service))
        .serve_with_shutdown(addr, async {
            let _ = shutdown.await;
        })
        .await?;

    info!("Agent stopped");
    Ok(())
}
