//! gRPC server implementation for the hub.
//!
//! The `Hub` service is what the CLI talks to. Cluster initialization runs on
//! its own task and reports through the `MakeCluster` response stream; the
//! remaining calls are thin fan-out wrappers over the agents.

use crate::cleanup;
use crate::error::HubError;
use crate::fanout;
use crate::make_cluster::ClusterOrchestrator;
use crate::platform::Platform;
use crate::pool::ConnectionPool;
use crate::stream::HubStream;
use futures::Stream;
use gpctl_core::rpc::ignore_transport_closing;
use gpctl_core::{ClusterRequest, Credentials};
use gpctl_proto::hub_server::{Hub, HubServer};
use gpctl_proto::{
    CleanClusterReply, CleanClusterRequest, MakeClusterReply, MakeClusterRequest, ServiceStatus,
    StartAgentsReply, StartAgentsRequest, StatusAgentsReply, StatusAgentsRequest,
    StatusHubRequest, StopAgentsReply, StopAgentsRequest, StopHubReply, StopHubRequest,
};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::oneshot;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

pub struct HubService {
    pool: Arc<ConnectionPool>,
    platform: Arc<dyn Platform>,
    orchestrator: Arc<ClusterOrchestrator>,
    hosts: Vec<String>,
    started: Instant,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl HubService {
    pub fn new(
        pool: Arc<ConnectionPool>,
        platform: Arc<dyn Platform>,
        orchestrator: Arc<ClusterOrchestrator>,
        hosts: Vec<String>,
    ) -> Self {
        Self {
            pool,
            platform,
            orchestrator,
            hosts,
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

    fn signal_shutdown(&self) {
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
    }
}

/// Host name of the local machine, as reported in status replies.
pub fn local_host_name() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string())
}

#[tonic::async_trait]
impl Hub for HubService {
    async fn stop(&self, _request: Request<StopHubRequest>) -> Result<Response<StopHubReply>, Status> {
        info!("Stop requested, shutting down the hub");
        self.pool.close_all().await;
        self.signal_shutdown();
        Ok(Response::new(StopHubReply {}))
    }

    async fn status(
        &self,
        _request: Request<StatusHubRequest>,
    ) -> Result<Response<ServiceStatus>, Status> {
        Ok(Response::new(ServiceStatus {
            role: "hub".to_string(),
            host: local_host_name(),
            status: "running".to_string(),
            uptime_secs: self.started.elapsed().as_secs(),
            pid: std::process::id(),
        }))
    }

    async fn start_agents(
        &self,
        _request: Request<StartAgentsRequest>,
    ) -> Result<Response<StartAgentsReply>, Status> {
        info!("Starting agents on {} hosts", self.hosts.len());
        self.platform.start_agents(&self.hosts).await?;
        self.pool.dial_all(&self.hosts).await?;
        Ok(Response::new(StartAgentsReply {}))
    }

    async fn stop_agents(
        &self,
        _request: Request<StopAgentsRequest>,
    ) -> Result<Response<StopAgentsReply>, Status> {
        info!("Stopping agents on {} hosts", self.hosts.len());
        let conns = self.pool.dial_all(&self.hosts).await?;

        let stopped = fanout::execute_rpc(&conns, |conn| async move {
            ignore_transport_closing(conn.agent.stop().await)
                .map_err(HubError::agent(&conn.hostname))
        })
        .await;

        // Stopped agents leave dead channels behind either way
        self.pool.close_all().await;
        stopped?;
        Ok(Response::new(StopAgentsReply {}))
    }

    async fn status_agents(
        &self,
        _request: Request<StatusAgentsRequest>,
    ) -> Result<Response<StatusAgentsReply>, Status> {
        let conns = self.pool.dial_all(&self.hosts).await?;
        let queries = conns.into_iter().map(|conn| async move {
            conn.agent
                .status()
                .await
                .map_err(HubError::agent(&conn.hostname))
        });

        let mut statuses = fanout::execute_first_err(queries).await?;
        statuses.sort_by(|a, b| a.host.cmp(&b.host));
        Ok(Response::new(StatusAgentsReply { statuses }))
    }

    type MakeClusterStream = Pin<Box<dyn Stream<Item = Result<MakeClusterReply, Status>> + Send>>;

    async fn make_cluster(
        &self,
        request: Request<MakeClusterRequest>,
    ) -> Result<Response<Self::MakeClusterStream>, Status> {
        let request = ClusterRequest::try_from(request.into_inner())
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        let (stream, rx) = HubStream::channel();
        let orchestrator = self.orchestrator.clone();

        tokio::spawn(async move {
            if let Err(err) = orchestrator.make_cluster(request, &stream).await {
                error!("Cluster initialization failed: {}", err);
                stream.fail(Status::from(err));
            }
        });

        let replies = UnboundedReceiverStream::new(rx);
        Ok(Response::new(Box::pin(replies) as Self::MakeClusterStream))
    }

    async fn clean_cluster(
        &self,
        _request: Request<CleanClusterRequest>,
    ) -> Result<Response<CleanClusterReply>, Status> {
        cleanup::clean_cluster(&self.pool, &self.hosts, self.orchestrator.manifest()).await?;
        Ok(Response::new(CleanClusterReply {}))
    }
}

/// Serves the hub on `addr` until `Stop` is called.
pub async fn serve(
    service: HubService,
    addr: SocketAddr,
    credentials: &dyn Credentials,
) -> anyhow::Result<()> {
    let (service, shutdown) = service.with_shutdown();

    let mut builder = Server::builder();
    if let Some(tls) = credentials.server_tls()? {
        builder = builder.tls_config(tls)?;
    }

    info!("Hub listening on {}", addr);
    builder
        .add_service(HubServer::new(service))
        .serve_with_shutdown(addr, async {
            let _ = shutdown.await;
        })
        .await?;

    info!("Hub stopped");
    Ok(())
}
