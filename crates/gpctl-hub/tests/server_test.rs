//! The `Hub` service over mocked agents, called in-process.

mod common;

use common::*;
use gpctl_hub::{CleanupManifest, ClusterOrchestrator, ConnectionPool, HubService};
use gpctl_proto::hub_server::Hub;
use gpctl_proto::make_cluster_reply::Message;
use gpctl_proto::{
    MakeClusterRequest, StartAgentsRequest, StatusAgentsRequest, StatusHubRequest,
    StopAgentsRequest, StopHubRequest,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_stream::StreamExt;
use tonic::{Code, Request, Status};

struct Fixture {
    dialer: Arc<MockDialer>,
    platform: Arc<MockPlatform>,
    pool: Arc<ConnectionPool>,
    service: HubService,
    _log_dir: TempDir,
}

fn fixture() -> Fixture {
    let dialer = MockDialer::new(&["cdw", "sdw1", "sdw2"]);
    let platform = MockPlatform::new();
    let pool = Arc::new(ConnectionPool::new(dialer.clone()));
    let log_dir = TempDir::new().unwrap();

    let orchestrator = Arc::new(ClusterOrchestrator::new(
        pool.clone(),
        platform.clone(),
        MockConnector::new(),
        hosts(),
        CleanupManifest::in_dir(log_dir.path()),
    ));
    let service = HubService::new(pool.clone(), platform.clone(), orchestrator, hosts());

    Fixture {
        dialer,
        platform,
        pool,
        service,
        _log_dir: log_dir,
    }
}

#[tokio::test]
async fn test_stop_agents_tolerates_transport_closing() {
    let f = fixture();
    *f.dialer.agent("sdw1").stop_result.lock().unwrap() =
        Some(Status::unavailable("transport is closing"));

    f.service
        .stop_agents(Request::new(StopAgentsRequest {}))
        .await
        .unwrap();

    for host in ["cdw", "sdw1", "sdw2"] {
        assert_eq!(f.dialer.agent(host).calls_named("stop").len(), 1);
    }
    assert!(f.pool.is_empty().await);
}

#[tokio::test]
async fn test_stop_agents_surfaces_other_errors() {
    let f = fixture();
    *f.dialer.agent("sdw2").stop_result.lock().unwrap() =
        Some(Status::permission_denied("not allowed"));

    let status = f
        .service
        .stop_agents(Request::new(StopAgentsRequest {}))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::PermissionDenied);
    assert_eq!(status.message(), "host sdw2: not allowed");
    assert!(f.pool.is_empty().await);
}

#[tokio::test]
async fn test_start_agents_launches_then_dials() {
    let f = fixture();

    f.service
        .start_agents(Request::new(StartAgentsRequest {}))
        .await
        .unwrap();

    assert_eq!(*f.platform.started_agents.lock().unwrap(), hosts());
    assert_eq!(f.pool.len().await, 3);
}

#[tokio::test]
async fn test_status_agents_sorted_by_host() {
    let f = fixture();

    let reply = f
        .service
        .status_agents(Request::new(StatusAgentsRequest {}))
        .await
        .unwrap()
        .into_inner();

    let hosts: Vec<String> = reply.statuses.into_iter().map(|s| s.host).collect();
    assert_eq!(hosts, vec!["cdw", "sdw1", "sdw2"]);
}

#[tokio::test]
async fn test_status_reports_hub_role() {
    let f = fixture();
    let status = f
        .service
        .status(Request::new(StatusHubRequest {}))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(status.role, "hub");
    assert_eq!(status.pid, std::process::id());
}

#[tokio::test]
async fn test_stop_signals_shutdown() {
    let f = fixture();
    let (service, shutdown) = f.service.with_shutdown();

    service
        .stop(Request::new(StopHubRequest {}))
        .await
        .unwrap();

    assert!(shutdown.await.is_ok());
}

#[tokio::test]
async fn test_make_cluster_stream_ends_with_error_status() {
    let f = fixture();
    f.dialer.set_unreachable("sdw1", true);
    let request = MakeClusterRequest::from(&cluster_request());

    let mut replies = f
        .service
        .make_cluster(Request::new(request))
        .await
        .unwrap()
        .into_inner();

    let mut items = Vec::new();
    while let Some(item) = replies.next().await {
        items.push(item);
    }

    let last = items.pop().unwrap();
    let status = last.unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);
    assert!(status.message().contains("sdw1"));
    assert!(items.iter().all(|i| i.is_ok()));
}

#[tokio::test]
async fn test_make_cluster_stream_completes() {
    let f = fixture();
    let request = MakeClusterRequest::from(&cluster_request());

    let mut replies = f
        .service
        .make_cluster(Request::new(request))
        .await
        .unwrap()
        .into_inner();

    let mut last_log = None;
    while let Some(item) = replies.next().await {
        if let Some(Message::LogMsg(m)) = item.unwrap().message {
            last_log = Some(m.message);
        }
    }
    assert_eq!(last_log.as_deref(), Some("Cluster initialization complete"));
}

#[tokio::test]
async fn test_make_cluster_rejects_request_without_coordinator() {
    let f = fixture();

    let err = match f
        .service
        .make_cluster(Request::new(MakeClusterRequest::default()))
        .await
    {
        Ok(_) => panic!("a request without a topology must be rejected"),
        Err(status) => status,
    };
    assert_eq!(err.code(), Code::InvalidArgument);
}
