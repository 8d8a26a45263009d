//! Test doubles for the hub's agent, platform and catalog seams.

#![allow(dead_code)]

use async_trait::async_trait;
use gpctl_core::{ClusterParams, ClusterRequest, ClusterTopology, Segment};
use gpctl_hub::error::{HubError, Result};
use gpctl_hub::{AgentApi, AgentDialer, Catalog, CatalogConnector, CatalogTarget, HubStream, Platform};
use gpctl_proto::{
    LogLevel, LogMessage, MakeSegmentRequest, RemoveDirectoryRequest, ServiceStatus,
    StartSegmentRequest, ValidateHostEnvRequest,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tonic::Status;

/// Agent that records every call and fails on request.
pub struct MockAgent {
    pub host: String,
    pub ready: AtomicBool,
    pub panic_on_ready: AtomicBool,
    pub forced: Mutex<Vec<bool>>,
    pub calls: Mutex<Vec<String>>,
    pub warnings: Mutex<Vec<String>>,
    pub fail_validate: Mutex<Option<Status>>,
    pub fail_make_dirs: Mutex<HashSet<String>>,
    pub stop_result: Mutex<Option<Status>>,
}

impl MockAgent {
    pub fn new(host: &str) -> Arc<Self> {
        Arc::new(Self {
            host: host.to_string(),
            ready: AtomicBool::new(true),
            panic_on_ready: AtomicBool::new(false),
            forced: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            warnings: Mutex::new(Vec::new()),
            fail_validate: Mutex::new(None),
            fail_make_dirs: Mutex::new(HashSet::new()),
            stop_result: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_named(&self, name: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(name))
            .collect()
    }

    pub fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    pub fn fail_make_segment(&self, dir: &str) {
        self.fail_make_dirs.lock().unwrap().insert(dir.to_string());
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AgentApi for MockAgent {
    async fn get_host_name(&self) -> std::result::Result<String, Status> {
        self.record("get_host_name".into());
        Ok(self.host.clone())
    }

    async fn make_segment(&self, request: MakeSegmentRequest) -> std::result::Result<(), Status> {
        let segment = request.segment.unwrap_or_default();
        self.record(format!(
            "make_segment {} dbid={} addrs={}",
            segment.data_directory,
            segment.dbid,
            request.ip_list.join(",")
        ));
        if self.fail_make_dirs.lock().unwrap().contains(&segment.data_directory) {
            return Err(Status::internal(format!(
                "initdb failed for {}",
                segment.data_directory
            )));
        }
        Ok(())
    }

    async fn start_segment(
        &self,
        request: StartSegmentRequest,
    ) -> std::result::Result<(), Status> {
        self.record(format!("start_segment {} {}", request.data_dir, request.options));
        Ok(())
    }

    async fn validate_host_env(
        &self,
        request: ValidateHostEnvRequest,
    ) -> std::result::Result<Vec<LogMessage>, Status> {
        self.record(format!(
            "validate_host_env {} version={}",
            request.directory_list.join(","),
            request.gp_version
        ));
        self.forced.lock().unwrap().push(request.forced);
        if let Some(status) = self.fail_validate.lock().unwrap().clone() {
            return Err(status);
        }
        Ok(self
            .warnings
            .lock()
            .unwrap()
            .iter()
            .map(|w| LogMessage {
                level: LogLevel::Warning as i32,
                message: w.clone(),
            })
            .collect())
    }

    async fn remove_directory(
        &self,
        request: RemoveDirectoryRequest,
    ) -> std::result::Result<(), Status> {
        self.record(format!("remove_directory {}", request.data_directory));
        Ok(())
    }

    async fn stop(&self) -> std::result::Result<(), Status> {
        self.record("stop".into());
        match self.stop_result.lock().unwrap().clone() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    async fn status(&self) -> std::result::Result<ServiceStatus, Status> {
        self.record("status".into());
        Ok(ServiceStatus {
            role: "agent".into(),
            host: self.host.clone(),
            status: "running".into(),
            uptime_secs: 1,
            pid: 42,
        })
    }

    async fn is_ready(&self) -> bool {
        if self.panic_on_ready.load(Ordering::SeqCst) {
            panic!("readiness check on {} blew up", self.host);
        }
        self.ready.load(Ordering::SeqCst)
    }
}

/// Dialer handing out [`MockAgent`]s; hosts in `unreachable` fail to dial.
pub struct MockDialer {
    pub agents: BTreeMap<String, Arc<MockAgent>>,
    pub unreachable: Mutex<HashSet<String>>,
    pub dials: AtomicUsize,
}

impl MockDialer {
    pub fn new(hosts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            agents: hosts
                .iter()
                .map(|h| (h.to_string(), MockAgent::new(h)))
                .collect(),
            unreachable: Mutex::new(HashSet::new()),
            dials: AtomicUsize::new(0),
        })
    }

    pub fn agent(&self, host: &str) -> Arc<MockAgent> {
        self.agents[host].clone()
    }

    pub fn set_unreachable(&self, host: &str, unreachable: bool) {
        let mut hosts = self.unreachable.lock().unwrap();
        if unreachable {
            hosts.insert(host.to_string());
        } else {
            hosts.remove(host);
        }
    }

    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Every RPC any agent received, dials excluded.
    pub fn total_calls(&self) -> usize {
        self.agents.values().map(|a| a.calls().len()).sum()
    }
}

#[async_trait]
impl AgentDialer for MockDialer {
    async fn dial(&self, host: &str) -> Result<Arc<dyn AgentApi>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.lock().unwrap().contains(host) {
            return Err(HubError::Dial {
                host: host.to_string(),
                reason: "connection refused".into(),
            });
        }
        match self.agents.get(host) {
            Some(agent) => Ok(agent.clone() as Arc<dyn AgentApi>),
            None => Err(HubError::Dial {
                host: host.to_string(),
                reason: "unknown host".into(),
            }),
        }
    }
}

/// Platform recording coordinator stops and cluster starts.
#[derive(Default)]
pub struct MockPlatform {
    pub stops: AtomicUsize,
    pub starts: AtomicUsize,
    pub fail_start_cluster: AtomicBool,
    pub started_agents: Mutex<Vec<String>>,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn gp_version(&self) -> Result<String> {
        Ok("postgres (Greenplum Database) 7.1.0".into())
    }

    fn local_addresses(&self) -> Result<Vec<String>> {
        Ok(vec!["10.0.0.1".into(), "192.168.1.1".into()])
    }

    async fn stop_coordinator(&self, _data_dir: &str) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start_cluster(&self, _data_dir: &str, _verbose: bool, stream: &HubStream) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        stream.stdout("Database successfully started");
        if self.fail_start_cluster.load(Ordering::SeqCst) {
            return Err(HubError::Command {
                command: "gpstart".into(),
                reason: "exit status: 2".into(),
            });
        }
        Ok(())
    }

    async fn start_agents(&self, hosts: &[String]) -> Result<()> {
        self.started_agents.lock().unwrap().extend_from_slice(hosts);
        Ok(())
    }

    fn current_user(&self) -> String {
        "gpadmin".into()
    }
}

/// Shared state behind every catalog connection handed out by
/// [`MockConnector`].
#[derive(Default)]
pub struct CatalogState {
    pub registered: Mutex<Vec<Segment>>,
    pub statements: Mutex<Vec<String>>,
    pub targets: Mutex<Vec<CatalogTarget>>,
    pub fail_register_primaries: AtomicBool,
    pub fail_toolkit: AtomicBool,
}

impl CatalogState {
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

pub struct MockConnector {
    pub state: Arc<CatalogState>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(CatalogState::default()),
        })
    }
}

#[async_trait]
impl CatalogConnector for MockConnector {
    async fn connect(&self, target: &CatalogTarget) -> Result<Box<dyn Catalog>> {
        self.state.targets.lock().unwrap().push(target.clone());
        Ok(Box::new(MockCatalog {
            state: self.state.clone(),
        }))
    }
}

pub struct MockCatalog {
    state: Arc<CatalogState>,
}

impl MockCatalog {
    fn record(&self, statement: String) {
        self.state.statements.lock().unwrap().push(statement);
    }
}

#[async_trait]
impl Catalog for MockCatalog {
    async fn register_coordinator(&self, coordinator: &Segment) -> Result<()> {
        self.record(format!("register_coordinator {}", coordinator.data_directory));
        self.state.registered.lock().unwrap().push(coordinator.clone());
        Ok(())
    }

    async fn register_primaries(&self, primaries: &[Segment]) -> Result<()> {
        if self.state.fail_register_primaries.load(Ordering::SeqCst) {
            return Err(HubError::Catalog("gp_add_segment_primary failed".into()));
        }
        let mut registered = self.state.registered.lock().unwrap();
        for primary in primaries {
            // The catalog hands out dbids after the coordinator's
            let dbid = registered.len() as i32 + 1;
            registered.push(Segment {
                dbid,
                ..primary.clone()
            });
        }
        self.record(format!("register_primaries {}", primaries.len()));
        Ok(())
    }

    async fn segment_configuration(&self) -> Result<Vec<Segment>> {
        Ok(self.state.registered.lock().unwrap().clone())
    }

    async fn create_toolkit_extension(&self) -> Result<()> {
        if self.state.fail_toolkit.load(Ordering::SeqCst) {
            return Err(HubError::Catalog("gp_toolkit missing".into()));
        }
        self.record("create_toolkit_extension".into());
        Ok(())
    }

    async fn import_collations(&self) -> Result<()> {
        self.record("import_collations".into());
        Ok(())
    }

    async fn create_database(&self, name: &str) -> Result<()> {
        self.record(format!("create_database {}", name));
        Ok(())
    }

    async fn set_password(&self, _password: &str) -> Result<()> {
        self.record("set_password".into());
        Ok(())
    }
}

pub fn segment(host: &str, port: u16, dir: &str) -> Segment {
    Segment {
        host_name: host.into(),
        host_address: format!("{}.example.com", host),
        port,
        data_directory: dir.into(),
        content_id: 0,
        dbid: 0,
    }
}

/// Coordinator on `cdw`, two primaries on each of `sdw1` and `sdw2`.
pub fn cluster_request() -> ClusterRequest {
    ClusterRequest {
        topology: ClusterTopology::new(
            segment("cdw", 5432, "/data/coordinator/gpseg-1"),
            vec![
                segment("sdw1", 6000, "/data/primary/gpseg0"),
                segment("sdw1", 6001, "/data/primary/gpseg1"),
                segment("sdw2", 6000, "/data/primary/gpseg2"),
                segment("sdw2", 6001, "/data/primary/gpseg3"),
            ],
        ),
        params: ClusterParams {
            su_password: "changeme".into(),
            db_name: Some("sales".into()),
            ..ClusterParams::default()
        },
        force: false,
        verbose: false,
    }
}

pub fn hosts() -> Vec<String> {
    vec!["cdw".into(), "sdw1".into(), "sdw2".into()]
}
