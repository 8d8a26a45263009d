//! Cluster initialization.
//!
//! [`ClusterOrchestrator::make_cluster`] drives a new cluster through a fixed
//! sequence of phases. Each phase fans out to the agents and fully drains
//! before the next one starts:
//!
//! 1. dial every agent
//! 2. validate every host
//! 3. create the coordinator and start it in utility mode
//! 4. register the topology in the coordinator's catalog and read back the
//!    authoritative dbids
//! 5. resolve the addresses segments will see the coordinator connect from
//! 6. create every primary
//! 7. restart the whole cluster in production mode
//! 8. post-provisioning SQL
//!
//! A failure in phases 4 to 6 stops the coordinator again before the error is
//! returned. Data directories are never removed here; they are recorded in
//! the cleanup manifest for [`crate::cleanup::clean_cluster`].

use crate::catalog::{CatalogConnector, CatalogTarget};
use crate::cleanup::CleanupManifest;
use crate::error::{HubError, Result};
use crate::fanout;
use crate::platform::Platform;
use crate::pool::{conn_for, AgentConn, ConnectionPool};
use crate::segment::{self, UTILITY_MODE_OPTIONS};
use crate::stream::HubStream;
use crate::validate;
use gpctl_core::cluster::{COORDINATOR_CONTENT_ID, COORDINATOR_DBID};
use gpctl_core::{ClusterParams, ClusterRequest, Segment};
use gpctl_proto::LogLevel;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

pub const PRIMARY_PROGRESS_LABEL: &str = "Initializing primary segments:";

/// The hub runs on the coordinator host. The coordinator is created without
/// peer addresses, so only the loopback rules written by `initdb` admit the
/// catalog connection.
pub const CATALOG_HOST: &str = "localhost";

pub struct ClusterOrchestrator {
    pool: Arc<ConnectionPool>,
    platform: Arc<dyn Platform>,
    catalog: Arc<dyn CatalogConnector>,
    hosts: Vec<String>,
    manifest: CleanupManifest,
}

impl ClusterOrchestrator {
    /// `hosts` is the configured set of agent hosts the pool dials.
    pub fn new(
        pool: Arc<ConnectionPool>,
        platform: Arc<dyn Platform>,
        catalog: Arc<dyn CatalogConnector>,
        hosts: Vec<String>,
        manifest: CleanupManifest,
    ) -> Self {
        Self {
            pool,
            platform,
            catalog,
            hosts,
            manifest,
        }
    }

    pub fn manifest(&self) -> &CleanupManifest {
        &self.manifest
    }

    /// Creates a new cluster, reporting progress on `stream`.
    pub async fn make_cluster(&self, request: ClusterRequest, stream: &HubStream) -> Result<()> {
        request.topology.validate()?;

        stream.info("Starting new cluster initialization");
        let conns = self.pool.dial_all(&self.hosts).await?;

        stream.info("Validating Hosts...");
        validate::validate_environment(&conns, self.platform.as_ref(), &request, stream).await?;

        let coordinator = Segment {
            content_id: COORDINATOR_CONTENT_ID,
            dbid: COORDINATOR_DBID,
            ..request.topology.coordinator.clone()
        };
        let coordinator_conn = conn_for(&conns, &coordinator.host_name)?;

        stream.info("Creating coordinator segment...");
        self.manifest.append(std::slice::from_ref(&coordinator)).await?;
        segment::create_segment(coordinator_conn, &coordinator, &request.params, &[]).await?;

        stream.info("Starting coordinator segment in utility mode...");
        segment::start_segment(
            coordinator_conn,
            &coordinator.data_directory,
            true,
            UTILITY_MODE_OPTIONS,
        )
        .await?;

        // The coordinator is running from here on; stop it if anything up to
        // the last primary fails.
        if let Err(err) = self
            .provision_primaries(&conns, &coordinator, &request, stream)
            .await
        {
            self.stop_coordinator_after_failure(&coordinator, stream).await;
            return Err(err);
        }

        stream.info("Restarting the cluster in production mode...");
        self.platform
            .stop_coordinator(&coordinator.data_directory)
            .await?;
        self.platform
            .start_cluster(&coordinator.data_directory, request.verbose, stream)
            .await?;

        self.post_provision(&coordinator, &request.params, stream)
            .await?;

        self.manifest.remove().await?;
        stream.info("Cluster initialization complete");
        Ok(())
    }

    async fn provision_primaries(
        &self,
        conns: &[AgentConn],
        coordinator: &Segment,
        request: &ClusterRequest,
        stream: &HubStream,
    ) -> Result<()> {
        stream.info("Registering segments in the catalog...");
        let primaries = self
            .register_topology(coordinator, &request.topology.primaries)
            .await?;

        let coordinator_addrs = if request.params.hba_hostnames {
            vec![coordinator.host_address.clone()]
        } else {
            self.platform.local_addresses()?
        };
        debug!("Coordinator addresses for segments: {:?}", coordinator_addrs);

        self.manifest.append(&primaries).await?;

        stream.info("Creating primary segments...");
        create_primaries(conns, primaries, &request.params, coordinator_addrs, stream).await
    }

    /// Registers the coordinator and every primary, then returns the
    /// primaries as the catalog recorded them.
    async fn register_topology(
        &self,
        coordinator: &Segment,
        primaries: &[Segment],
    ) -> Result<Vec<Segment>> {
        let catalog = self
            .catalog
            .connect(&self.catalog_target(coordinator, true))
            .await?;

        catalog.register_coordinator(coordinator).await?;
        catalog.register_primaries(primaries).await?;

        let registered: Vec<Segment> = catalog
            .segment_configuration()
            .await?
            .into_iter()
            .filter(|seg| !seg.is_coordinator())
            .collect();

        if registered.len() != primaries.len() {
            return Err(HubError::Catalog(format!(
                "expected {} registered primaries, catalog holds {}",
                primaries.len(),
                registered.len()
            )));
        }
        Ok(registered)
    }

    async fn post_provision(
        &self,
        coordinator: &Segment,
        params: &ClusterParams,
        stream: &HubStream,
    ) -> Result<()> {
        let catalog = self
            .catalog
            .connect(&self.catalog_target(coordinator, false))
            .await?;

        stream.info("Creating gp_toolkit extension...");
        catalog.create_toolkit_extension().await?;

        stream.info("Importing system collations...");
        catalog.import_collations().await?;

        if let Some(db_name) = &params.db_name {
            stream.info(format!("Creating database \"{}\"...", db_name));
            catalog.create_database(db_name).await?;
        }

        if params.su_password.is_empty() {
            debug!("No superuser password requested");
        } else {
            stream.info("Setting superuser password...");
            catalog.set_password(&params.su_password).await?;
        }
        Ok(())
    }

    async fn stop_coordinator_after_failure(&self, coordinator: &Segment, stream: &HubStream) {
        stream.warning("Cluster initialization failed, stopping the coordinator");
        if let Err(stop_err) = self
            .platform
            .stop_coordinator(&coordinator.data_directory)
            .await
        {
            error!("Failed to stop coordinator: {}", stop_err);
            stream.log(
                LogLevel::Error,
                format!("could not stop coordinator: {}", stop_err),
            );
        }
    }

    fn catalog_target(&self, coordinator: &Segment, utility: bool) -> CatalogTarget {
        CatalogTarget {
            host: CATALOG_HOST.to_string(),
            port: coordinator.port,
            user: self.platform.current_user(),
            utility,
        }
    }
}

/// Creates every primary, in parallel across hosts and within each host.
///
/// Every segment is attempted and every failure is reported.
async fn create_primaries(
    conns: &[AgentConn],
    primaries: Vec<Segment>,
    params: &ClusterParams,
    coordinator_addrs: Vec<String>,
    stream: &HubStream,
) -> Result<()> {
    let total = primaries.len();
    let params = Arc::new(params.clone());
    let coordinator_addrs = Arc::new(coordinator_addrs);

    let mut by_host: BTreeMap<String, Vec<Segment>> = BTreeMap::new();
    for primary in primaries {
        by_host
            .entry(primary.host_name.clone())
            .or_default()
            .push(primary);
    }

    let mut hosts = Vec::with_capacity(by_host.len());
    for (host, segments) in by_host {
        let conn = conn_for(conns, &host)?.clone();
        let params = params.clone();
        let coordinator_addrs = coordinator_addrs.clone();
        let stream = stream.clone();

        hosts.push(async move {
            let creates = segments.into_iter().map(|seg| {
                let conn = conn.clone();
                let params = params.clone();
                let coordinator_addrs = coordinator_addrs.clone();
                let stream = stream.clone();
                async move {
                    segment::create_segment(&conn, &seg, &params, &coordinator_addrs).await?;
                    stream.progress(PRIMARY_PROGRESS_LABEL, total);
                    Ok::<(), HubError>(())
                }
            });
            fanout::execute_join_err(creates).await?;
            Ok::<(), HubError>(())
        });
    }

    fanout::execute_join_err(hosts).await?;
    Ok(())
}
