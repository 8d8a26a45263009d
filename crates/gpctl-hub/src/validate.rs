//! Cross-host precondition checks run before anything is created.

use crate::error::{HubError, Result};
use crate::fanout;
use crate::platform::Platform;
use crate::pool::{conn_for, AgentConn};
use crate::segment::{self, HostChecks};
use crate::stream::HubStream;
use gpctl_core::ClusterRequest;
use gpctl_proto::LogMessage;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const VALIDATE_PROGRESS_LABEL: &str = "Validating Hosts:";

/// Groups the directories, ports and addresses of every segment by host.
pub fn host_checks(request: &ClusterRequest) -> BTreeMap<String, HostChecks> {
    let mut checks: BTreeMap<String, HostChecks> = BTreeMap::new();
    for seg in request.topology.segments() {
        let host = checks.entry(seg.host_name.clone()).or_default();
        host.directories.push(seg.data_directory.clone());
        host.ports.push(seg.port);
        if !host.host_addresses.contains(&seg.host_address) {
            host.host_addresses.push(seg.host_address.clone());
        }
    }
    checks
}

/// Validates every host of the request in parallel.
///
/// The coordinator's binary version is read once and every host is compared
/// against it. A progress tick is sent as each host finishes; warnings are
/// only streamed once all hosts have answered, and are also returned. The
/// first fatal host error fails the whole validation.
pub async fn validate_environment(
    conns: &[AgentConn],
    platform: &dyn Platform,
    request: &ClusterRequest,
    stream: &HubStream,
) -> Result<Vec<LogMessage>> {
    let gp_version = platform.gp_version().await?;
    debug!("Validating hosts against version {}", gp_version);

    let checks = host_checks(request);
    let total = checks.len();
    let locale = Arc::new(request.params.locale.clone());
    let force = request.force;
    let gp_version = Arc::new(gp_version);

    let mut tasks = Vec::with_capacity(total);
    for (host, host_checks) in checks {
        let conn = conn_for(conns, &host)?.clone();
        let stream = stream.clone();
        let locale = locale.clone();
        let gp_version = gp_version.clone();

        tasks.push(async move {
            let warnings =
                segment::validate_host_env(&conn, &host_checks, &locale, force, &gp_version)
                    .await?;
            stream.progress(VALIDATE_PROGRESS_LABEL, total);
            Ok::<_, HubError>(warnings)
        });
    }

    let warnings: Vec<LogMessage> = fanout::execute_first_err(tasks)
        .await?
        .into_iter()
        .flatten()
        .collect();

    for warning in &warnings {
        stream.forward(warning.clone());
    }
    Ok(warnings)
}
