//! Segment lifecycle calls against a single agent connection.
//!
//! Each call is issued exactly once; retries are left to the transport.

use crate::error::{HubError, Result};
use crate::pool::AgentConn;
use gpctl_core::{ClusterParams, Locale, Segment};
use gpctl_proto as pb;

/// `postgres` options that restrict an instance to maintenance connections
pub const UTILITY_MODE_OPTIONS: &str = "-c gp_role=utility";

/// Seconds `pg_ctl` may wait for an instance to accept connections
pub const START_TIMEOUT_SECS: i32 = 600;

/// Creates the database instance for `segment` on the connection's host.
///
/// The instance is configured with the common tier merged with the
/// coordinator or segment tier, chosen by content-id. `coordinator_addrs`
/// become host-based-auth rules; the coordinator itself gets none.
pub async fn create_segment(
    conn: &AgentConn,
    segment: &Segment,
    params: &ClusterParams,
    coordinator_addrs: &[String],
) -> Result<()> {
    let request = pb::MakeSegmentRequest {
        segment: Some(pb::Segment::from(segment)),
        locale: Some(pb::Locale::from(&params.locale)),
        encoding: params.encoding.clone(),
        segment_config: params.config_for(segment.content_id).into_iter().collect(),
        ip_list: coordinator_addrs.to_vec(),
        hba_hostnames: params.hba_hostnames,
        data_checksums: params.data_checksums,
    };

    conn.agent
        .make_segment(request)
        .await
        .map_err(|status| HubError::Segment {
            host: conn.hostname.clone(),
            data_dir: segment.data_directory.clone(),
            status,
        })
}

/// Starts the instance in `data_dir`, optionally blocking until it is ready.
pub async fn start_segment(
    conn: &AgentConn,
    data_dir: &str,
    wait: bool,
    options: &str,
) -> Result<()> {
    let request = pb::StartSegmentRequest {
        data_dir: data_dir.to_string(),
        wait,
        timeout: START_TIMEOUT_SECS,
        options: options.to_string(),
    };

    conn.agent
        .start_segment(request)
        .await
        .map_err(|status| HubError::Segment {
            host: conn.hostname.clone(),
            data_dir: data_dir.to_string(),
            status,
        })
}

/// What one host must check before anything is created on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostChecks {
    pub directories: Vec<String>,
    pub ports: Vec<u16>,
    pub host_addresses: Vec<String>,
}

/// Runs the agent's environment checks and returns its warnings.
pub async fn validate_host_env(
    conn: &AgentConn,
    checks: &HostChecks,
    locale: &Locale,
    forced: bool,
    gp_version: &str,
) -> Result<Vec<pb::LogMessage>> {
    let request = pb::ValidateHostEnvRequest {
        directory_list: checks.directories.clone(),
        locale: Some(pb::Locale::from(locale)),
        port_list: checks.ports.iter().map(|p| i32::from(*p)).collect(),
        forced,
        host_address_list: checks.host_addresses.clone(),
        gp_version: gp_version.to_string(),
    };

    conn.agent
        .validate_host_env(request)
        .await
        .map_err(HubError::agent(&conn.hostname))
}

/// Removes a data directory on the connection's host.
pub async fn remove_directory(conn: &AgentConn, data_dir: &str) -> Result<()> {
    conn.agent
        .remove_directory(pb::RemoveDirectoryRequest {
            data_directory: data_dir.to_string(),
        })
        .await
        .map_err(|status| HubError::Segment {
            host: conn.hostname.clone(),
            data_dir: data_dir.to_string(),
            status,
        })
}
