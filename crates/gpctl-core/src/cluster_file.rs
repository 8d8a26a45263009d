//! The cluster description file given to `gpctl init`.
//!
//! ```toml
//! [coordinator]
//! hostname = "cdw"
//! address = "cdw"
//! port = 5432
//! data_directory = "/data/coordinator/gpseg-1"
//!
//! [[primary_segments]]
//! hostname = "sdw1"
//! address = "sdw1"
//! port = 6000
//! data_directory = "/data/primary/gpseg0"
//!
//! [parameters]
//! encoding = "UTF-8"
//! db_name = "sales"
//!
//! [parameters.common_config]
//! max_connections = "250"
//! ```

use crate::cluster::{ClusterParams, ClusterRequest, ClusterTopology, Segment};
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentEntry {
    pub hostname: String,
    /// Address the segment is reached at; the host name when omitted
    #[serde(default)]
    pub address: Option<String>,
    pub port: u16,
    pub data_directory: String,
}

impl From<&SegmentEntry> for Segment {
    fn from(entry: &SegmentEntry) -> Self {
        Segment {
            host_name: entry.hostname.clone(),
            host_address: entry
                .address
                .clone()
                .unwrap_or_else(|| entry.hostname.clone()),
            port: entry.port,
            data_directory: entry.data_directory.clone(),
            content_id: 0,
            dbid: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterFile {
    pub coordinator: SegmentEntry,
    #[serde(default)]
    pub primary_segments: Vec<SegmentEntry>,
    #[serde(default)]
    pub parameters: ClusterParams,
}

impl ClusterFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| CoreError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| CoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds a validated request; content ids follow the order of
    /// `primary_segments`.
    pub fn into_request(self, force: bool, verbose: bool) -> Result<ClusterRequest> {
        let topology = ClusterTopology::new(
            Segment::from(&self.coordinator),
            self.primary_segments.iter().map(Segment::from).collect(),
        );
        topology.validate()?;

        Ok(ClusterRequest {
            topology,
            params: self.parameters,
            force,
            verbose,
        })
    }
}
