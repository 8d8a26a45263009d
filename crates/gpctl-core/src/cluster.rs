//! Cluster topology and provisioning parameters.
//!
//! A [`ClusterRequest`] is what the CLI submits to the hub: one coordinator,
//! an ordered list of primaries and the parameters every instance is created
//! with. The wire form lives in `gpctl-proto`; see [`crate::convert`].

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Content-id reserved for the coordinator.
pub const COORDINATOR_CONTENT_ID: i32 = -1;

/// Catalog dbid the coordinator is always registered with.
pub const COORDINATOR_DBID: i32 = 1;

/// One database instance of the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    pub host_name: String,
    /// Address other cluster members use to reach this host
    pub host_address: String,
    pub port: u16,
    pub data_directory: String,
    pub content_id: i32,
    /// Catalog id; zero until the coordinator catalog assigns one
    pub dbid: i32,
}

impl Segment {
    pub fn is_coordinator(&self) -> bool {
        self.content_id == COORDINATOR_CONTENT_ID
    }
}

/// Coordinator plus primaries, in the order the caller declared them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTopology {
    pub coordinator: Segment,
    pub primaries: Vec<Segment>,
}

impl ClusterTopology {
    /// Builds a topology from declared segments, assigning content-ids in
    /// declaration order and dbid 1 to the coordinator.
    ///
    /// Primary dbids stay zero: they are handed out by the catalog during
    /// registration.
    pub fn new(mut coordinator: Segment, mut primaries: Vec<Segment>) -> Self {
        coordinator.content_id = COORDINATOR_CONTENT_ID;
        coordinator.dbid = COORDINATOR_DBID;
        for (content_id, primary) in primaries.iter_mut().enumerate() {
            primary.content_id = content_id as i32;
            primary.dbid = 0;
        }
        Self {
            coordinator,
            primaries,
        }
    }

    /// Coordinator first, then every primary.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        std::iter::once(&self.coordinator).chain(self.primaries.iter())
    }

    /// Checks the structural invariants of the topology.
    ///
    /// Nothing here talks to a host; a topology that fails validation never
    /// reaches the agents.
    pub fn validate(&self) -> Result<()> {
        if self.coordinator.content_id != COORDINATOR_CONTENT_ID {
            return Err(CoreError::Topology(format!(
                "coordinator must have content-id {}, got {}",
                COORDINATOR_CONTENT_ID, self.coordinator.content_id
            )));
        }

        if self.primaries.is_empty() {
            return Err(CoreError::Topology(
                "at least one primary segment is required".to_string(),
            ));
        }

        let mut contents = HashSet::new();
        for primary in &self.primaries {
            if primary.content_id < 0 {
                return Err(CoreError::Topology(format!(
                    "primary {}:{} has content-id {}, expected a value >= 0",
                    primary.host_name, primary.data_directory, primary.content_id
                )));
            }
            if !contents.insert(primary.content_id) {
                return Err(CoreError::Topology(format!(
                    "content-id {} is assigned to more than one primary",
                    primary.content_id
                )));
            }
        }

        let mut dbids = HashSet::new();
        let mut directories = HashSet::new();
        let mut ports = HashSet::new();

        for seg in self.segments() {
            if seg.host_name.is_empty() || seg.host_address.is_empty() {
                return Err(CoreError::Topology(format!(
                    "segment with data directory {} is missing a host name or address",
                    seg.data_directory
                )));
            }
            if seg.data_directory.is_empty() {
                return Err(CoreError::Topology(format!(
                    "segment on host {} is missing a data directory",
                    seg.host_name
                )));
            }
            if seg.port == 0 {
                return Err(CoreError::Topology(format!(
                    "segment {}:{} has no port",
                    seg.host_name, seg.data_directory
                )));
            }
            if seg.dbid != 0 && !dbids.insert(seg.dbid) {
                return Err(CoreError::Topology(format!(
                    "dbid {} is assigned to more than one segment",
                    seg.dbid
                )));
            }
            if !directories.insert((seg.host_name.as_str(), seg.data_directory.as_str())) {
                return Err(CoreError::Topology(format!(
                    "duplicate data directory {} on host {}",
                    seg.data_directory, seg.host_name
                )));
            }
            // A multi-homed host still has one port namespace.
            if !ports.insert((seg.host_name.as_str(), seg.port)) {
                return Err(CoreError::Topology(format!(
                    "duplicate port {} on host {}",
                    seg.port, seg.host_name
                )));
            }
        }

        Ok(())
    }
}

/// Locale categories passed to `initdb`. Empty strings mean "unset".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Locale {
    pub lc_all: String,
    pub lc_collate: String,
    pub lc_ctype: String,
    pub lc_messages: String,
    pub lc_monetary: String,
    pub lc_numeric: String,
    pub lc_time: String,
}

impl Locale {
    /// Every category that was set, without duplicates, in declaration order.
    pub fn requested(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        [
            &self.lc_all,
            &self.lc_collate,
            &self.lc_ctype,
            &self.lc_messages,
            &self.lc_monetary,
            &self.lc_numeric,
            &self.lc_time,
        ]
        .into_iter()
        .map(String::as_str)
        .filter(|value| !value.is_empty() && seen.insert(*value))
        .collect()
    }
}

/// Parameters shared by every instance created for one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterParams {
    #[serde(default)]
    pub locale: Locale,

    #[serde(default = "default_encoding")]
    pub encoding: String,

    #[serde(default)]
    pub data_checksums: bool,

    /// Configuration applied to every instance
    #[serde(default)]
    pub common_config: BTreeMap<String, String>,

    /// Configuration applied to the coordinator only
    #[serde(default)]
    pub coordinator_config: BTreeMap<String, String>,

    /// Configuration applied to primaries only
    #[serde(default)]
    pub segment_config: BTreeMap<String, String>,

    /// Use host names instead of numeric addresses in host-based-auth rules
    #[serde(default)]
    pub hba_hostnames: bool,

    #[serde(default)]
    pub su_password: String,

    /// Database to create once the cluster is up
    #[serde(default)]
    pub db_name: Option<String>,
}

fn default_encoding() -> String {
    "UTF-8".to_string()
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            encoding: default_encoding(),
            data_checksums: false,
            common_config: BTreeMap::new(),
            coordinator_config: BTreeMap::new(),
            segment_config: BTreeMap::new(),
            hba_hostnames: false,
            su_password: String::new(),
            db_name: None,
        }
    }
}

impl ClusterParams {
    /// Merged configuration for an instance: the common tier first, then the
    /// coordinator or segment tier on top of it.
    pub fn config_for(&self, content_id: i32) -> BTreeMap<String, String> {
        let tier = if content_id == COORDINATOR_CONTENT_ID {
            &self.coordinator_config
        } else {
            &self.segment_config
        };

        let mut merged = self.common_config.clone();
        merged.extend(tier.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// A complete request to initialize a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterRequest {
    pub topology: ClusterTopology,
    pub params: ClusterParams,
    /// Clear non-empty data directories instead of failing
    pub force: bool,
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(host: &str, port: u16, dir: &str) -> Segment {
        Segment {
            host_name: host.to_string(),
            host_address: host.to_string(),
            port,
            data_directory: dir.to_string(),
            content_id: 0,
            dbid: 0,
        }
    }

    fn topology() -> ClusterTopology {
        ClusterTopology::new(
            seg("cdw", 7000, "/data/coordinator"),
            vec![
                seg("sdw1", 7002, "/data/p0"),
                seg("sdw1", 7003, "/data/p1"),
                seg("sdw2", 7002, "/data/p0"),
            ],
        )
    }

    #[test]
    fn test_new_assigns_content_ids() {
        let topology = topology();
        assert_eq!(topology.coordinator.content_id, -1);
        assert_eq!(topology.coordinator.dbid, 1);
        let contents: Vec<i32> = topology.primaries.iter().map(|p| p.content_id).collect();
        assert_eq!(contents, vec![0, 1, 2]);
        assert!(topology.validate().is_ok());
    }

    #[test]
    fn test_duplicate_directory_on_same_host_rejected() {
        let mut topology = topology();
        topology.primaries[1].data_directory = "/data/p0".to_string();
        let err = topology.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate data directory /data/p0 on host sdw1"));
    }

    #[test]
    fn test_duplicate_port_on_same_address_rejected() {
        let mut topology = topology();
        topology.primaries[1].port = 7002;
        let err = topology.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate port 7002 on host sdw1"));
    }

    #[test]
    fn test_duplicate_port_across_addresses_of_one_host_rejected() {
        let mut first = seg("sdw1", 6000, "/data/p0");
        first.host_address = "10.0.0.1".to_string();
        let mut second = seg("sdw1", 6000, "/data/p1");
        second.host_address = "10.0.1.1".to_string();

        let topology =
            ClusterTopology::new(seg("cdw", 5432, "/data/coordinator"), vec![first, second]);
        let err = topology.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate port 6000 on host sdw1"));
    }

    #[test]
    fn test_same_directory_on_different_hosts_allowed() {
        // sdw1 and sdw2 both use /data/p0 and port 7002
        assert!(topology().validate().is_ok());
    }

    #[test]
    fn test_second_coordinator_content_rejected() {
        let mut topology = topology();
        topology.primaries[2].content_id = -1;
        assert!(topology.validate().is_err());
    }

    #[test]
    fn test_empty_primaries_rejected() {
        let topology = ClusterTopology::new(seg("cdw", 7000, "/data/coordinator"), vec![]);
        assert!(topology.validate().is_err());
    }

    #[test]
    fn test_config_tiers_merge_with_tier_precedence() {
        let mut params = ClusterParams::default();
        params
            .common_config
            .insert("shared_buffers".into(), "128MB".into());
        params.common_config.insert("max_connections".into(), "100".into());
        params
            .coordinator_config
            .insert("max_connections".into(), "250".into());
        params
            .segment_config
            .insert("max_connections".into(), "750".into());

        let coordinator = params.config_for(COORDINATOR_CONTENT_ID);
        assert_eq!(coordinator["max_connections"], "250");
        assert_eq!(coordinator["shared_buffers"], "128MB");

        let primary = params.config_for(3);
        assert_eq!(primary["max_connections"], "750");
        assert_eq!(primary["shared_buffers"], "128MB");
    }

    #[test]
    fn test_requested_locales_skip_unset_and_duplicates() {
        let locale = Locale {
            lc_all: "en_US.utf8".into(),
            lc_ctype: "en_US.utf8".into(),
            lc_time: "C".into(),
            ..Default::default()
        };
        assert_eq!(locale.requested(), vec!["en_US.utf8", "C"]);
    }
}
