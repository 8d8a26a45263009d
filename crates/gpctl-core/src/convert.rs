//! Conversions between domain types and their `gpctl-proto` wire form.

use crate::cluster::{ClusterParams, ClusterRequest, ClusterTopology, Locale, Segment};
use crate::error::CoreError;
use gpctl_proto as pb;

impl From<&Segment> for pb::Segment {
    fn from(seg: &Segment) -> Self {
        pb::Segment {
            host_name: seg.host_name.clone(),
            host_address: seg.host_address.clone(),
            port: i32::from(seg.port),
            data_directory: seg.data_directory.clone(),
            content_id: seg.content_id,
            dbid: seg.dbid,
        }
    }
}

impl TryFrom<pb::Segment> for Segment {
    type Error = CoreError;

    fn try_from(seg: pb::Segment) -> Result<Self, Self::Error> {
        let port = u16::try_from(seg.port).map_err(|_| {
            CoreError::Topology(format!(
                "segment {}:{} has invalid port {}",
                seg.host_name, seg.data_directory, seg.port
            ))
        })?;
        Ok(Segment {
            host_name: seg.host_name,
            host_address: seg.host_address,
            port,
            data_directory: seg.data_directory,
            content_id: seg.content_id,
            dbid: seg.dbid,
        })
    }
}

impl From<&Locale> for pb::Locale {
    fn from(locale: &Locale) -> Self {
        pb::Locale {
            lc_all: locale.lc_all.clone(),
            lc_collate: locale.lc_collate.clone(),
            lc_ctype: locale.lc_ctype.clone(),
            lc_messages: locale.lc_messages.clone(),
            lc_monetary: locale.lc_monetary.clone(),
            lc_numeric: locale.lc_numeric.clone(),
            lc_time: locale.lc_time.clone(),
        }
    }
}

impl From<pb::Locale> for Locale {
    fn from(locale: pb::Locale) -> Self {
        Locale {
            lc_all: locale.lc_all,
            lc_collate: locale.lc_collate,
            lc_ctype: locale.lc_ctype,
            lc_messages: locale.lc_messages,
            lc_monetary: locale.lc_monetary,
            lc_numeric: locale.lc_numeric,
            lc_time: locale.lc_time,
        }
    }
}

impl From<&ClusterParams> for pb::ClusterParams {
    fn from(params: &ClusterParams) -> Self {
        pb::ClusterParams {
            coordinator_config: params.coordinator_config.clone().into_iter().collect(),
            segment_config: params.segment_config.clone().into_iter().collect(),
            common_config: params.common_config.clone().into_iter().collect(),
            locale: Some(pb::Locale::from(&params.locale)),
            hba_hostnames: params.hba_hostnames,
            encoding: params.encoding.clone(),
            su_password: params.su_password.clone(),
            db_name: params.db_name.clone().unwrap_or_default(),
            data_checksums: params.data_checksums,
        }
    }
}

impl From<pb::ClusterParams> for ClusterParams {
    fn from(params: pb::ClusterParams) -> Self {
        ClusterParams {
            locale: params.locale.map(Locale::from).unwrap_or_default(),
            encoding: params.encoding,
            data_checksums: params.data_checksums,
            common_config: params.common_config.into_iter().collect(),
            coordinator_config: params.coordinator_config.into_iter().collect(),
            segment_config: params.segment_config.into_iter().collect(),
            hba_hostnames: params.hba_hostnames,
            su_password: params.su_password,
            db_name: Some(params.db_name).filter(|name| !name.is_empty()),
        }
    }
}

impl From<&ClusterRequest> for pb::MakeClusterRequest {
    fn from(request: &ClusterRequest) -> Self {
        pb::MakeClusterRequest {
            gp_array: Some(pb::GpArray {
                coordinator: Some(pb::Segment::from(&request.topology.coordinator)),
                primaries: request
                    .topology
                    .primaries
                    .iter()
                    .map(pb::Segment::from)
                    .collect(),
            }),
            cluster_params: Some(pb::ClusterParams::from(&request.params)),
            force: request.force,
            verbose: request.verbose,
        }
    }
}

impl TryFrom<pb::MakeClusterRequest> for ClusterRequest {
    type Error = CoreError;

    /// Content-ids and dbids are kept exactly as sent.
    fn try_from(request: pb::MakeClusterRequest) -> Result<Self, Self::Error> {
        let gp_array = request
            .gp_array
            .ok_or_else(|| CoreError::Topology("request has no segment array".to_string()))?;
        let coordinator = gp_array
            .coordinator
            .ok_or_else(|| CoreError::Topology("request has no coordinator".to_string()))?;

        let topology = ClusterTopology {
            coordinator: Segment::try_from(coordinator)?,
            primaries: gp_array
                .primaries
                .into_iter()
                .map(Segment::try_from)
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok(ClusterRequest {
            topology,
            params: request
                .cluster_params
                .map(ClusterParams::from)
                .unwrap_or_default(),
            force: request.force,
            verbose: request.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_coordinator_rejected() {
        let request = pb::MakeClusterRequest {
            gp_array: Some(pb::GpArray {
                coordinator: None,
                primaries: vec![],
            }),
            ..Default::default()
        };
        let err = ClusterRequest::try_from(request).unwrap_err();
        assert!(err.to_string().contains("no coordinator"));
    }

    #[test]
    fn test_out_of_range_port_rejected() {
        let seg = pb::Segment {
            host_name: "sdw1".into(),
            host_address: "sdw1".into(),
            port: 70000,
            data_directory: "/data/p0".into(),
            content_id: 0,
            dbid: 2,
        };
        assert!(Segment::try_from(seg).is_err());
    }

    #[test]
    fn test_empty_db_name_means_none() {
        let params = ClusterParams::from(pb::ClusterParams::default());
        assert_eq!(params.db_name, None);
        assert!(params.locale.requested().is_empty());
    }
}
