//! Creating, starting and removing database instances on this host.

use crate::error::{AgentError, Result};
use crate::process::run;
use gpctl_core::command::gp_command;
use gpctl_proto::{MakeSegmentRequest, Segment, StartSegmentRequest};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

pub struct SegmentManager {
    gphome: PathBuf,
}

impl SegmentManager {
    pub fn new(gphome: PathBuf) -> Self {
        Self { gphome }
    }

    /// Runs `initdb` for the requested segment and writes its configuration.
    pub async fn make_segment(&self, request: MakeSegmentRequest) -> Result<()> {
        let segment = request
            .segment
            .clone()
            .ok_or_else(|| AgentError::InvalidRequest("segment is required".into()))?;
        if segment.data_directory.is_empty() {
            return Err(AgentError::InvalidRequest(
                "segment data directory is required".into(),
            ));
        }
        let data_dir = PathBuf::from(&segment.data_directory);

        info!(
            "Creating segment content {} dbid {} in {}",
            segment.content_id,
            segment.dbid,
            data_dir.display()
        );

        let mut initdb = gp_command(&self.gphome, "initdb");
        initdb.args(initdb_args(&request, &segment));
        run(initdb, "initdb").await?;

        append_lines(
            &data_dir.join("postgresql.conf"),
            &postgresql_conf_lines(&segment, &request.segment_config),
        )
        .await?;
        append_lines(
            &data_dir.join("internal.auto.conf"),
            &[format!("gp_dbid = {}", segment.dbid)],
        )
        .await?;
        append_lines(
            &data_dir.join("pg_hba.conf"),
            &hba_lines(&request.ip_list, request.hba_hostnames)?,
        )
        .await?;

        Ok(())
    }

    /// Starts the instance in the requested data directory with `pg_ctl`.
    pub async fn start_segment(&self, request: StartSegmentRequest) -> Result<()> {
        if request.data_dir.is_empty() {
            return Err(AgentError::InvalidRequest("data directory is required".into()));
        }
        let data_dir = Path::new(&request.data_dir);
        let log_dir = data_dir.join("log");
        tokio::fs::create_dir_all(&log_dir)
            .await
            .map_err(AgentError::file(&log_dir))?;

        info!("Starting segment in {}", data_dir.display());
        let mut pg_ctl = gp_command(&self.gphome, "pg_ctl");
        pg_ctl.args(pg_ctl_start_args(&request));
        run(pg_ctl, "pg_ctl start").await?;
        Ok(())
    }
}

/// Removes a data directory; one that is already gone counts as removed.
pub async fn remove_directory(data_dir: &str) -> Result<()> {
    if data_dir.is_empty() || Path::new(data_dir) == Path::new("/") {
        return Err(AgentError::InvalidRequest(format!(
            "refusing to remove {:?}",
            data_dir
        )));
    }

    match tokio::fs::remove_dir_all(data_dir).await {
        Ok(()) => {
            info!("Removed {}", data_dir);
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("{} does not exist, nothing to remove", data_dir);
            Ok(())
        }
        Err(e) => Err(AgentError::file(Path::new(data_dir))(e)),
    }
}

pub fn initdb_args(request: &MakeSegmentRequest, segment: &Segment) -> Vec<String> {
    let mut args = vec!["-D".to_string(), segment.data_directory.clone()];

    if !request.encoding.is_empty() {
        args.push(format!("--encoding={}", request.encoding));
    }

    if let Some(locale) = &request.locale {
        for (flag, value) in [
            ("--locale", &locale.lc_all),
            ("--lc-collate", &locale.lc_collate),
            ("--lc-ctype", &locale.lc_ctype),
            ("--lc-messages", &locale.lc_messages),
            ("--lc-monetary", &locale.lc_monetary),
            ("--lc-numeric", &locale.lc_numeric),
            ("--lc-time", &locale.lc_time),
        ] {
            if !value.is_empty() {
                args.push(format!("{}={}", flag, value));
            }
        }
    }

    if request.data_checksums {
        args.push("--data-checksums".to_string());
    }
    args
}

/// Settings appended to `postgresql.conf`, merged configuration last so it
/// can override the defaults.
pub fn postgresql_conf_lines(segment: &Segment, config: &HashMap<String, String>) -> Vec<String> {
    let mut lines = vec![
        format!("port = {}", segment.port),
        "listen_addresses = '*'".to_string(),
        format!("gp_contentid = {}", segment.content_id),
    ];

    let mut settings: Vec<(&String, &String)> = config.iter().collect();
    settings.sort();
    lines.extend(settings.into_iter().map(|(k, v)| format!("{} = {}", k, v)));
    lines
}

/// Trust rules for the addresses the coordinator connects from.
///
/// Numeric addresses become single-host CIDR ranges. Names are only
/// accepted when host-name rules were requested.
pub fn hba_lines(addrs: &[String], hostnames: bool) -> Result<Vec<String>> {
    let mut lines = Vec::with_capacity(addrs.len() * 2);
    for addr in addrs {
        let source = match addr.parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) => format!("{}/32", v4),
            Ok(IpAddr::V6(v6)) => format!("{}/128", v6),
            Err(_) if hostnames => addr.clone(),
            Err(_) => {
                return Err(AgentError::InvalidRequest(format!(
                    "{:?} is not an IP address and host name rules were not requested",
                    addr
                )))
            }
        };
        lines.push(format!("host\tall\tall\t{}\ttrust", source));
        lines.push(format!("host\treplication\tall\t{}\ttrust", source));
    }
    Ok(lines)
}

pub fn pg_ctl_start_args(request: &StartSegmentRequest) -> Vec<String> {
    let data_dir = Path::new(&request.data_dir);
    let mut args = vec![
        "start".to_string(),
        "-D".to_string(),
        request.data_dir.clone(),
        "-l".to_string(),
        data_dir.join("log").join("startup.log").display().to_string(),
    ];
    if request.wait {
        args.push("-w".to_string());
    }
    if request.timeout > 0 {
        args.push("-t".to_string());
        args.push(request.timeout.to_string());
    }
    if !request.options.is_empty() {
        args.push("-o".to_string());
        args.push(request.options.clone());
    }
    args
}

async fn append_lines(path: &Path, lines: &[String]) -> Result<()> {
    if lines.is_empty() {
        return Ok(());
    }

    let mut content = String::from("\n");
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(AgentError::file(path))?;
    file.write_all(content.as_bytes())
        .await
        .map_err(AgentError::file(path))?;
    file.flush().await.map_err(AgentError::file(path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpctl_proto::Locale;
    use tempfile::TempDir;

    fn primary(dir: &str) -> Segment {
        Segment {
            host_name: "sdw1".into(),
            host_address: "10.0.0.11".into(),
            port: 6000,
            data_directory: dir.into(),
            content_id: 3,
            dbid: 5,
        }
    }

    #[test]
    fn test_initdb_args_include_set_locales_and_checksums() {
        let request = MakeSegmentRequest {
            segment: Some(primary("/data/p3")),
            locale: Some(Locale {
                lc_all: "en_US.UTF-8".into(),
                lc_time: "C".into(),
                ..Locale::default()
            }),
            encoding: "UTF-8".into(),
            data_checksums: true,
            ..MakeSegmentRequest::default()
        };

        let args = initdb_args(&request, &primary("/data/p3"));
        assert_eq!(
            args,
            vec![
                "-D",
                "/data/p3",
                "--encoding=UTF-8",
                "--locale=en_US.UTF-8",
                "--lc-time=C",
                "--data-checksums"
            ]
        );
    }

    #[test]
    fn test_postgresql_conf_lines_end_with_sorted_config() {
        let config = HashMap::from([
            ("shared_buffers".to_string(), "128MB".to_string()),
            ("max_connections".to_string(), "250".to_string()),
        ]);
        let lines = postgresql_conf_lines(&primary("/data/p3"), &config);
        assert_eq!(
            lines,
            vec![
                "port = 6000",
                "listen_addresses = '*'",
                "gp_contentid = 3",
                "max_connections = 250",
                "shared_buffers = 128MB",
            ]
        );
    }

    #[test]
    fn test_hba_lines_for_numeric_addresses() {
        let lines = hba_lines(&["10.0.0.1".into(), "fe80::1".into()], false).unwrap();
        assert_eq!(lines[0], "host\tall\tall\t10.0.0.1/32\ttrust");
        assert_eq!(lines[2], "host\tall\tall\tfe80::1/128\ttrust");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_hba_lines_with_host_names() {
        let lines = hba_lines(&["cdw".into()], true).unwrap();
        assert_eq!(lines[0], "host\tall\tall\tcdw\ttrust");
        assert!(hba_lines(&["cdw".into()], false).is_err());
    }

    #[test]
    fn test_pg_ctl_start_args() {
        let args = pg_ctl_start_args(&StartSegmentRequest {
            data_dir: "/data/coordinator".into(),
            wait: true,
            timeout: 600,
            options: "-c gp_role=utility".into(),
        });
        assert_eq!(
            args,
            vec![
                "start",
                "-D",
                "/data/coordinator",
                "-l",
                "/data/coordinator/log/startup.log",
                "-w",
                "-t",
                "600",
                "-o",
                "-c gp_role=utility"
            ]
        );
    }

    #[tokio::test]
    async fn test_append_lines_keeps_existing_content() {
        let dir = TempDir::new().unwrap();
        let conf = dir.path().join("postgresql.conf");
        std::fs::write(&conf, "# defaults").unwrap();

        append_lines(&conf, &["port = 6000".to_string()]).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&conf).unwrap(),
            "# defaults\nport = 6000\n"
        );
    }

    #[tokio::test]
    async fn test_remove_directory_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("gpseg0");
        std::fs::create_dir_all(data.join("base")).unwrap();

        remove_directory(data.to_str().unwrap()).await.unwrap();
        assert!(!data.exists());
        remove_directory(data.to_str().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_directory_refuses_root() {
        assert!(remove_directory("/").await.is_err());
        assert!(remove_directory("").await.is_err());
    }
}
