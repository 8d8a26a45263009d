//! Host environment checks run before a cluster is created.
//!
//! Fatal checks run in a fixed order and the first failure is returned.
//! Warnings never fail the validation; they are handed back to the hub.

use crate::error::{AgentError, Result};
use crate::process::run;
use gpctl_core::command::gp_command;
use gpctl_core::user::{current_user, effective_uid};
use gpctl_core::Locale;
use gpctl_proto::{LogLevel, LogMessage, ValidateHostEnvRequest};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Open file limit below which a warning is reported
pub const RECOMMENDED_OPEN_FILES: u64 = 65535;

pub const HOSTS_FILE: &str = "/etc/hosts";

pub struct HostValidator {
    gphome: PathBuf,
    hosts_file: PathBuf,
}

impl HostValidator {
    pub fn new(gphome: PathBuf) -> Self {
        Self {
            gphome,
            hosts_file: PathBuf::from(HOSTS_FILE),
        }
    }

    /// Reads host aliases from `path` instead of the system hosts file.
    pub fn with_hosts_file(mut self, path: PathBuf) -> Self {
        self.hosts_file = path;
        self
    }

    pub async fn validate(&self, request: &ValidateHostEnvRequest) -> Result<Vec<LogMessage>> {
        let host = crate::local_host_name();
        info!("Validating environment for {} directories", request.directory_list.len());

        check_not_root()?;
        self.check_version(&host, &request.gp_version).await?;
        prepare_directories(&request.directory_list, request.forced).await?;
        check_executable(&self.gphome.join("bin").join("initdb"))?;
        if let Some(locale) = request.locale.clone() {
            check_locales(&Locale::from(locale)).await?;
        }
        check_ports(&request.port_list).await?;

        let mut warnings = Vec::new();
        if let Some(limit) = open_file_limit() {
            if limit < RECOMMENDED_OPEN_FILES {
                warnings.push(warning(format!(
                    "For host {}, the open file limit is {}, recommended is at least {}",
                    host, limit, RECOMMENDED_OPEN_FILES
                )));
            }
        }

        match tokio::fs::read_to_string(&self.hosts_file).await {
            Ok(content) => {
                for addr in localhost_aliases(&content, &request.host_address_list) {
                    warnings.push(warning(format!(
                        "Host address {} is an alias of localhost in {} on host {}; \
                         segments will not be able to reach the coordinator through it",
                        addr,
                        self.hosts_file.display(),
                        host
                    )));
                }
            }
            Err(e) => debug!("Skipping localhost check, cannot read {}: {}", self.hosts_file.display(), e),
        }

        for w in &warnings {
            warn!("{}", w.message);
        }
        Ok(warnings)
    }

    async fn check_version(&self, host: &str, expected: &str) -> Result<()> {
        let mut cmd = gp_command(&self.gphome, "postgres");
        cmd.arg("--gp-version");
        let found = run(cmd, "postgres --gp-version").await?.trim().to_string();

        if found != expected {
            return Err(AgentError::VersionMismatch {
                host: host.to_string(),
                expected: expected.to_string(),
                found,
            });
        }
        Ok(())
    }
}

fn warning(message: String) -> LogMessage {
    LogMessage {
        level: LogLevel::Warning as i32,
        message,
    }
}

pub fn check_not_root() -> Result<()> {
    if effective_uid() == 0 {
        return Err(AgentError::RootUser {
            user: current_user(),
        });
    }
    Ok(())
}

/// Fails on non-empty data directories unless `forced`, in which case they
/// are deleted. Nothing is deleted when the check fails.
pub async fn prepare_directories(dirs: &[String], forced: bool) -> Result<()> {
    let mut non_empty = Vec::new();
    for dir in dirs {
        if !is_empty_dir(Path::new(dir)).await? {
            non_empty.push(dir.clone());
        }
    }

    if non_empty.is_empty() {
        return Ok(());
    }
    if !forced {
        return Err(AgentError::DirectoriesNotEmpty(non_empty));
    }

    for dir in &non_empty {
        warn!("Removing non-empty data directory {}", dir);
        tokio::fs::remove_dir_all(dir)
            .await
            .map_err(AgentError::file(Path::new(dir)))?;
    }
    Ok(())
}

async fn is_empty_dir(path: &Path) -> Result<bool> {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => Ok(entries
            .next_entry()
            .await
            .map_err(AgentError::file(path))?
            .is_none()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
        Err(e) => Err(AgentError::file(path)(e)),
    }
}

/// The binary must belong to this user or group and be executable by it.
#[cfg(unix)]
pub fn check_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    let permission = |reason: String| AgentError::Permission {
        path: path.display().to_string(),
        reason,
    };

    let meta = std::fs::metadata(path).map_err(|e| permission(e.to_string()))?;
    // SAFETY: geteuid and getegid have no preconditions and cannot fail
    let (uid, gid) = unsafe { (libc::geteuid(), libc::getegid()) };
    let mode = meta.mode();

    let executable = if meta.uid() == uid {
        mode & 0o100 != 0
    } else if meta.gid() == gid {
        mode & 0o010 != 0
    } else {
        return Err(permission(format!(
            "not owned by the current user or group (owner uid {}, gid {})",
            meta.uid(),
            meta.gid()
        )));
    };

    if !executable {
        return Err(permission(format!(
            "not executable by its owner (mode {:o})",
            mode & 0o777
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn check_executable(path: &Path) -> Result<()> {
    std::fs::metadata(path)
        .map(|_| ())
        .map_err(|e| AgentError::Permission {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Every requested locale must appear verbatim in `locale -a`.
///
/// No codeset normalization is done: `en_US.utf8` does not match
/// `en_US.UTF-8`.
pub async fn check_locales(locale: &Locale) -> Result<()> {
    let requested = locale.requested();
    if requested.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new("locale");
    cmd.arg("-a");
    let available = run(cmd, "locale -a").await?;
    find_unavailable_locale(&requested, &available)
}

pub fn find_unavailable_locale(requested: &[&str], available: &str) -> Result<()> {
    let available: Vec<&str> = available.lines().map(str::trim).collect();
    match requested.iter().find(|l| !available.contains(*l)) {
        Some(missing) => Err(AgentError::LocaleUnavailable(missing.to_string())),
        None => Ok(()),
    }
}

/// Binds every port once and releases it again; reports all ports in use.
pub async fn check_ports(ports: &[i32]) -> Result<()> {
    let mut in_use = Vec::new();
    for &port in ports {
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| AgentError::InvalidRequest(format!("invalid port {}", port)))?;

        if let Err(e) = TcpListener::bind(("0.0.0.0", port)).await {
            debug!("Port {} unavailable: {}", port, e);
            if !in_use.contains(&port) {
                in_use.push(port);
            }
        }
    }

    if in_use.is_empty() {
        Ok(())
    } else {
        Err(AgentError::PortsInUse(in_use))
    }
}

/// Soft limit on open files for this process.
#[cfg(unix)]
pub fn open_file_limit() -> Option<u64> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, writable rlimit
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc == 0 {
        Some(limit.rlim_cur as u64)
    } else {
        None
    }
}

#[cfg(not(unix))]
pub fn open_file_limit() -> Option<u64> {
    None
}

/// Requested addresses that share a hosts-file line with a localhost name.
pub fn localhost_aliases(hosts_content: &str, addrs: &[String]) -> Vec<String> {
    let mut aliased = Vec::new();
    for line in hosts_content.lines() {
        let line = line.split('#').next().unwrap_or_default();
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some((_, names)) = fields.split_first() else {
            continue;
        };
        if !names.iter().any(|name| name.starts_with("localhost")) {
            continue;
        }
        for addr in addrs {
            if names.contains(&addr.as_str()) && !aliased.contains(addr) {
                aliased.push(addr.clone());
            }
        }
    }
    aliased
}
