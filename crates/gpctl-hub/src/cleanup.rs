//! Cleanup of a failed cluster initialization.
//!
//! Before anything is created on disk the orchestrator records every data
//! directory it is about to populate in a manifest under the hub's log
//! directory. A failed run leaves the manifest behind; [`clean_cluster`]
//! removes what it lists and then the manifest itself.

use crate::error::{HubError, Result};
use crate::fanout;
use crate::pool::{conn_for, ConnectionPool};
use crate::segment;
use gpctl_core::Segment;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Well-known manifest file name inside the hub's log directory
pub const MANIFEST_FILE_NAME: &str = "cluster-init-cleanup.txt";

/// Data directories to remove, keyed by host name
pub type CleanupEntries = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupManifest {
    path: PathBuf,
}

impl CleanupManifest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The manifest at its well-known location under `log_dir`.
    pub fn in_dir(log_dir: &Path) -> Self {
        Self::new(log_dir.join(MANIFEST_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one `host data_directory` line per segment.
    pub async fn append(&self, segments: &[Segment]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error(e))?;
        }

        let mut lines = String::new();
        for seg in segments {
            lines.push_str(&format!("{} {}\n", seg.host_name, seg.data_directory));
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.error(e))?;
        file.write_all(lines.as_bytes())
            .await
            .map_err(|e| self.error(e))?;
        file.flush().await.map_err(|e| self.error(e))?;

        debug!("Recorded {} directories in {}", segments.len(), self.path.display());
        Ok(())
    }

    /// Reads and parses the manifest; `None` when there is no manifest.
    pub async fn read(&self) -> Result<Option<CleanupEntries>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => parse_manifest(&content)
                .map(Some)
                .map_err(|reason| HubError::Manifest {
                    path: self.path.display().to_string(),
                    reason,
                }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.error(e)),
        }
    }

    /// Deletes the manifest; a missing manifest is not an error.
    pub async fn remove(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.error(e)),
        }
    }

    fn error(&self, e: std::io::Error) -> HubError {
        HubError::Manifest {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

/// Parses manifest text. Blank lines are skipped; every other line must hold
/// exactly two whitespace-separated fields.
pub fn parse_manifest(content: &str) -> std::result::Result<CleanupEntries, String> {
    let mut entries = CleanupEntries::new();
    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [host, dir] = fields.as_slice() else {
            return Err(format!(
                "line {}: expected \"<host> <data directory>\", got {:?}",
                number + 1,
                line
            ));
        };
        let dirs = entries.entry(host.to_string()).or_default();
        if !dirs.iter().any(|d| d == dir) {
            dirs.push(dir.to_string());
        }
    }
    Ok(entries)
}

/// Removes every directory listed in the manifest, then the manifest.
///
/// A missing manifest means there is nothing to clean and no agent is
/// contacted. A malformed manifest fails before any removal is requested.
/// All hosts and all directories are attempted; every failure is reported
/// and the manifest is kept so the cleanup can be retried.
pub async fn clean_cluster(
    pool: &ConnectionPool,
    hosts: &[String],
    manifest: &CleanupManifest,
) -> Result<()> {
    let Some(entries) = manifest.read().await? else {
        info!("No cleanup manifest at {}, nothing to clean", manifest.path().display());
        return Ok(());
    };

    let conns = pool.dial_all(hosts).await?;

    let mut tasks = Vec::with_capacity(entries.len());
    for (host, dirs) in entries {
        let conn = conn_for(&conns, &host)?.clone();
        tasks.push(async move {
            let removals = dirs.into_iter().map(|dir| {
                let conn = conn.clone();
                async move {
                    info!("Removing {} on {}", dir, conn.hostname);
                    segment::remove_directory(&conn, &dir).await
                }
            });
            fanout::execute_join_err(removals).await?;
            Ok::<(), HubError>(())
        });
    }
    fanout::execute_join_err(tasks).await?;

    manifest.remove().await?;
    info!("Cleanup complete, removed {}", manifest.path().display());
    Ok(())
}
