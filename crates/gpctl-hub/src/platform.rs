//! Coordinator-host facilities the orchestrator depends on.
//!
//! Everything that runs a local binary or inspects the local host goes
//! through [`Platform`], so the orchestrator can be driven by a test double.

use crate::error::{HubError, Result};
use crate::stream::HubStream;
use async_trait::async_trait;
use gpctl_core::command::gp_command;
use std::path::PathBuf;
use std::process::Stdio;
use sysinfo::Networks;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{debug, info};

#[async_trait]
pub trait Platform: Send + Sync {
    /// Version string of the coordinator's database binaries
    async fn gp_version(&self) -> Result<String>;

    /// Every non-loopback address of the coordinator host
    fn local_addresses(&self) -> Result<Vec<String>>;

    /// Fast shutdown of the instance in `data_dir` on this host
    async fn stop_coordinator(&self, data_dir: &str) -> Result<()>;

    /// Starts the whole cluster through the regular multi-node startup path,
    /// forwarding its output to `stream`
    async fn start_cluster(&self, data_dir: &str, verbose: bool, stream: &HubStream)
        -> Result<()>;

    /// Launches the agent service on every host
    async fn start_agents(&self, hosts: &[String]) -> Result<()>;

    /// Operating-system user the database runs as
    fn current_user(&self) -> String;
}

/// [`Platform`] backed by the binaries of a local installation.
pub struct SystemPlatform {
    gphome: PathBuf,
    config_path: PathBuf,
}

impl SystemPlatform {
    /// `config_path` is handed to every launched agent.
    pub fn new(gphome: PathBuf, config_path: PathBuf) -> Self {
        Self {
            gphome,
            config_path,
        }
    }
}

/// Runs a command to completion, turning a non-zero exit into an error that
/// carries stderr.
async fn run(mut cmd: tokio::process::Command, name: &str) -> Result<String> {
    debug!("Running {:?}", cmd.as_std());
    let output = cmd.output().await.map_err(|e| HubError::Command {
        command: name.to_string(),
        reason: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(HubError::Command {
            command: name.to_string(),
            reason: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl Platform for SystemPlatform {
    async fn gp_version(&self) -> Result<String> {
        let mut cmd = gp_command(&self.gphome, "postgres");
        cmd.arg("--gp-version");
        let version = run(cmd, "postgres --gp-version").await?;
        Ok(version.trim().to_string())
    }

    fn local_addresses(&self) -> Result<Vec<String>> {
        let networks = Networks::new_with_refreshed_list();
        let mut addrs: Vec<String> = networks
            .iter()
            .flat_map(|(_, data)| data.ip_networks().iter())
            .filter(|net| !net.addr.is_loopback())
            .map(|net| net.addr.to_string())
            .collect();
        addrs.sort();
        addrs.dedup();

        if addrs.is_empty() {
            return Err(HubError::Command {
                command: "address discovery".to_string(),
                reason: "no non-loopback addresses found".to_string(),
            });
        }
        Ok(addrs)
    }

    async fn stop_coordinator(&self, data_dir: &str) -> Result<()> {
        info!("Stopping coordinator instance in {}", data_dir);
        let mut cmd = gp_command(&self.gphome, "pg_ctl");
        cmd.args(["stop", "-D", data_dir, "-m", "fast", "-w"]);
        run(cmd, "pg_ctl stop").await?;
        Ok(())
    }

    async fn start_cluster(
        &self,
        data_dir: &str,
        verbose: bool,
        stream: &HubStream,
    ) -> Result<()> {
        let mut cmd = gp_command(&self.gphome, "gpstart");
        cmd.args(["-a", "-d", data_dir]);
        if verbose {
            cmd.arg("-v");
        }
        cmd.env("COORDINATOR_DATA_DIRECTORY", data_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let command_err = |reason: String| HubError::Command {
            command: "gpstart".to_string(),
            reason,
        };

        let mut child = cmd.spawn().map_err(|e| command_err(e.to_string()))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Both pipes drain together; a full stderr pipe would otherwise stall
        // gpstart before it closes stdout.
        let forward_stdout = async {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Some(line) = lines.next_line().await? {
                    stream.stdout(line);
                }
            }
            Ok::<(), std::io::Error>(())
        };
        let collect_stderr = async {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                stderr.read_to_end(&mut buf).await?;
            }
            Ok::<Vec<u8>, std::io::Error>(buf)
        };
        let (forwarded, stderr) = tokio::join!(forward_stdout, collect_stderr);
        forwarded?;
        let stderr = stderr?;

        let status = child.wait().await?;
        if !status.success() {
            return Err(command_err(format!(
                "{}: {}",
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }
        Ok(())
    }

    async fn start_agents(&self, hosts: &[String]) -> Result<()> {
        let agent_bin = self.gphome.join("bin").join("gpctl-agent");
        let remote = format!(
            "nohup {} --config {} > /dev/null 2>&1 &",
            agent_bin.display(),
            self.config_path.display()
        );

        let mut cmd = gp_command(&self.gphome, "gpssh");
        for host in hosts {
            cmd.args(["-h", host]);
        }
        cmd.args(["-e", &remote]);
        run(cmd, "gpssh").await?;
        Ok(())
    }

    fn current_user(&self) -> String {
        gpctl_core::user::current_user()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::stream::StreamItem;
    use gpctl_proto::make_cluster_reply::Message;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn fake_gpstart(body: &str) -> TempDir {
        let gphome = TempDir::new().unwrap();
        let bin = gphome.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let script = bin.join("gpstart");
        std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        gphome
    }

    fn platform(gphome: &TempDir) -> SystemPlatform {
        SystemPlatform::new(gphome.path().to_path_buf(), PathBuf::from("gpctl.toml"))
    }

    fn stdout_lines(rx: &mut UnboundedReceiver<StreamItem>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(Ok(reply)) = rx.try_recv() {
            if let Some(Message::Stdout(line)) = reply.message {
                lines.push(line);
            }
        }
        lines
    }

    #[tokio::test]
    async fn test_start_cluster_survives_large_stderr() {
        let gphome = fake_gpstart("head -c 200000 /dev/zero | tr '\\0' x >&2\necho started");
        let (stream, mut rx) = HubStream::channel();

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            platform(&gphome).start_cluster("/data/coordinator", false, &stream),
        )
        .await
        .expect("gpstart output was not drained");

        assert!(result.is_ok());
        assert_eq!(stdout_lines(&mut rx), vec!["started"]);
    }

    #[tokio::test]
    async fn test_start_cluster_failure_carries_stderr() {
        let gphome = fake_gpstart("echo starting\necho 'segment sdw1 failed' >&2\nexit 1");
        let (stream, mut rx) = HubStream::channel();

        let err = platform(&gphome)
            .start_cluster("/data/coordinator", false, &stream)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("segment sdw1 failed"));
        assert_eq!(stdout_lines(&mut rx), vec!["starting"]);
    }
}
