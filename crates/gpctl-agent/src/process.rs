//! Running installation binaries to completion.

use crate::error::{AgentError, Result};
use tokio::process::Command;
use tracing::debug;

/// Runs `cmd`, turning a non-zero exit into an error carrying stderr.
/// Returns stdout.
pub async fn run(mut cmd: Command, name: &str) -> Result<String> {
    debug!("Running {:?}", cmd.as_std());
    let output = cmd.output().await.map_err(|e| AgentError::Command {
        command: name.to_string(),
        reason: e.to_string(),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(AgentError::Command {
            command: name.to_string(),
            reason: format!("{}: {}", output.status, detail),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
