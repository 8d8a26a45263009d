//! Service configuration shared by the CLI, the hub and every agent.
//!
//! Written once by `gpctl configure` and copied to every host.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default port the hub listens on
pub const DEFAULT_HUB_PORT: u16 = 4242;

/// Default port every agent listens on
pub const DEFAULT_AGENT_PORT: u16 = 8000;

/// Default configuration file name, relative to GPHOME
pub const CONFIG_FILE_NAME: &str = "gpctl.toml";

/// PEM files used for mutual TLS on every channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPaths {
    pub ca_cert: PathBuf,
    pub server_cert: PathBuf,
    pub server_key: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
}

/// Configuration of the hub and agent services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Database installation root; binaries are run from `<gphome>/bin`
    pub gphome: PathBuf,

    #[serde(default = "default_hub_port")]
    pub hub_port: u16,

    #[serde(default = "default_agent_port")]
    pub agent_port: u16,

    /// Every host that runs an agent
    pub hostnames: Vec<String>,

    /// Directory for service logs and the init cleanup manifest
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    pub credentials: CredentialPaths,
}

fn default_hub_port() -> u16 {
    DEFAULT_HUB_PORT
}

fn default_agent_port() -> u16 {
    DEFAULT_AGENT_PORT
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp/gpctl")
}

impl ServiceConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| CoreError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ServiceConfig =
            toml::from_str(&contents).map_err(|source| CoreError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Default location of the configuration file for an installation
    pub fn default_path(gphome: &Path) -> PathBuf {
        gphome.join(CONFIG_FILE_NAME)
    }

    pub fn validate(&self) -> Result<()> {
        if self.gphome.as_os_str().is_empty() {
            return Err(CoreError::Config("gphome must be set".to_string()));
        }
        if self.hostnames.is_empty() {
            return Err(CoreError::Config(
                "at least one agent hostname is required".to_string(),
            ));
        }
        if let Some(empty) = self.hostnames.iter().position(|h| h.trim().is_empty()) {
            return Err(CoreError::Config(format!("hostname #{} is empty", empty + 1)));
        }
        if self.hub_port == 0 || self.agent_port == 0 {
            return Err(CoreError::Config(
                "hub_port and agent_port must be non-zero".to_string(),
            ));
        }
        if self.hub_port == self.agent_port {
            return Err(CoreError::Config(format!(
                "hub_port and agent_port must differ (both {})",
                self.hub_port
            )));
        }
        Ok(())
    }
}
