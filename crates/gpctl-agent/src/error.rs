//! Error types for the gpctl-agent crate

use thiserror::Error;
use tonic::{Code, Status};

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("cannot run as root user {user}, run as the cluster administrator")]
    RootUser { user: String },

    #[error("version mismatch on {host}: expected {expected:?}, found {found:?}")]
    VersionMismatch {
        host: String,
        expected: String,
        found: String,
    },

    #[error("data directories not empty: {}", .0.join(", "))]
    DirectoriesNotEmpty(Vec<String>),

    #[error("{path}: {reason}")]
    Permission { path: String, reason: String },

    #[error("locale {0:?} is not available on this host")]
    LocaleUnavailable(String),

    #[error("ports already in use: {}", join_ports(.0))]
    PortsInUse(Vec<u16>),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("{path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl AgentError {
    pub(crate) fn file(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> AgentError + '_ {
        move |source| AgentError::File {
            path: path.display().to_string(),
            source,
        }
    }
}

impl From<AgentError> for Status {
    fn from(err: AgentError) -> Self {
        let code = match &err {
            AgentError::RootUser { .. }
            | AgentError::VersionMismatch { .. }
            | AgentError::DirectoriesNotEmpty(_)
            | AgentError::Permission { .. }
            | AgentError::LocaleUnavailable(_)
            | AgentError::PortsInUse(_) => Code::FailedPrecondition,
            AgentError::InvalidRequest(_) => Code::InvalidArgument,
            _ => Code::Internal,
        };
        Status::new(code, err.to_string())
    }
}
