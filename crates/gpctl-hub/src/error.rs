//! Error types for the gpctl-hub crate

use thiserror::Error;
use tonic::{Code, Status};

pub type Result<T> = std::result::Result<T, HubError>;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("failed to connect to agent on host {host}: {reason}")]
    Dial { host: String, reason: String },

    #[error("agents not ready on hosts: {}", .0.join(", "))]
    AgentsNotReady(Vec<String>),

    #[error("no agent connection for host {0}")]
    MissingConnection(String),

    #[error("host {host}: {}", .status.message())]
    Agent { host: String, status: Status },

    #[error("host {host}, data directory {data_dir}: {}", .status.message())]
    Segment {
        host: String,
        data_dir: String,
        status: Status,
    },

    #[error(transparent)]
    Core(#[from] gpctl_core::CoreError),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("{command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("cleanup manifest {path}: {reason}")]
    Manifest { path: String, reason: String },

    #[error("{}", join_messages(.0))]
    Multiple(Vec<HubError>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn join_messages(errors: &[HubError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl HubError {
    /// Combines independent failures into one error.
    ///
    /// Nested aggregates are flattened; a single error is returned unwrapped.
    pub fn join(errors: Vec<HubError>) -> Option<HubError> {
        let mut flat = Vec::with_capacity(errors.len());
        for err in errors {
            match err {
                HubError::Multiple(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(HubError::Multiple(flat)),
        }
    }

    pub(crate) fn agent(host: &str) -> impl FnOnce(Status) -> HubError + '_ {
        move |status| HubError::Agent {
            host: host.to_string(),
            status,
        }
    }
}

impl From<HubError> for Status {
    fn from(err: HubError) -> Self {
        let code = match &err {
            HubError::Core(gpctl_core::CoreError::Topology(_)) => Code::InvalidArgument,
            HubError::Dial { .. } | HubError::AgentsNotReady(_) => Code::Unavailable,
            HubError::Agent { status, .. } | HubError::Segment { status, .. } => status.code(),
            _ => Code::Internal,
        };
        Status::new(code, err.to_string())
    }
}
