//! gpctl core: types and plumbing shared by the CLI, the hub and the agents.
//!
//! - [`cluster`]: topology and provisioning parameters of a cluster request
//! - [`cluster_file`]: the TOML cluster description read by `gpctl init`
//! - [`config`]: the service configuration file written by `gpctl configure`
//! - [`credentials`]: mutual TLS material for every gRPC channel
//! - [`logging`]: tracing subscriber setup
//! - [`rpc`]: helpers for interpreting gRPC statuses
//! - [`user`]: the operating-system user a service runs as

pub mod cluster;
pub mod cluster_file;
pub mod command;
pub mod config;
pub mod convert;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod rpc;
pub mod user;

pub use cluster::{ClusterParams, ClusterRequest, ClusterTopology, Locale, Segment};
pub use cluster_file::ClusterFile;
pub use config::{CredentialPaths, ServiceConfig};
pub use credentials::{Credentials, InsecureCredentials, TlsCredentials};
pub use error::{CoreError, Result};
