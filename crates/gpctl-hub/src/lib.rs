//! gpctl hub: the coordinator-side service that drives every agent.
//!
//! - [`pool`]: one ready connection per agent host
//! - [`fanout`]: first-error and combine-all parallel execution
//! - [`segment`]: typed segment lifecycle calls against one agent
//! - [`validate`]: cross-host environment validation
//! - [`make_cluster`]: the cluster initialization orchestrator
//! - [`cleanup`]: removal of a failed initialization's data directories
//! - [`server`]: the `Hub` gRPC service

pub mod agent;
pub mod catalog;
pub mod cleanup;
pub mod error;
pub mod fanout;
pub mod make_cluster;
pub mod platform;
pub mod pool;
pub mod segment;
pub mod server;
pub mod stream;
pub mod validate;

pub use agent::{AgentApi, AgentDialer, GrpcDialer};
pub use catalog::{Catalog, CatalogConnector, CatalogTarget, PostgresConnector};
pub use cleanup::CleanupManifest;
pub use error::{HubError, Result};
pub use make_cluster::ClusterOrchestrator;
pub use platform::{Platform, SystemPlatform};
pub use pool::{AgentConn, ConnectionPool};
pub use server::HubService;
pub use stream::HubStream;
