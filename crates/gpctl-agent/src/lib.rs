//! gpctl agent: performs instance lifecycle operations on one host on behalf
//! of the hub.

pub mod error;
pub mod process;
pub mod segment;
pub mod server;
pub mod validate;

pub use error::{AgentError, Result};
pub use segment::SegmentManager;
pub use server::AgentService;
pub use validate::HostValidator;

/// Host name of the local machine.
pub fn local_host_name() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string())
}
