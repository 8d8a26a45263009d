/// Generated gRPC protocol definitions for gpctl.
///
/// The `Hub` service is consumed by the CLI; the `Agent` service is consumed
/// by the hub and runs once per host.
pub mod gpctl {
    pub mod v1 {
        tonic::include_proto!("gpctl.v1");
    }
}

// Re-export commonly used types for convenience
pub use gpctl::v1::*;
