//! Helpers for interpreting gRPC statuses.

use tonic::{Code, Status};

/// True when a status means the peer's transport is already gone.
///
/// Stop RPCs race the server shutting down underneath them, so a stopped
/// service answers with `Unavailable` / "transport is closing". Callers
/// treat this as a successful stop.
pub fn is_transport_closing(status: &Status) -> bool {
    status.code() == Code::Unavailable || status.message().contains("transport is closing")
}

/// Collapses the "already stopped" outcome of a Stop RPC into success.
pub fn ignore_transport_closing<T>(result: Result<T, Status>) -> Result<(), Status> {
    match result {
        Ok(_) => Ok(()),
        Err(status) if is_transport_closing(&status) => Ok(()),
        Err(status) => Err(status),
    }
}
