//! Progress and log stream back to the caller of `MakeCluster`.

use gpctl_proto::{make_cluster_reply, LogLevel, LogMessage, MakeClusterReply, ProgressMessage};
use tokio::sync::mpsc;
use tonic::Status;
use tracing::{debug, info, warn};

/// Item type of the `MakeCluster` response stream
pub type StreamItem = Result<MakeClusterReply, Status>;

/// Sends log lines, leveled messages and progress ticks to the caller.
///
/// Sends are best-effort: a caller that went away never fails the
/// orchestration. Messages sent from one task arrive in send order.
#[derive(Clone)]
pub struct HubStream {
    tx: mpsc::UnboundedSender<StreamItem>,
}

impl HubStream {
    pub fn new(tx: mpsc::UnboundedSender<StreamItem>) -> Self {
        Self { tx }
    }

    /// A stream plus the receiving end, for the server and for tests.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, message: make_cluster_reply::Message) {
        if self
            .tx
            .send(Ok(MakeClusterReply {
                message: Some(message),
            }))
            .is_err()
        {
            debug!("Stream receiver dropped, message discarded");
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Warning | LogLevel::Error => warn!("{}", message),
            LogLevel::Debug => debug!("{}", message),
            LogLevel::Info => info!("{}", message),
        }
        self.send(make_cluster_reply::Message::LogMsg(LogMessage {
            level: level as i32,
            message,
        }));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    /// Forwards a message produced elsewhere (e.g. by an agent).
    pub fn forward(&self, message: LogMessage) {
        self.log(message.level(), message.message);
    }

    /// One tick of the phase `label`, which completes after `total` ticks.
    pub fn progress(&self, label: &str, total: usize) {
        self.send(make_cluster_reply::Message::Progress(ProgressMessage {
            label: label.to_string(),
            total: total as i32,
        }));
    }

    /// A raw line of command output.
    pub fn stdout(&self, line: impl Into<String>) {
        self.send(make_cluster_reply::Message::Stdout(line.into()));
    }

    /// Ends the stream with an error status.
    pub fn fail(&self, status: Status) {
        let _ = self.tx.send(Err(status));
    }
}
