//! Connection pool: one ready agent connection per host.

use crate::agent::{AgentApi, AgentDialer};
use crate::error::{HubError, Result};
use crate::fanout;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A connection to the agent on one host.
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct AgentConn {
    pub hostname: String,
    pub agent: Arc<dyn AgentApi>,
}

impl fmt::Debug for AgentConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConn")
            .field("hostname", &self.hostname)
            .finish_non_exhaustive()
    }
}

/// Holds the hub's agent connections across RPCs.
///
/// Only [`ConnectionPool::dial_all`] and [`ConnectionPool::close_all`] write
/// the pool; everything else works on the snapshot `dial_all` returns.
pub struct ConnectionPool {
    dialer: Arc<dyn AgentDialer>,
    conns: Mutex<Vec<AgentConn>>,
}

impl ConnectionPool {
    pub fn new(dialer: Arc<dyn AgentDialer>) -> Self {
        Self {
            dialer,
            conns: Mutex::new(Vec::new()),
        }
    }

    /// Returns a ready connection for every host, dialing if needed.
    ///
    /// With an empty pool every host is dialed in parallel; one failure fails
    /// the whole call and nothing is kept. With an existing pool every
    /// connection is re-checked for readiness; if any host is not ready the
    /// pool is emptied and the error lists those hosts, so the next call
    /// dials all hosts afresh.
    pub async fn dial_all(&self, hosts: &[String]) -> Result<Vec<AgentConn>> {
        let mut conns = self.conns.lock().await;

        if !conns.is_empty() {
            let unready = Self::unready_hosts(&conns).await;
            if !unready.is_empty() {
                warn!("Dropping agent connections, not ready: {}", unready.join(", "));
                conns.clear();
                return Err(HubError::AgentsNotReady(unready));
            }
            debug!("Reusing {} agent connections", conns.len());
            return Ok(conns.clone());
        }

        info!("Dialing agents on {} hosts", hosts.len());
        let dials = hosts.iter().cloned().map(|host| {
            let dialer = self.dialer.clone();
            async move {
                let agent = dialer.dial(&host).await?;
                Ok::<_, HubError>(AgentConn {
                    hostname: host,
                    agent,
                })
            }
        });
        let mut dialed = fanout::execute_first_err(dials).await?;

        // Keep the configured host order regardless of completion order
        dialed.sort_by_key(|conn| hosts.iter().position(|h| *h == conn.hostname));
        *conns = dialed.clone();
        Ok(dialed)
    }

    async fn unready_hosts(conns: &[AgentConn]) -> Vec<String> {
        let checks = conns.iter().cloned().map(|conn| async move {
            let host = conn.hostname;
            let agent = conn.agent;
            // A probe that panics counts as unready.
            let ready = match tokio::spawn(async move { agent.is_ready().await }).await {
                Ok(ready) => ready,
                Err(e) => {
                    warn!("Readiness check for {} failed: {}", host, e);
                    false
                }
            };
            Ok::<_, HubError>((host, ready))
        });

        let mut unready: Vec<String> = match fanout::execute_join_err(checks).await {
            Ok(results) => results
                .into_iter()
                .filter(|(_, ready)| !ready)
                .map(|(host, _)| host)
                .collect(),
            Err(e) => {
                warn!("Readiness checks failed: {}", e);
                conns.iter().map(|conn| conn.hostname.clone()).collect()
            }
        };
        unready.sort();
        unready
    }

    /// Drops every connection.
    pub async fn close_all(&self) {
        let mut conns = self.conns.lock().await;
        if !conns.is_empty() {
            info!("Closing {} agent connections", conns.len());
        }
        conns.clear();
    }

    pub async fn len(&self) -> usize {
        self.conns.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conns.lock().await.is_empty()
    }
}

/// Looks up the connection for `host` in a dialed snapshot.
pub fn conn_for<'a>(conns: &'a [AgentConn], host: &str) -> Result<&'a AgentConn> {
    conns
        .iter()
        .find(|conn| conn.hostname == host)
        .ok_or_else(|| HubError::MissingConnection(host.to_string()))
}
