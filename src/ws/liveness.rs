//! The background sweep that keeps the connection registry honest.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;

use crate::ws::registry::{ConnectionRegistry, OutboundFrame};

/// Timing knobs for the liveness sweep.
#[derive(Debug, Clone, Copy)]
pub struct LivenessConfig {
    /// How often the sweep runs.
    pub sweep_interval: Duration,
    /// How long a connection may go without answering a ping before it is
    /// evicted.
    pub timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(15),
            timeout: Duration::from_secs(30),
        }
    }
}

/// A handle to the background task that sweeps the registry.
///
/// The server binary owns the handle and calls [LivenessSupervisor::stop]
/// during shutdown so no timer outlives the server.
#[derive(Debug)]
pub struct LivenessSupervisor {
    task: JoinHandle<()>,
}

impl LivenessSupervisor {
    /// Start sweeping `registry` on the interval given by `config`.
    pub fn spawn(registry: Arc<ConnectionRegistry>, config: LivenessConfig) -> Self {
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.sweep_interval);
            // The first tick fires immediately; skip it so fresh connections
            // get a full interval before their first ping.
            interval.tick().await;

            loop {
                interval.tick().await;
                sweep(&registry, config.timeout);
            }
        });

        Self { task }
    }

    /// Cancel the sweep task.
    pub fn stop(self) {
        self.task.abort();
    }
}

/// Run one pass over the registry: drop closed entries, evict stale ones,
/// ping the rest.
fn sweep(registry: &ConnectionRegistry, timeout: Duration) {
    let timeout_millis = timeout.as_millis() as u64;

    for entry in registry.snapshot() {
        if entry.is_closed() {
            if registry.remove(entry.user_id, entry.conn_id()) {
                tracing::info!(
                    user_id = %entry.user_id,
                    "removed closed connection during sweep"
                );
            }
            continue;
        }

        if entry.millis_since_last_ping() > timeout_millis {
            let _ = entry.try_send(OutboundFrame::Terminate);
            if registry.remove(entry.user_id, entry.conn_id()) {
                tracing::info!(
                    user_id = %entry.user_id,
                    name = %entry.display_name,
                    "evicted unresponsive connection"
                );
            }
            continue;
        }

        if let Err(error) = entry.try_send(OutboundFrame::Ping) {
            tracing::warn!(
                user_id = %entry.user_id,
                "could not ping connection: {error}"
            );
        }
    }
}
