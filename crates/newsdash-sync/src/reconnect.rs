//! Reconnect Supervisor
//!
//! Performs the initial connect, then watches the transport's status. Each
//! unplanned `Disconnected` schedules a retry after the policy's backoff
//! delay; `Connected` resets the policy. Retries are unbounded and stop only
//! when the transport is closed, including mid-backoff.

use std::sync::Arc;

use newsdash_core::{ConnectionStatus, ReconnectPolicy};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::transport::{shutdown_signalled, ChannelTransport};

/// Handle to the running supervisor task
#[derive(Debug)]
pub struct ReconnectSupervisor {
    task: JoinHandle<()>,
}

impl ReconnectSupervisor {
    /// Connect `transport` to `endpoint` and keep it connected. With
    /// `policy` set to `None` only the initial connect is attempted.
    pub fn spawn(
        transport: Arc<ChannelTransport>,
        endpoint: String,
        policy: Option<ReconnectPolicy>,
    ) -> Self {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        if policy.is_some() {
            transport.on_status_change(move |status| {
                let _ = status_tx.send(status);
            });
        }
        let shutdown = transport.shutdown_signal();
        let task = tokio::spawn(supervise(transport, endpoint, policy, status_rx, shutdown));
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the supervisor to exit after the transport was closed
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

async fn supervise(
    transport: Arc<ChannelTransport>,
    endpoint: String,
    policy: Option<ReconnectPolicy>,
    mut statuses: mpsc::UnboundedReceiver<ConnectionStatus>,
    mut shutdown: watch::Receiver<bool>,
) {
    transport.connect(&endpoint).await;

    let Some(mut policy) = policy else {
        debug!("Automatic reconnection disabled");
        return;
    };

    loop {
        let status = tokio::select! {
            biased;
            _ = shutdown_signalled(&mut shutdown) => break,
            status = statuses.recv() => match status {
                Some(status) => status,
                None => break,
            },
        };

        match status {
            ConnectionStatus::Connected => policy.reset(),
            ConnectionStatus::Disconnected => {
                // A later status may already be queued (e.g. a racing
                // connect); only retry if the link is still down.
                if !transport.mark_reconnecting() {
                    continue;
                }
                let delay = policy.next_delay();
                info!(
                    attempt = policy.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );

                tokio::select! {
                    biased;
                    _ = shutdown_signalled(&mut shutdown) => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                if *shutdown.borrow() {
                    break;
                }
                transport.reconnect(&endpoint).await;
            }
            ConnectionStatus::Connecting | ConnectionStatus::Reconnecting => {}
        }
    }

    debug!("Reconnect supervisor stopped");
}
