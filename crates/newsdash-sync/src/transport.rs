//! Channel Transport
//!
//! Owns at most one live `Link` at a time and exposes it as a push channel
//! with registered handlers:
//! - `connect` runs the handshake under the connect timeout and, on success,
//!   spawns the I/O task that feeds inbound events to the message handlers
//! - `send` queues an outbound event for the I/O task
//! - every status transition is reported to the status handlers
//!
//! Failures never escape as errors. A refused or timed-out handshake and a
//! dropped link all end in `Disconnected`; the reconnect supervisor decides
//! what happens next.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use newsdash_core::{ConnectionStatus, RawMessage, TransportError};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::link::{Connector, Link};

/// Inbound event handler
pub type MessageHandler = Arc<dyn Fn(&RawMessage) + Send + Sync>;
/// Status transition handler
pub type StatusHandler = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// How long `close` waits for the I/O task to finish its close handshake
const CLOSE_GRACE: Duration = Duration::from_secs(2);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves once `close` has been requested (or the transport is gone)
pub(crate) async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|closed| *closed).await;
}

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

#[derive(Default)]
struct Shared {
    status: Mutex<ConnectionStatus>,
    /// Serializes transitions with their notifications so handlers observe
    /// statuses in the order they were set
    notify: Mutex<()>,
    message_handlers: Mutex<Vec<MessageHandler>>,
    status_handlers: Mutex<Vec<StatusHandler>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<RawMessage>>>,
    attempts: AtomicU64,
    closed: AtomicBool,
}

impl Shared {
    fn status(&self) -> ConnectionStatus {
        *lock(&self.status)
    }

    /// Move to `next` if `allowed` accepts the current status. Handlers are
    /// only told about real changes.
    fn transition<F>(&self, next: ConnectionStatus, allowed: F) -> bool
    where
        F: FnOnce(ConnectionStatus) -> bool,
    {
        let _order = lock(&self.notify);
        {
            let mut status = lock(&self.status);
            if !allowed(*status) {
                return false;
            }
            if *status == next {
                return true;
            }
            *status = next;
        }
        debug!(status = %next, "Transport status changed");

        let handlers = lock(&self.status_handlers).clone();
        for handler in handlers {
            handler(next);
        }
        true
    }

    fn set_status(&self, next: ConnectionStatus) {
        self.transition(next, |_| true);
    }

    fn dispatch(&self, message: &RawMessage) {
        let handlers = lock(&self.message_handlers).clone();
        for handler in handlers {
            handler(message);
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Transport
// ----------------------------------------------------------------------------

/// Persistent push channel to one backend endpoint
pub struct ChannelTransport {
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    io_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("status", &self.status())
            .field("connect_timeout", &self.connect_timeout)
            .field("connect_attempts", &self.connect_attempts())
            .finish_non_exhaustive()
    }
}

impl ChannelTransport {
    pub fn new(connector: Arc<dyn Connector>, connect_timeout: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            connector,
            connect_timeout,
            shared: Arc::new(Shared::default()),
            shutdown_tx,
            io_task: Mutex::new(None),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    /// Handshakes started since creation
    pub fn connect_attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Receiver that flips to `true` once `close` is called
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Register an inbound event handler. Handlers run on the I/O task in
    /// registration order.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&RawMessage) + Send + Sync + 'static,
    {
        lock(&self.shared.message_handlers).push(Arc::new(handler));
    }

    /// Register a status handler. Handlers run in registration order on
    /// whichever task made the transition and must not call `connect` or
    /// `close` themselves.
    pub fn on_status_change<F>(&self, handler: F)
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        lock(&self.shared.status_handlers).push(Arc::new(handler));
    }

    /// Open the channel. No-op unless the transport is `Disconnected`.
    ///
    /// Resolves once the handshake has succeeded, failed, timed out or been
    /// interrupted by `close`, and returns the resulting status.
    pub async fn connect(&self, endpoint: &str) -> ConnectionStatus {
        self.establish(endpoint, |status| status == ConnectionStatus::Disconnected)
            .await
    }

    /// Mark a pending retry. Only valid from `Disconnected`.
    pub(crate) fn mark_reconnecting(&self) -> bool {
        !self.is_closed()
            && self
                .shared
                .transition(ConnectionStatus::Reconnecting, |status| {
                    status == ConnectionStatus::Disconnected
                })
    }

    /// Retry after a backoff; allowed from `Disconnected` or `Reconnecting`
    pub(crate) async fn reconnect(&self, endpoint: &str) -> ConnectionStatus {
        self.establish(endpoint, |status| {
            matches!(
                status,
                ConnectionStatus::Disconnected | ConnectionStatus::Reconnecting
            )
        })
        .await
    }

    async fn establish<F>(&self, endpoint: &str, allowed: F) -> ConnectionStatus
    where
        F: FnOnce(ConnectionStatus) -> bool,
    {
        if self.is_closed() {
            debug!("Transport closed; ignoring connect");
            return self.status();
        }
        if !self.shared.transition(ConnectionStatus::Connecting, allowed) {
            debug!(status = %self.status(), "Connect already in progress");
            return self.status();
        }

        let attempt = self.shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        info!(endpoint, attempt, "Connecting");

        let mut shutdown = self.shutdown_signal();
        let outcome = tokio::select! {
            biased;
            _ = shutdown_signalled(&mut shutdown) => None,
            result = tokio::time::timeout(self.connect_timeout, self.connector.connect(endpoint)) => Some(result),
        };

        let link = match outcome {
            None => {
                debug!("Handshake interrupted by close");
                self.shared.set_status(ConnectionStatus::Disconnected);
                return ConnectionStatus::Disconnected;
            }
            Some(Err(_elapsed)) => {
                let e = TransportError::HandshakeTimeout {
                    endpoint: endpoint.to_string(),
                    duration_ms: self.connect_timeout.as_millis() as u64,
                };
                warn!(error = %e, "Connect failed");
                self.shared.set_status(ConnectionStatus::Disconnected);
                return ConnectionStatus::Disconnected;
            }
            Some(Ok(Err(e))) => {
                warn!(endpoint, error = %e, "Connect failed");
                self.shared.set_status(ConnectionStatus::Disconnected);
                return ConnectionStatus::Disconnected;
            }
            Some(Ok(Ok(link))) => link,
        };

        // Checked under the task slot lock so a concurrent `close` either
        // finds the new I/O task or leaves us to discard the link
        let rejected = {
            let mut io_task = lock(&self.io_task);
            if self.is_closed() {
                Some(link)
            } else {
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                *lock(&self.shared.outbound) = Some(outbound_tx);
                self.shared.set_status(ConnectionStatus::Connected);
                info!(endpoint, "Connected");

                let task = tokio::spawn(run_link(
                    Arc::clone(&self.shared),
                    link,
                    outbound_rx,
                    self.shutdown_signal(),
                ));
                if let Some(previous) = io_task.replace(task) {
                    if !previous.is_finished() {
                        previous.abort();
                    }
                }
                None
            }
        };

        if let Some(mut link) = rejected {
            debug!("Transport closed during handshake; discarding link");
            link.close().await;
            self.shared.set_status(ConnectionStatus::Disconnected);
            return ConnectionStatus::Disconnected;
        }
        ConnectionStatus::Connected
    }

    /// Emit an event to the backend. Returns `false` (with a warning) when
    /// the channel is not connected.
    pub fn send(&self, event: &str, payload: Value) -> bool {
        if self.status() != ConnectionStatus::Connected {
            warn!(event, status = %self.status(), "Not connected; dropping outbound event");
            return false;
        }
        let queued = lock(&self.shared.outbound)
            .as_ref()
            .map(|tx| tx.send(RawMessage::new(event, payload.clone())).is_ok())
            .unwrap_or(false);
        if !queued {
            warn!(event, "Link is shutting down; dropping outbound event");
        }
        queued
    }

    /// Tear the channel down for good. Safe to call in any state and more
    /// than once; pending handshakes and backoffs observe the shutdown signal.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Closing transport");
        let _ = self.shutdown_tx.send(true);

        let task = lock(&self.io_task).take();
        lock(&self.shared.outbound).take();
        if let Some(mut task) = task {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                warn!("I/O task did not stop in time; aborting");
                task.abort();
            }
        }

        self.shared.set_status(ConnectionStatus::Disconnected);
        lock(&self.shared.message_handlers).clear();
        lock(&self.shared.status_handlers).clear();
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

// ----------------------------------------------------------------------------
// I/O Task
// ----------------------------------------------------------------------------

async fn run_link(
    shared: Arc<Shared>,
    mut link: Box<dyn Link>,
    mut outbound: mpsc::UnboundedReceiver<RawMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    let reason = loop {
        tokio::select! {
            biased;
            _ = shutdown_signalled(&mut shutdown) => {
                // Events queued before close still go out
                while let Ok(message) = outbound.try_recv() {
                    if link.send(message).await.is_err() {
                        break;
                    }
                }
                link.close().await;
                break "closed locally".to_string();
            }
            inbound = link.recv() => match inbound {
                Some(Ok(message)) => shared.dispatch(&message),
                Some(Err(e)) => break e.to_string(),
                None => break "closed by server".to_string(),
            },
            queued = outbound.recv() => match queued {
                Some(message) => {
                    if let Err(e) = link.send(message).await {
                        break e.to_string();
                    }
                }
                None => {
                    link.close().await;
                    break "outbound queue closed".to_string();
                }
            },
        }
    };

    info!(%reason, "Link down");
    lock(&shared.outbound).take();
    shared.set_status(ConnectionStatus::Disconnected);
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
