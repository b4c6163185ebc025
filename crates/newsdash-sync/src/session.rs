//! Dashboard Session
//!
//! Wires the pieces together for one dashboard:
//!
//! ```text
//! link ──► ChannelTransport ──► mpsc<EngineInput> ──► engine task ──► hub ──► subscribers
//!                ▲                                         │
//!                └──── ReconnectSupervisor                 └──► StateStore ◄── state()
//! ```
//!
//! The engine task is the only writer, so every subscriber sees versions in
//! the order they were produced.

use std::sync::{Arc, Mutex, PoisonError};

use newsdash_core::{
    ConnectionStatus, DashboardState, Engine, EngineInput, EngineReader, ReconnectPolicy, Result,
    Subscription, SyncConfig, SyncError, SyncStats, REQUEST_STATS_EVENT,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::link::Connector;
use crate::reconnect::ReconnectSupervisor;
use crate::transport::ChannelTransport;
use crate::websocket::{Heartbeat, WebSocketConnector};

/// Live connection plus state for one dashboard
pub struct DashboardSession {
    config: SyncConfig,
    transport: Arc<ChannelTransport>,
    reader: EngineReader,
    engine_task: Mutex<Option<JoinHandle<()>>>,
    supervisor: Mutex<Option<ReconnectSupervisor>>,
}

impl std::fmt::Debug for DashboardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardSession")
            .field("endpoint", &self.config.endpoint)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl DashboardSession {
    /// Open a session over WebSocket using the configured framing
    pub fn open(config: SyncConfig) -> Result<Self> {
        let heartbeat = Heartbeat::new(config.heartbeat_interval(), config.heartbeat_timeout());
        let connector = WebSocketConnector::new(config.framing).with_heartbeat(heartbeat);
        Self::open_with(config, Arc::new(connector))
    }

    /// Open a session over any connector. Must be called inside a tokio
    /// runtime; the first connect starts in the background.
    pub fn open_with(config: SyncConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;

        let mut engine = Engine::from_config(&config);
        let reader = engine.reader();
        let transport = Arc::new(ChannelTransport::new(connector, config.connect_timeout()));
        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<EngineInput>();

        let messages = input_tx.clone();
        transport.on_message(move |message| {
            let _ = messages.send(EngineInput::Message(message.clone()));
        });
        transport.on_status_change(move |status| {
            let _ = input_tx.send(EngineInput::Status(status));
        });
        if config.refresh_on_connect {
            let weak = Arc::downgrade(&transport);
            transport.on_status_change(move |status| {
                if status == ConnectionStatus::Connected {
                    if let Some(transport) = weak.upgrade() {
                        transport.send(REQUEST_STATS_EVENT, Value::Null);
                    }
                }
            });
        }

        let engine_task = tokio::spawn(async move {
            while let Some(input) = input_rx.recv().await {
                engine.handle(input);
            }
            debug!("Engine task drained");
        });

        let policy = config
            .auto_reconnect
            .then(|| ReconnectPolicy::new(config.backoff.clone()));
        let supervisor =
            ReconnectSupervisor::spawn(Arc::clone(&transport), config.endpoint.clone(), policy);

        info!(endpoint = %config.endpoint, framing = ?config.framing, "Dashboard session opened");
        Ok(Self {
            config,
            transport,
            reader,
            engine_task: Mutex::new(Some(engine_task)),
            supervisor: Mutex::new(Some(supervisor)),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Latest dashboard version
    pub fn state(&self) -> Arc<DashboardState> {
        self.reader.state()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.transport.status()
    }

    /// Register for every future version. Keep the returned handle to
    /// unsubscribe; dropping it leaves the callback registered.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<DashboardState>) + Send + Sync + 'static,
    {
        self.reader.subscribe(callback)
    }

    /// Emit an event to the backend; `false` when not connected
    pub fn send(&self, event: &str, payload: Value) -> bool {
        self.transport.send(event, payload)
    }

    /// Ask the backend for a fresh stats snapshot
    pub fn request_stats(&self) -> bool {
        self.send(REQUEST_STATS_EVENT, Value::Null)
    }

    pub fn stats(&self) -> SyncStats {
        self.reader.stats()
    }

    /// Handshakes started so far, retries included
    pub fn connect_attempts(&self) -> u64 {
        self.transport.connect_attempts()
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Fail fast on a closed session
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(SyncError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Close the channel, cancel any pending retry and release subscribers.
    /// The final `Disconnected` version is published before this returns.
    pub async fn close(&self) {
        if self.is_closed() {
            return;
        }
        self.transport.close().await;

        let supervisor = lock_take(&self.supervisor);
        if let Some(supervisor) = supervisor {
            supervisor.join().await;
        }
        let engine_task = lock_take(&self.engine_task);
        if let Some(task) = engine_task {
            let _ = task.await;
        }

        self.reader.clear_subscribers();
        info!("Dashboard session closed");
    }
}

fn lock_take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}
