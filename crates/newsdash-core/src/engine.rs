//! Single-threaded dispatch step shared by every runtime
//!
//! The `Engine` is the one place where inputs become state versions: it
//! routes a message (or applies a status change), swaps the store's current
//! version, then publishes that version to the hub. `handle` takes `&mut
//! self`, so whoever owns the engine is the only writer and versions are
//! published in exactly the order they were produced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::SyncConfig;
use crate::hub::{Subscription, SubscriptionHub};
use crate::router::{EventRouter, RawMessage, RouteOutcome};
use crate::state::DashboardState;
use crate::store::StateStore;
use crate::types::ConnectionStatus;

// ----------------------------------------------------------------------------
// Inputs and Statistics
// ----------------------------------------------------------------------------

/// Anything that can produce a new dashboard version
#[derive(Debug, Clone, PartialEq)]
pub enum EngineInput {
    /// Inbound push message
    Message(RawMessage),
    /// Link status transition reported by the transport
    Status(ConnectionStatus),
}

/// Counters describing what the engine has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Messages handed to the router
    pub messages_received: u64,
    /// Messages that produced a new version
    pub messages_routed: u64,
    /// Messages dropped because their event name is unknown
    pub unknown_dropped: u64,
    /// Messages dropped because their payload was malformed
    pub malformed_dropped: u64,
    /// Status transitions applied
    pub status_changes: u64,
    /// Versions delivered to the hub
    pub versions_published: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    messages_received: AtomicU64,
    messages_routed: AtomicU64,
    unknown_dropped: AtomicU64,
    malformed_dropped: AtomicU64,
    status_changes: AtomicU64,
    versions_published: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> SyncStats {
        SyncStats {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_routed: self.messages_routed.load(Ordering::Relaxed),
            unknown_dropped: self.unknown_dropped.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            status_changes: self.status_changes.load(Ordering::Relaxed),
            versions_published: self.versions_published.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// ----------------------------------------------------------------------------
// Engine
// ----------------------------------------------------------------------------

/// Router + store + hub, driven one input at a time
#[derive(Debug)]
pub struct Engine {
    router: EventRouter,
    store: Arc<StateStore>,
    hub: SubscriptionHub,
    counters: Arc<StatsCounters>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(DashboardState::new())
    }
}

impl Engine {
    /// Engine starting from `initial`
    pub fn new(initial: DashboardState) -> Self {
        Self {
            router: EventRouter::new(),
            store: Arc::new(StateStore::new(initial)),
            hub: SubscriptionHub::new(),
            counters: Arc::new(StatsCounters::default()),
        }
    }

    /// Engine with the feed capacities from `config`
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(DashboardState::with_capacities(
            config.activity_capacity,
            config.alert_capacity,
        ))
    }

    /// Read-side handle: readers clone the current version from here
    pub fn reader(&self) -> EngineReader {
        EngineReader {
            store: Arc::clone(&self.store),
            hub: self.hub.clone(),
            counters: Arc::clone(&self.counters),
        }
    }

    pub fn state(&self) -> Arc<DashboardState> {
        self.store.current()
    }

    /// Process one input to completion. Returns the published version, or
    /// `None` when the input was dropped or changed nothing.
    pub fn handle(&mut self, input: EngineInput) -> Option<Arc<DashboardState>> {
        let next = match input {
            EngineInput::Message(message) => {
                bump(&self.counters.messages_received);
                match self.router.dispatch(message, &self.store) {
                    RouteOutcome::Applied { .. } => {
                        bump(&self.counters.messages_routed);
                        self.store.current()
                    }
                    RouteOutcome::Unknown { .. } => {
                        bump(&self.counters.unknown_dropped);
                        return None;
                    }
                    RouteOutcome::Malformed(_) => {
                        bump(&self.counters.malformed_dropped);
                        return None;
                    }
                }
            }
            EngineInput::Status(status) => {
                if self.store.current().status() == status {
                    return None;
                }
                debug!(%status, "Applying status change");
                bump(&self.counters.status_changes);
                self.store.apply_status_change(status)
            }
        };

        self.hub.publish(&next);
        bump(&self.counters.versions_published);
        Some(next)
    }

    pub fn stats(&self) -> SyncStats {
        self.counters.snapshot()
    }
}

// ----------------------------------------------------------------------------
// Reader Handle
// ----------------------------------------------------------------------------

/// Shareable, read-only view of an engine: the consumer-facing API
#[derive(Debug, Clone)]
pub struct EngineReader {
    store: Arc<StateStore>,
    hub: SubscriptionHub,
    counters: Arc<StatsCounters>,
}

impl EngineReader {
    /// Current dashboard version
    pub fn state(&self) -> Arc<DashboardState> {
        self.store.current()
    }

    /// Register for every future version
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<DashboardState>) + Send + Sync + 'static,
    {
        self.hub.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Release every subscriber at once. Owners call this on shutdown; the
    /// publish side of the hub stays with the engine.
    pub fn clear_subscribers(&self) {
        self.hub.clear();
    }

    pub fn stats(&self) -> SyncStats {
        self.counters.snapshot()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
