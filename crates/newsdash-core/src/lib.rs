//! newsdash Core
//!
//! This crate holds the runtime-agnostic half of the newsdash live dashboard:
//! the immutable `DashboardState` model, the bounded activity/alert feeds, the
//! pure reducers applied by the `StateStore`, the `EventRouter` that classifies
//! inbound push events, the `SubscriptionHub` that fans state versions out to
//! consumers, and the reconnection backoff policy.
//!
//! Nothing in here owns a socket or a timer. The `newsdash-sync` crate drives
//! these pieces from a tokio runtime.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod backoff;
pub mod config;
pub mod engine;
pub mod errors;
pub mod feed;
pub mod hub;
pub mod router;
pub mod state;
pub mod store;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use backoff::ReconnectPolicy;
pub use config::{BackoffConfig, Framing, SyncConfig};
pub use engine::{Engine, EngineInput, EngineReader, SyncStats};
pub use errors::{ConfigError, EventError, Result, SyncError, TransportError};
pub use feed::BoundedFeed;
pub use hub::{StateCallback, Subscription, SubscriptionHub, SubscriptionId};
pub use router::{EventKind, EventRouter, RawMessage, RouteOutcome, RoutedEvent};
pub use state::DashboardState;
pub use store::StateStore;
pub use types::{ActivityEntry, AlertEntry, ConnectionStatus, EntryId, FeedEntry, StatsSnapshot};

/// Inbound event name carrying a full stats snapshot
pub const STATS_UPDATE_EVENT: &str = "stats_update";
/// Inbound event name carrying one activity log entry
pub const ACTIVITY_UPDATE_EVENT: &str = "activity_update";
/// Inbound event name carrying one alert entry
pub const ALERT_EVENT: &str = "alert";
/// Outbound event asking the backend to push a fresh `stats_update`
pub const REQUEST_STATS_EVENT: &str = "request_stats";

/// Default capacity of the activity feed
pub const ACTIVITY_CAPACITY: usize = 10;
/// Default capacity of the alert feed
pub const ALERT_CAPACITY: usize = 5;
