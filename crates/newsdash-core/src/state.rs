//! Immutable dashboard state and the reducers that derive its successors
//!
//! Every reducer borrows the current version and returns a brand new one with
//! `version + 1`. A consumer holding an `Arc<DashboardState>` therefore never
//! sees a half-applied update.

use serde::Serialize;

use crate::feed::BoundedFeed;
use crate::types::{ActivityEntry, AlertEntry, ConnectionStatus, StatsSnapshot};
use crate::{ACTIVITY_CAPACITY, ALERT_CAPACITY};

/// One version of the dashboard as seen by consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardState {
    version: u64,
    status: ConnectionStatus,
    stats: Option<StatsSnapshot>,
    activities: BoundedFeed<ActivityEntry>,
    alerts: BoundedFeed<AlertEntry>,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardState {
    /// Empty initial state with the default feed capacities (10 / 5)
    pub fn new() -> Self {
        Self::with_capacities(ACTIVITY_CAPACITY, ALERT_CAPACITY)
    }

    /// Empty initial state with custom feed capacities
    pub fn with_capacities(activity_capacity: usize, alert_capacity: usize) -> Self {
        Self {
            version: 0,
            status: ConnectionStatus::Disconnected,
            stats: None,
            activities: BoundedFeed::new(activity_capacity),
            alerts: BoundedFeed::new(alert_capacity),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn stats(&self) -> Option<&StatsSnapshot> {
        self.stats.as_ref()
    }

    /// Activity log, newest first
    pub fn activities(&self) -> &BoundedFeed<ActivityEntry> {
        &self.activities
    }

    /// Alert queue, newest first
    pub fn alerts(&self) -> &BoundedFeed<AlertEntry> {
        &self.alerts
    }

    // ------------------------------------------------------------------------
    // Reducers
    // ------------------------------------------------------------------------

    /// Replace the stats snapshot wholesale
    pub fn apply_stats_update(&self, snapshot: StatsSnapshot) -> Self {
        Self {
            version: self.next_version(),
            stats: Some(snapshot),
            ..self.clone()
        }
    }

    /// Prepend an activity entry, evicting the oldest beyond capacity
    pub fn apply_activity_append(&self, entry: ActivityEntry) -> Self {
        Self {
            version: self.next_version(),
            activities: self.activities.with_pushed(entry),
            ..self.clone()
        }
    }

    /// Prepend an alert entry, evicting the oldest beyond capacity
    pub fn apply_alert_append(&self, entry: AlertEntry) -> Self {
        Self {
            version: self.next_version(),
            alerts: self.alerts.with_pushed(entry),
            ..self.clone()
        }
    }

    /// Replace the connection status only; data slices are kept so an
    /// operator still sees the last known values while disconnected
    pub fn apply_status_change(&self, status: ConnectionStatus) -> Self {
        Self {
            version: self.next_version(),
            status,
            ..self.clone()
        }
    }

    fn next_version(&self) -> u64 {
        self.version.wrapping_add(1)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
