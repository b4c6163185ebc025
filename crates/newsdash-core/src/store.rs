//! State store holding the current `DashboardState` version
//!
//! The store never mutates a published state. Each reducer call builds the
//! successor from the current version and swaps the shared reference, so
//! readers only ever clone an `Arc`.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::router::RoutedEvent;
use crate::state::DashboardState;
use crate::types::{ActivityEntry, AlertEntry, ConnectionStatus, StatsSnapshot};

// ----------------------------------------------------------------------------
// State Store
// ----------------------------------------------------------------------------

/// Owner of the current dashboard version
#[derive(Debug)]
pub struct StateStore {
    current: RwLock<Arc<DashboardState>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(DashboardState::new())
    }
}

impl StateStore {
    /// Create a store seeded with `initial`
    pub fn new(initial: DashboardState) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Current version; cheap reference clone
    pub fn current(&self) -> Arc<DashboardState> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Apply the reducer matching a routed event
    pub fn apply(&self, event: RoutedEvent) -> Arc<DashboardState> {
        match event {
            RoutedEvent::StatsUpdate(snapshot) => self.apply_stats_update(snapshot),
            RoutedEvent::ActivityAppend(entry) => self.apply_activity_append(entry),
            RoutedEvent::AlertAppend(entry) => self.apply_alert_append(entry),
        }
    }

    pub fn apply_stats_update(&self, snapshot: StatsSnapshot) -> Arc<DashboardState> {
        self.replace_with(|state| state.apply_stats_update(snapshot))
    }

    pub fn apply_activity_append(&self, entry: ActivityEntry) -> Arc<DashboardState> {
        self.replace_with(|state| state.apply_activity_append(entry))
    }

    pub fn apply_alert_append(&self, entry: AlertEntry) -> Arc<DashboardState> {
        self.replace_with(|state| state.apply_alert_append(entry))
    }

    pub fn apply_status_change(&self, status: ConnectionStatus) -> Arc<DashboardState> {
        self.replace_with(|state| state.apply_status_change(status))
    }

    fn replace_with<F>(&self, reducer: F) -> Arc<DashboardState>
    where
        F: FnOnce(&DashboardState) -> DashboardState,
    {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(reducer(&guard));
        debug!(version = next.version(), "State version published");
        *guard = Arc::clone(&next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryId, FeedEntry};
    use serde_json::json;

    #[test]
    fn test_old_reference_survives_replacement() {
        let store = StateStore::default();
        let before = store.current();

        store.apply_activity_append(FeedEntry::new(EntryId::new("1"), "info", "A", "t0"));

        assert!(before.activities().is_empty());
        assert_eq!(store.current().activities().len(), 1);
        assert_eq!(store.current().version(), 1);
    }

    #[test]
    fn test_apply_dispatches_by_event() {
        let store = StateStore::default();
        let snapshot: StatsSnapshot = serde_json::from_value(json!({"a": 1})).unwrap();

        let state = store.apply(RoutedEvent::StatsUpdate(snapshot));
        assert_eq!(state.stats().and_then(|s| s.get("a")), Some(&json!(1)));

        let state = store.apply(RoutedEvent::AlertAppend(FeedEntry::new(
            EntryId::new("x"),
            "error",
            "disk full",
            "t1",
        )));
        assert_eq!(state.alerts().len(), 1);
        assert!(state.activities().is_empty());
        assert!(Arc::ptr_eq(&state, &store.current()));
    }
}
