//! Subscription hub
//!
//! Fans every published `DashboardState` version out to registered
//! consumers. Callbacks run on the publishing thread, one after another, so a
//! given subscriber observes versions in publish order with no gaps. A
//! panicking callback is caught and logged; the remaining subscribers are
//! still notified.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::{debug, error};

use crate::state::DashboardState;

/// Consumer callback invoked with each new state version
pub type StateCallback = dyn Fn(&Arc<DashboardState>) + Send + Sync + 'static;

/// Identifier handed out per subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Subscriber {
    id: SubscriptionId,
    active: AtomicBool,
    callback: Box<StateCallback>,
}

#[derive(Default)]
struct HubInner {
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
}

impl HubInner {
    fn remove(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|sub| {
            if sub.id == id {
                sub.active.store(false, Ordering::SeqCst);
                false
            } else {
                true
            }
        });
        subscribers.len() != before
    }
}

// ----------------------------------------------------------------------------
// Subscription Hub
// ----------------------------------------------------------------------------

/// Registry of state consumers
#[derive(Clone, Default)]
pub struct SubscriptionHub {
    inner: Arc<HubInner>,
}

impl fmt::Debug for SubscriptionHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer. The returned handle must be used to
    /// unsubscribe; dropping it leaves the subscription in place until the
    /// hub is cleared.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<DashboardState>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let subscriber = Arc::new(Subscriber {
            id,
            active: AtomicBool::new(true),
            callback: Box::new(callback),
        });
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
        debug!(subscription = %id, "Subscriber registered");

        Subscription {
            id,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `state` to every active subscriber; returns how many
    /// callbacks completed without panicking
    pub fn publish(&self, state: &Arc<DashboardState>) -> usize {
        // Callbacks run outside the registry lock so they may (un)subscribe.
        let snapshot: Vec<Arc<Subscriber>> = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut delivered = 0;
        for subscriber in snapshot {
            if !subscriber.active.load(Ordering::SeqCst) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(state))) {
                Ok(()) => delivered += 1,
                Err(panic) => error!(
                    subscription = %subscriber.id,
                    version = state.version(),
                    "Subscriber panicked during notification: {}",
                    panic_message(&panic)
                ),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Release every subscription
    pub fn clear(&self) {
        let mut subscribers = self.inner.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        for sub in subscribers.iter() {
            sub.active.store(false, Ordering::SeqCst);
        }
        subscribers.clear();
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ----------------------------------------------------------------------------
// Subscription Handle
// ----------------------------------------------------------------------------

/// Capability to cancel one subscription
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stop delivery to this subscriber. Returns false if the hub was
    /// already gone or had released the subscription.
    pub fn unsubscribe(self) -> bool {
        match self.hub.upgrade() {
            Some(inner) => {
                let removed = inner.remove(self.id);
                if removed {
                    debug!(subscription = %self.id, "Subscriber removed");
                }
                removed
            }
            None => false,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionStatus;
    use std::sync::atomic::AtomicUsize;

    fn versions(count: u64) -> Vec<Arc<DashboardState>> {
        let mut state = DashboardState::new();
        let mut out = Vec::new();
        for _ in 0..count {
            state = state.apply_status_change(ConnectionStatus::Connected);
            out.push(Arc::new(state.clone()));
        }
        out
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let hub = SubscriptionHub::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = hub.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let states = versions(4);
        for state in &states[..3] {
            hub.publish(state);
        }
        assert!(sub.unsubscribe());
        hub.publish(&states[3]);

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let hub = SubscriptionHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _bad = hub.subscribe(|_| panic!("widget exploded"));
        let sink = Arc::clone(&seen);
        let _good = hub.subscribe(move |state| sink.lock().unwrap().push(state.version()));

        for state in versions(3) {
            assert_eq!(hub.publish(&state), 1);
        }
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_subscribers_see_same_gap_free_sequence() {
        let hub = SubscriptionHub::new();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let a = Arc::clone(&first);
        let _s1 = hub.subscribe(move |state| a.lock().unwrap().push(state.version()));
        let b = Arc::clone(&second);
        let _s2 = hub.subscribe(move |state| b.lock().unwrap().push(state.version()));

        for state in versions(5) {
            hub.publish(&state);
        }
        assert_eq!(*first.lock().unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(*first.lock().unwrap(), *second.lock().unwrap());
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let hub = SubscriptionHub::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let handle_slot = Arc::clone(&slot);
        let counter = Arc::clone(&calls);
        let sub = hub.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = handle_slot.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        for state in versions(3) {
            hub.publish(&state);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_releases_all_and_handles_become_inert() {
        let hub = SubscriptionHub::new();
        let sub = hub.subscribe(|_| {});
        let _other = hub.subscribe(|_| {});
        assert_eq!(hub.subscriber_count(), 2);

        hub.clear();
        assert_eq!(hub.subscriber_count(), 0);
        assert!(!sub.unsubscribe());
    }
}
