//! Bounded, newest-first feed used for the activity log and alert queue
//!
//! A feed keeps at most `capacity` items. Inserting into a full feed evicts
//! the oldest item, strictly by arrival order.

use std::collections::VecDeque;

use serde::ser::{Serialize, SerializeSeq, Serializer};

// ----------------------------------------------------------------------------
// Bounded Feed
// ----------------------------------------------------------------------------

/// Fixed-capacity sequence ordered newest first
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedFeed<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedFeed<T> {
    /// Create an empty feed holding at most `capacity` items
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Most recently inserted item
    pub fn newest(&self) -> Option<&T> {
        self.items.front()
    }

    /// Oldest item still retained
    pub fn oldest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Iterate newest to oldest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// Insert at the front, returning the evicted oldest item if the feed
    /// was already full
    pub fn push_front(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        self.items.push_front(item);
        if self.items.len() > self.capacity {
            self.items.pop_back()
        } else {
            None
        }
    }
}

impl<T: Clone> BoundedFeed<T> {
    /// Copy of this feed with `item` inserted; `self` is left untouched
    pub fn with_pushed(&self, item: T) -> Self {
        let mut next = self.clone();
        next.push_front(item);
        next
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T: Serialize> Serialize for BoundedFeed<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.items.len()))?;
        for item in &self.items {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push_front_orders_newest_first() {
        let mut feed = BoundedFeed::new(3);
        feed.push_front("a");
        feed.push_front("b");
        assert_eq!(feed.to_vec(), vec!["b", "a"]);
        assert_eq!(feed.newest(), Some(&"b"));
        assert_eq!(feed.oldest(), Some(&"a"));
    }

    #[test]
    fn test_full_feed_evicts_oldest() {
        let mut feed = BoundedFeed::new(2);
        assert_eq!(feed.push_front(1), None);
        assert_eq!(feed.push_front(2), None);
        assert_eq!(feed.push_front(3), Some(1));
        assert_eq!(feed.to_vec(), vec![3, 2]);
    }

    #[test]
    fn test_with_pushed_leaves_original_intact() {
        let mut original = BoundedFeed::new(2);
        original.push_front(1);
        let next = original.with_pushed(2);
        assert_eq!(original.to_vec(), vec![1]);
        assert_eq!(next.to_vec(), vec![2, 1]);
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let mut feed = BoundedFeed::new(0);
        assert_eq!(feed.push_front("x"), Some("x"));
        assert!(feed.is_empty());
    }

    #[test]
    fn test_serializes_as_sequence() {
        let mut feed = BoundedFeed::new(4);
        feed.push_front(1);
        feed.push_front(2);
        assert_eq!(serde_json::to_string(&feed).unwrap(), "[2,1]");
    }

    proptest! {
        /// Property: a feed always holds the `capacity` most recent inserts,
        /// newest first
        #[test]
        fn feed_keeps_most_recent_items(
            capacity in 1usize..16,
            inserts in prop::collection::vec(any::<u32>(), 0..64),
        ) {
            let mut feed = BoundedFeed::new(capacity);
            for value in &inserts {
                feed.push_front(*value);
            }

            prop_assert!(feed.len() <= capacity);
            let expected: Vec<u32> = inserts.iter().rev().take(capacity).copied().collect();
            prop_assert_eq!(feed.to_vec(), expected);
        }
    }
}
