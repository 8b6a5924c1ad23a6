//! Subscriber types for the reactive system.
//!
//! A Subscriber is a callback attached to a node. Membership is keyed by the
//! subscriber's [`SubscriberId`], never by comparing closures, so the same
//! computation always maps to the same entry no matter how often it is
//! re-subscribed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

/// Unique identifier for a subscriber.
///
/// Each computed cell and each autorun gets one id for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A callback that runs when a node it is attached to changes.
///
/// Cloning shares the callback and keeps the id.
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    notify: Arc<dyn Fn() + Send + Sync>,
}

impl Subscriber {
    /// Create a new subscriber with the given notification callback.
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id: SubscriberId::new(),
            notify: Arc::new(notify),
        }
    }

    /// Get the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Notify the subscriber that one of its dependencies changed.
    pub fn notify(&self) {
        (self.notify)();
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}

/// Insertion-ordered subscriber set of a single node.
#[derive(Default)]
pub(crate) struct SubscriberSet {
    entries: Mutex<IndexMap<SubscriberId, Subscriber>>,
}

impl SubscriberSet {
    pub(crate) fn insert(&self, subscriber: &Subscriber) {
        self.entries
            .lock()
            .entry(subscriber.id())
            .or_insert_with(|| subscriber.clone());
    }

    pub(crate) fn remove(&self, id: SubscriberId) {
        // shift_remove keeps the notification order of the others. The removed
        // callback is dropped after the lock is released.
        let removed = self.entries.lock().shift_remove(&id);
        drop(removed);
    }

    pub(crate) fn contains(&self, id: SubscriberId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Notify every subscriber present when the call started.
    ///
    /// Callbacks run with the lock released, so they may freely subscribe or
    /// unsubscribe; those changes take effect from the next pass.
    pub(crate) fn notify_all(&self) {
        let snapshot: Vec<Subscriber> = self.entries.lock().values().cloned().collect();
        for subscriber in snapshot {
            subscriber.notify();
        }
    }
}
