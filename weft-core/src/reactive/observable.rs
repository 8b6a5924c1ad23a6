//! Observable Implementation
//!
//! An Observable is the primitive mutable reactive cell. It holds a value and
//! the set of subscribers to call when that value is replaced.
//!
//! # How Observables Work
//!
//! 1. [`read`](Observable::read) reports the observable to the engine's
//!    active tracking context, if there is one, and returns the value.
//!
//! 2. [`write`](Observable::write) replaces the value and, if reactions are
//!    enabled, calls every subscriber.
//!
//! Writes always notify, even when the new value equals the old one; there is
//! no equality check.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::runtime::Engine;
use super::subscriber::{Subscriber, SubscriberId, SubscriberSet};
use crate::graph::{NodeId, NodeKind, NodeRef, ReactiveNode};

struct ObservableInner<T> {
    id: NodeId,
    name: String,
    engine: Engine,
    value: RwLock<T>,
    subscribers: SubscriberSet,
}

impl<T> ReactiveNode for ObservableInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Observable
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe(&self, subscriber: &Subscriber) {
        self.subscribers.insert(subscriber);
    }

    fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.remove(id);
    }

    fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.subscribers.contains(id)
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<T> Drop for ObservableInner<T> {
    fn drop(&mut self) {
        self.engine.unregister(self.id);
    }
}

/// A mutable reactive cell holding a value of type T.
///
/// Cloning an `Observable` creates a new handle to the **same** cell.
///
/// # Example
///
/// ```rust
/// use weft_core::reactive::{Engine, Observable};
///
/// let engine = Engine::new();
/// let count = Observable::new(&engine, "count", 0);
///
/// assert_eq!(count.read(), 0);
/// count.write(5);
/// assert_eq!(count.read(), 5);
/// ```
pub struct Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ObservableInner<T>>,
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an observable and register it with `engine`.
    pub fn new(engine: &Engine, name: impl Into<String>, value: T) -> Self {
        let inner = Arc::new(ObservableInner {
            id: NodeId::new(),
            name: name.into(),
            engine: engine.clone(),
            value: RwLock::new(value),
            subscribers: SubscriberSet::default(),
        });
        let observable = Self { inner };
        engine.register(&observable.node());
        observable
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Type-erased handle to this cell.
    pub fn node(&self) -> NodeRef {
        self.inner.clone()
    }

    /// Get the current value, recording the read in the active tracking
    /// context.
    pub fn read(&self) -> T {
        self.inner.engine.report_read(&self.node());
        self.peek()
    }

    /// Get the current value without tracking.
    pub fn peek(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Replace the value and notify subscribers.
    ///
    /// The value is stored even while reactions are disabled; only the
    /// notification is skipped.
    pub fn write(&self, value: T) {
        *self.inner.value.write() = value;

        if self.inner.engine.reactions_enabled() {
            trace!(node = %self.inner.id, name = %self.inner.name, "observable changed");
            self.inner.subscribers.notify_all();
        }
    }

    /// Write a value computed from the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let guard = self.inner.value.read();
            f(&*guard)
        };
        self.write(next);
    }

    /// Attach a subscriber. Idempotent.
    pub fn subscribe(&self, subscriber: &Subscriber) {
        self.inner.subscribe(subscriber);
    }

    /// Detach a subscriber. Idempotent.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.unsubscribe(id);
    }

    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.inner.has_subscriber(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }
}

impl<T> Clone for Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Observable<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
