//! Computed Implementation
//!
//! A Computed is a lazily evaluated derived value. It is both a consumer
//! (it reads other nodes while computing) and a producer (other computations
//! read it).
//!
//! # How Computeds Work
//!
//! 1. Nothing runs at construction. The first [`read`](Computed::read)
//!    evaluates the compute function inside the computed's own tracking
//!    context.
//!
//! 2. After evaluating, the computed's re-evaluation subscriber is attached
//!    to everything read for the first time and detached from everything not
//!    read again.
//!
//! 3. From then on only upstream notifications re-evaluate it. Reads just
//!    return the cached value.
//!
//! 4. Each evaluation that produces a value notifies the computed's own
//!    subscribers.
//!
//! The compute function receives the previous cached value, which makes
//! accumulator-style computations possible.
//!
//! # Failures
//!
//! - **Compute function fails** (an `Err`, or a panic): the tracking context
//!   is rolled back to how it was before the evaluation, so subscriptions are
//!   exactly those of the last good cycle. The cached value stays. The error
//!   goes to the caller of `read`/`evaluate`, or, for evaluations triggered by
//!   an upstream change, into [`last_error`](Computed::last_error).
//! - **Re-entrant evaluation**: a computed whose evaluation reads itself, or
//!   triggers its own re-evaluation, fails with
//!   [`Error::CycleDetected`] instead of reusing its half-built context.
//!
//! # Asynchronous results
//!
//! A compute function may return a future. The evaluation then completes its
//! dependency bookkeeping right away, leaves the cached value as it is and
//! spawns the future on the current tokio runtime. Every evaluation bumps a
//! generation counter; a resolution is applied only if no newer evaluation (or
//! manual write, or disposal) happened in the meantime.
//!
//! The runtime must be a current-thread one, so that resolutions run on the
//! thread driving the engine and never interleave with an evaluation in
//! progress. On a multi-thread runtime the evaluation fails with
//! [`Error::UnsupportedRuntime`]; wrap the reactive part of the program in a
//! current-thread runtime instead.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::RuntimeFlavor;
use tracing::{debug, trace, warn};

use super::runtime::Engine;
use super::subscriber::{Subscriber, SubscriberId, SubscriberSet};
use crate::error::{Error, Result};
use crate::graph::{NodeId, NodeKind, NodeRef, ReactiveNode};

/// Boxed future produced by an asynchronous compute function.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

/// What one run of a compute function produced.
pub enum Computation<T> {
    /// A value, available now.
    Ready(T),
    /// A synchronous failure. The evaluation is rolled back.
    Failed(Error),
    /// A value that will be available later.
    Deferred(BoxFuture<T>),
}

impl<T> From<Result<T>> for Computation<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Computation::Ready(value),
            Err(err) => Computation::Failed(err),
        }
    }
}

/// Resolution state of a computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputedState {
    /// Never evaluated (or disposed while pending).
    Idle,

    /// Waiting for an asynchronous result from the given evaluation.
    Pending { generation: u64 },

    /// The cached value is the result of the latest evaluation or write.
    Resolved,

    /// The latest evaluation failed. Any cached value is from before it.
    Failed(Error),
}

type ComputeFn<T> = Box<dyn Fn(Option<T>) -> Computation<T> + Send + Sync>;

/// Successful outcome of the tracked part of an evaluation.
enum Produced<T> {
    Ready(T),
    Deferred(BoxFuture<T>),
}

struct ComputedInner<T> {
    id: NodeId,
    name: String,
    engine: Engine,
    this: Weak<ComputedInner<T>>,
    compute: ComputeFn<T>,
    value: RwLock<Option<T>>,
    state: Mutex<ComputedState>,
    last_error: Mutex<Option<Error>>,
    subscribers: SubscriberSet,

    /// Attached to every dependency. Same id for the whole lifetime, so
    /// repeated subscriptions collapse into one entry.
    reevaluate: Subscriber,

    subscribed: AtomicBool,
    evaluating: AtomicBool,
    disposed: AtomicBool,
    generation: AtomicU64,
}

/// Clears the evaluation-in-progress flag when the tracked part ends, even by
/// unwinding.
struct EvaluationMarker<'a>(&'a AtomicBool);

impl Drop for EvaluationMarker<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T> ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn evaluate(&self) -> Result<()> {
        if !self.engine.reactions_enabled() {
            trace!(node = %self.id, "evaluation skipped, reactions disabled");
            return Ok(());
        }
        if self.disposed.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.evaluating.swap(true, Ordering::SeqCst) {
            let err = Error::CycleDetected(self.id);
            self.record_error(&err);
            return Err(err);
        }

        let outcome = {
            let _marker = EvaluationMarker(&self.evaluating);
            *self.last_error.lock() = None;
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.run_tracked().map(|produced| (generation, produced))
        };

        let result = match outcome {
            Ok((_, Produced::Ready(value))) => {
                self.subscribed.store(true, Ordering::SeqCst);
                self.publish(value);
                Ok(())
            }
            Ok((generation, Produced::Deferred(future))) => {
                self.subscribed.store(true, Ordering::SeqCst);
                self.spawn_resolution(generation, future)
            }
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            self.record_error(err);
        }
        result
    }

    /// Run the compute function inside this node's tracking context.
    fn run_tracked(&self) -> Result<Produced<T>> {
        let scope = self.engine.track(self.id)?;
        let previous = self.value.read().clone();

        // Returning early drops the scope, which rolls the context back.
        let produced = match (self.compute)(previous) {
            Computation::Ready(value) => Produced::Ready(value),
            Computation::Deferred(future) => Produced::Deferred(future),
            Computation::Failed(err) => return Err(err),
        };

        scope.finish(&self.reevaluate)?;
        Ok(produced)
    }

    fn spawn_resolution(&self, generation: u64, future: BoxFuture<T>) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime(self.id))?;
        if !matches!(handle.runtime_flavor(), RuntimeFlavor::CurrentThread) {
            return Err(Error::UnsupportedRuntime(self.id));
        }
        *self.state.lock() = ComputedState::Pending { generation };

        let this = self.this.clone();
        handle.spawn(async move {
            let result = future.await;
            if let Some(inner) = this.upgrade() {
                inner.resolve(generation, result);
            }
        });
        debug!(node = %self.id, name = %self.name, generation, "async evaluation pending");
        Ok(())
    }

    fn resolve(&self, generation: u64, result: Result<T>) {
        let current = self.generation.load(Ordering::SeqCst);
        if self.disposed.load(Ordering::SeqCst) || current != generation {
            debug!(node = %self.id, generation, current, "stale async result dropped");
            return;
        }
        match result {
            Ok(value) => self.publish(value),
            Err(err) => {
                warn!(node = %self.id, name = %self.name, error = %err, "async evaluation failed");
                self.record_error(&err);
            }
        }
    }

    /// Store a new value and notify subscribers.
    fn publish(&self, value: T) {
        *self.value.write() = Some(value);
        *self.state.lock() = ComputedState::Resolved;

        if self.engine.reactions_enabled() {
            trace!(node = %self.id, name = %self.name, "computed changed");
            self.subscribers.notify_all();
        }
    }

    fn record_error(&self, err: &Error) {
        *self.state.lock() = ComputedState::Failed(err.clone());
        *self.last_error.lock() = Some(err.clone());
    }

    /// Upstream notification entry point. Errors have nowhere to go but the
    /// node's own state and the log.
    fn on_dependency_changed(&self) {
        if let Err(err) = self.evaluate() {
            warn!(node = %self.id, name = %self.name, error = %err, "re-evaluation failed");
        }
    }
}

impl<T> ReactiveNode for ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Computed
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

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.engine.teardown(self.id, self.reevaluate.id());
        self.engine.unregister(self.id);
    }
}

/// A cached derived value, re-evaluated when what it read changes.
///
/// Cloning a `Computed` creates a new handle to the **same** cell.
///
/// # Example
///
/// ```rust
/// use weft_core::reactive::{Computed, Engine, Observable};
///
/// let engine = Engine::new();
/// let count = Observable::new(&engine, "count", 0);
/// let doubled = Computed::new(&engine, "doubled", {
///     let count = count.clone();
///     move |_| count.read() * 2
/// });
///
/// assert_eq!(doubled.read().unwrap(), 0);
/// count.write(5);
/// assert_eq!(doubled.read().unwrap(), 10);
/// ```
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a computed from an infallible compute function.
    ///
    /// The function is not run until the first read.
    pub fn new<F>(engine: &Engine, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(Option<T>) -> T + Send + Sync + 'static,
    {
        Self::with_computation(engine, name, move |previous| {
            Computation::Ready(compute(previous))
        })
    }

    /// Create a computed from a fallible compute function.
    ///
    /// Use this when the computation reads other computeds, since
    /// [`read`](Self::read) can fail.
    pub fn try_new<F>(engine: &Engine, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(Option<T>) -> Result<T> + Send + Sync + 'static,
    {
        Self::with_computation(engine, name, move |previous| Computation::from(compute(previous)))
    }

    /// Create a computed whose value arrives asynchronously.
    ///
    /// Reads made by `compute` itself are tracked; reads made inside the
    /// returned future are not.
    pub fn new_async<F, Fut>(engine: &Engine, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(Option<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self::with_computation(engine, name, move |previous| {
            Computation::Deferred(Box::pin(compute(previous)))
        })
    }

    /// Create a computed from a function that decides per run whether its
    /// result is ready, failed or deferred.
    pub fn with_computation<F>(engine: &Engine, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(Option<T>) -> Computation<T> + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|this: &Weak<ComputedInner<T>>| {
            let reevaluate = {
                let this = this.clone();
                Subscriber::new(move || {
                    if let Some(inner) = this.upgrade() {
                        inner.on_dependency_changed();
                    }
                })
            };
            ComputedInner {
                id: NodeId::new(),
                name: name.into(),
                engine: engine.clone(),
                this: this.clone(),
                compute: Box::new(compute),
                value: RwLock::new(None),
                state: Mutex::new(ComputedState::Idle),
                last_error: Mutex::new(None),
                subscribers: SubscriberSet::default(),
                reevaluate,
                subscribed: AtomicBool::new(false),
                evaluating: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }
        });
        let computed = Self { inner };
        engine.register(&computed.node());
        computed
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

    /// Get the value, evaluating first if this computed has never run.
    ///
    /// The read is recorded in the active tracking context.
    pub fn read(&self) -> Result<T> {
        let inner = &self.inner;
        if inner.evaluating.load(Ordering::SeqCst) {
            return Err(Error::CycleDetected(inner.id));
        }
        inner.engine.report_read(&self.node());

        if !inner.subscribed.load(Ordering::SeqCst) {
            inner.evaluate()?;
        }

        self.peek().ok_or_else(|| {
            if inner.disposed.load(Ordering::SeqCst) {
                Error::Disposed(inner.id)
            } else {
                Error::Unresolved(inner.id)
            }
        })
    }

    /// Cached value, untracked and without evaluating.
    pub fn peek(&self) -> Option<T> {
        self.inner.value.read().clone()
    }

    /// Run the compute function now.
    ///
    /// A no-op while reactions are disabled or after disposal.
    pub fn evaluate(&self) -> Result<()> {
        self.inner.evaluate()
    }

    /// Override the cached value without recomputing, and notify subscribers.
    ///
    /// Any asynchronous result still in flight is discarded. A computed that
    /// has never been evaluated still evaluates on its first read.
    pub fn write(&self, value: T) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.publish(value);
    }

    /// Detach from all dependencies. The cached value stays readable; it just
    /// never changes again except through [`write`](Self::write).
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = inner.state.lock();
            if matches!(*state, ComputedState::Pending { .. }) {
                *state = ComputedState::Idle;
            }
        }
        inner.engine.teardown(inner.id, inner.reevaluate.id());
        debug!(node = %inner.id, name = %inner.name, "computed disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ComputedState {
        self.inner.state.lock().clone()
    }

    /// Most recent error seen by this computed.
    ///
    /// This is not tied to [`state`](Self::state): a re-entry rejected while
    /// an outer evaluation was running is kept here even though the outer
    /// evaluation went on to succeed. Cleared when the next evaluation starts.
    pub fn last_error(&self) -> Option<Error> {
        self.inner.last_error.lock().clone()
    }

    /// Number of evaluations, writes and disposals so far.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Whether the first evaluation has happened.
    pub fn is_subscribed(&self) -> bool {
        self.inner.subscribed.load(Ordering::SeqCst)
    }

    /// Id of the subscriber this computed attaches to its dependencies.
    pub fn reevaluation_id(&self) -> SubscriberId {
        self.inner.reevaluate.id()
    }

    /// Ids of the nodes this computed currently depends on.
    pub fn dependencies(&self) -> Vec<NodeId> {
        self.inner.engine.dependencies_of(self.inner.id)
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies().len()
    }

    /// Attach a subscriber. Idempotent.
    pub fn subscribe(&self, subscriber: &Subscriber) {
        self.inner.subscribe(subscriber);
    }

    /// Detach a subscriber. Idempotent.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.unsubscribe(id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("value", &self.peek())
            .field("state", &self.state())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
