//! Reactive Runtime
//!
//! The [`Engine`] is the coordinator that connects observables, computeds and
//! autoruns. It owns:
//!
//! - the node [`Registry`], to turn dependency ids back into nodes,
//! - the [`ContextStack`], to know which computation is currently reading,
//! - the [`ReactionGate`], to switch reactions off during bulk setup.
//!
//! Engines are independent of each other. A test (or an application with
//! several roots) can create as many as it likes; nothing is process-global
//! except the id counters.
//!
//! # Locking
//!
//! Engine state sits behind `parking_lot` locks so handles can cross into
//! spawned tasks, but the engine is meant to be driven by one logical thread
//! at a time. No lock is held while user code (a compute function or a
//! subscriber callback) runs.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::autorun::Disposer;
use super::context::{ContextSnapshot, ContextStack};
use super::gate::{ReactionGate, ResumeHandle};
use super::subscriber::{Subscriber, SubscriberId};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::graph::{NodeId, NodeInfo, NodeRef, Registry};

struct EngineInner {
    config: EngineConfig,
    registry: Registry,
    contexts: Mutex<ContextStack>,
    gate: ReactionGate,
}

/// Handle to a reactive engine. Cloning shares the same engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine with the default config.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        debug!(engine = %config.name, reactions_enabled = config.reactions_enabled, "engine created");
        let gate = ReactionGate::new(config.reactions_enabled);
        Self {
            inner: Arc::new(EngineInner {
                config,
                registry: Registry::new(),
                contexts: Mutex::new(ContextStack::new()),
                gate,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Whether two handles point at the same engine.
    pub fn ptr_eq(&self, other: &Engine) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub(crate) fn register(&self, node: &NodeRef) {
        trace!(engine = %self.name(), node = %node.id(), kind = ?node.kind(), "node registered");
        self.inner.registry.register(node);
    }

    pub(crate) fn unregister(&self, id: NodeId) {
        trace!(engine = %self.name(), node = %id, "node unregistered");
        self.inner.registry.unregister(id);
    }

    /// Snapshot of every live node, ordered by id.
    pub fn nodes(&self) -> Vec<NodeInfo> {
        self.inner.registry.infos()
    }

    // ------------------------------------------------------------------
    // Tracking contexts
    // ------------------------------------------------------------------

    /// Activate the tracking context of `owner`, suspending the current one.
    pub fn create_context(&self, owner: NodeId) -> Result<()> {
        self.inner.contexts.lock().create_context(owner).map(|_| ())
    }

    /// Return to the previously active tracking context.
    ///
    /// Popping more contexts than were pushed is a usage error and fails with
    /// [`Error::StackUnderflow`].
    pub fn dispose_context(&self) -> Result<()> {
        self.inner.contexts.lock().dispose_context()
    }

    /// Report that `node` was read. Recorded only while a context is active.
    pub fn report_read(&self, node: &NodeRef) {
        self.inner.contexts.lock().record_read(node);
    }

    /// Whether reads are currently being recorded.
    pub fn is_tracking(&self) -> bool {
        self.inner.contexts.lock().is_active()
    }

    /// Owner of the active context, if any.
    pub fn current_owner(&self) -> Option<NodeId> {
        self.inner.contexts.lock().current_owner()
    }

    /// Committed dependencies of `owner`, in first-read order.
    pub fn dependencies_of(&self, owner: NodeId) -> Vec<NodeId> {
        self.inner
            .contexts
            .lock()
            .context(owner)
            .map(|context| context.dependencies())
            .unwrap_or_default()
    }

    /// Start a tracked cycle for `owner`.
    ///
    /// The returned scope must be [finished](TrackingScope::finish); if it is
    /// dropped instead (error or panic in the tracked code), the context is
    /// rolled back to its state before the cycle and no subscription changes.
    pub(crate) fn track(&self, owner: NodeId) -> Result<TrackingScope<'_>> {
        let snapshot = self.inner.contexts.lock().create_context(owner)?.snapshot();
        Ok(TrackingScope {
            engine: self,
            owner,
            snapshot: Some(snapshot),
        })
    }

    /// Close the active cycle of `owner`: prune dependencies that were not
    /// read again, commit the new ones, and pop the context.
    ///
    /// With `attach_new`, `subscriber` is also attached to every new read.
    /// Returns the new reads either way.
    pub(crate) fn complete_cycle(
        &self,
        owner: NodeId,
        subscriber: &Subscriber,
        attach_new: bool,
    ) -> Result<Vec<NodeRef>> {
        let (committed, stale) = {
            let mut contexts = self.inner.contexts.lock();
            let found = contexts.current_owner();
            if found != Some(owner) {
                return Err(Error::ContextMismatch {
                    expected: owner,
                    found,
                });
            }
            let Some(context) = contexts.context_mut(owner) else {
                // Torn down while its cycle was open: nothing to commit, and
                // its dependencies are already detached.
                contexts.dispose_context()?;
                debug!(engine = %self.name(), owner = %owner, "tracking cycle closed after teardown");
                return Ok(Vec::new());
            };

            let mut stale = Vec::new();
            context.reconcile_unconfirmed(|id| stale.push(id));
            let committed = context.commit();
            contexts.dispose_context()?;
            (committed, stale)
        };

        if attach_new {
            for node in &committed {
                node.subscribe(subscriber);
            }
        }
        self.detach(&stale, subscriber.id());

        debug!(
            engine = %self.name(),
            owner = %owner,
            added = committed.len(),
            removed = stale.len(),
            "tracking cycle complete"
        );
        Ok(committed)
    }

    /// Undo a cycle of `owner` that did not complete.
    ///
    /// Contexts the tracked code pushed and never popped are discarded along
    /// with it.
    fn abort_cycle(&self, owner: NodeId, snapshot: ContextSnapshot) {
        let (discarded, unwound) = {
            let mut contexts = self.inner.contexts.lock();
            let discarded = contexts
                .context_mut(owner)
                .map(|context| context.restore(snapshot))
                .unwrap_or_default();
            (discarded, contexts.unwind_to(owner))
        };
        if let Some(stray) = unwound.filter(|&stray| stray > 0) {
            warn!(
                engine = %self.name(),
                owner = %owner,
                stray,
                "unbalanced tracking contexts discarded"
            );
        }
        debug!(
            engine = %self.name(),
            owner = %owner,
            discarded = discarded.len(),
            "tracking cycle rolled back"
        );
    }

    /// Remove `subscriber` from each of the given nodes that is still alive.
    pub(crate) fn detach(&self, ids: &[NodeId], subscriber: SubscriberId) {
        for &id in ids {
            if let Some(node) = self.inner.registry.resolve(id) {
                node.unsubscribe(subscriber);
            }
        }
    }

    /// Drop everything `owner` tracks: detach `subscriber` from each committed
    /// dependency and forget the cached context.
    pub(crate) fn teardown(&self, owner: NodeId, subscriber: SubscriberId) {
        let context = self.inner.contexts.lock().forget(owner);
        if let Some(context) = context {
            let dependencies = context.dependencies();
            self.detach(&dependencies, subscriber);
            debug!(engine = %self.name(), owner = %owner, removed = dependencies.len(), "owner torn down");
        }
    }

    // ------------------------------------------------------------------
    // Reaction gate
    // ------------------------------------------------------------------

    pub(crate) fn gate(&self) -> &ReactionGate {
        &self.inner.gate
    }

    pub fn reactions_enabled(&self) -> bool {
        self.inner.gate.is_enabled()
    }

    /// Disable reactions until the returned handle is resumed.
    ///
    /// If reactions are already disabled the handle is a no-op: the gate
    /// does not nest.
    pub fn disable_reactions(&self) -> ResumeHandle {
        if self.inner.gate.close() {
            debug!(engine = %self.name(), "reactions disabled");
            ResumeHandle::active(self.clone())
        } else {
            ResumeHandle::noop()
        }
    }

    // ------------------------------------------------------------------
    // Manual subscriptions
    // ------------------------------------------------------------------

    /// Run `callback` once, tracking what it reads, and call it again whenever
    /// any of that changes.
    ///
    /// Later runs call `callback` directly and do not re-track; hosts that
    /// need the dependency set refreshed use [`start_watch`](Self::start_watch)
    /// and [`stop_watch`](Self::stop_watch) around their own execution.
    pub fn autorun<F>(&self, callback: F) -> Result<Disposer>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Disposer::run(self, callback)
    }

    /// Open a watch window: reads are recorded for `disposer` until
    /// [`stop_watch`](Self::stop_watch).
    pub fn start_watch(&self, disposer: &Disposer) -> Result<()> {
        self.create_context(disposer.owner())
    }

    /// Close the watch window of `disposer`.
    ///
    /// Dependencies not read during the window lose the callback. Returns the
    /// nodes read for the first time; they are not subscribed here, and the
    /// disposer's tracked list is unchanged. Pass them to
    /// [`extend_subscription`](Self::extend_subscription) to subscribe.
    pub fn stop_watch(&self, disposer: &Disposer) -> Result<Vec<NodeRef>> {
        self.complete_cycle(disposer.owner(), disposer.subscriber(), false)
    }

    /// Subscribe the disposer's callback to `reads` and add them to its
    /// tracked list.
    pub fn extend_subscription(&self, disposer: &Disposer, reads: impl IntoIterator<Item = NodeRef>) {
        disposer.extend(reads);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name())
            .field("nodes", &self.inner.registry.len())
            .field("reactions_enabled", &self.reactions_enabled())
            .finish()
    }
}

/// An open tracked cycle. See [`Engine::track`].
pub(crate) struct TrackingScope<'a> {
    engine: &'a Engine,
    owner: NodeId,
    snapshot: Option<ContextSnapshot>,
}

impl TrackingScope<'_> {
    /// Complete the cycle, attaching `subscriber` to new reads and detaching
    /// it from dropped ones.
    ///
    /// If the cycle cannot be completed (another context was left active on
    /// top of it), it is rolled back as if dropped.
    pub(crate) fn finish(mut self, subscriber: &Subscriber) -> Result<Vec<NodeRef>> {
        let committed = self.engine.complete_cycle(self.owner, subscriber, true)?;
        self.snapshot = None;
        Ok(committed)
    }
}

impl Drop for TrackingScope<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.engine.abort_cycle(self.owner, snapshot);
        }
    }
}
