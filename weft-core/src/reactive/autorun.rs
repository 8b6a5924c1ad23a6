//! Autorun Implementation
//!
//! An autorun is a callback that runs once immediately, remembers which nodes
//! it read, and runs again whenever one of them changes.
//!
//! # How Autoruns Work
//!
//! 1. [`Engine::autorun`] gives the callback a fresh owner id and runs it
//!    inside that owner's tracking context.
//!
//! 2. Every node read during that first run gets the callback as a
//!    subscriber.
//!
//! 3. On change, the node calls the callback directly. That later run is not
//!    tracked, so the dependency set stays as it was after step 2 unless the
//!    host refreshes it.
//!
//! # Watch windows
//!
//! Hosts that execute the tracked code themselves (a render pipeline, say)
//! bracket that execution with [`Engine::start_watch`] and
//! [`Engine::stop_watch`], then hand the returned reads to
//! [`Engine::extend_subscription`]. The window prunes dependencies that were
//! not read again.
//!
//! # Lifetime
//!
//! The callback stays subscribed until [`Disposer::dispose`] is called;
//! dropping the disposer does not unsubscribe. A callback that captures the
//! nodes it reads forms a reference cycle with them until disposed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::runtime::Engine;
use super::subscriber::{Subscriber, SubscriberId};
use crate::error::Result;
use crate::graph::{NodeId, NodeRef};

struct DisposerInner {
    engine: Engine,
    owner: NodeId,
    subscriber: Subscriber,
    tracked: Mutex<Vec<NodeRef>>,
    disposed: Arc<AtomicBool>,
}

/// Handle to an autorun. Cloning shares the same autorun.
#[derive(Clone)]
pub struct Disposer {
    inner: Arc<DisposerInner>,
}

impl Disposer {
    pub(crate) fn run<F>(engine: &Engine, callback: F) -> Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let owner = NodeId::new();
        let disposed = Arc::new(AtomicBool::new(false));

        // A notification pass snapshots its subscribers, so a disposed
        // callback can still be reached once; the flag stops it there.
        let subscriber = {
            let disposed = disposed.clone();
            Subscriber::new(move || {
                if !disposed.load(Ordering::SeqCst) {
                    callback();
                }
            })
        };

        let scope = engine.track(owner)?;
        subscriber.notify();
        let tracked = scope.finish(&subscriber)?;

        debug!(engine = %engine.name(), owner = %owner, dependencies = tracked.len(), "autorun started");

        Ok(Self {
            inner: Arc::new(DisposerInner {
                engine: engine.clone(),
                owner,
                subscriber,
                tracked: Mutex::new(tracked),
                disposed,
            }),
        })
    }

    /// Id of the tracking context this autorun owns.
    pub fn owner(&self) -> NodeId {
        self.inner.owner
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber.id()
    }

    pub(crate) fn subscriber(&self) -> &Subscriber {
        &self.inner.subscriber
    }

    /// Ids of the nodes the callback is attached to, in tracking order.
    pub fn tracked(&self) -> Vec<NodeId> {
        self.inner.tracked.lock().iter().map(|node| node.id()).collect()
    }

    pub(crate) fn extend(&self, reads: impl IntoIterator<Item = NodeRef>) {
        if self.is_disposed() {
            return;
        }
        let mut added = 0;
        for node in reads {
            node.subscribe(&self.inner.subscriber);
            let mut tracked = self.inner.tracked.lock();
            if !tracked.iter().any(|known| known.id() == node.id()) {
                tracked.push(node);
                added += 1;
            }
        }
        debug!(owner = %self.inner.owner, added, "subscription extended");
    }

    /// Detach the callback from everything it tracks. Idempotent.
    ///
    /// Nodes stay registered with the engine. Disposing inside an open watch
    /// window is allowed; [`Engine::stop_watch`] still closes the window and
    /// returns no reads.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let tracked = std::mem::take(&mut *self.inner.tracked.lock());
        for node in &tracked {
            node.unsubscribe(self.inner.subscriber.id());
        }
        self.inner
            .engine
            .teardown(self.inner.owner, self.inner.subscriber.id());
        debug!(owner = %self.inner.owner, removed = tracked.len(), "autorun disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("owner", &self.inner.owner)
            .field("tracked", &self.tracked())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
