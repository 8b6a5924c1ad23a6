//! Tracking Contexts
//!
//! A tracking context records which nodes a computation read during one
//! evaluation cycle and diffs that against what it read the cycle before.
//!
//! # The cycle
//!
//! Each dependency the owner is subscribed to carries a mark:
//!
//! - `Pending`: subscribed as of the end of the previous cycle, not read yet
//!   in this one.
//! - `Confirmed`: read during this cycle.
//!
//! A cycle runs in three phases:
//!
//! 1. [`add`](TrackingContext::add) for every read. Known dependencies flip
//!    to `Confirmed`. Unknown ones go on the `new_reads` list, which is
//!    exactly the set the owner must subscribe to.
//! 2. [`reconcile_unconfirmed`](TrackingContext::reconcile_unconfirmed).
//!    Anything still `Pending` was not read this time: it is handed to the
//!    visitor (which unsubscribes) and dropped. `Confirmed` resets to
//!    `Pending`.
//! 3. [`commit`](TrackingContext::commit). New reads become `Pending`.
//!
//! The result is subscribe(current - previous) and unsubscribe(previous -
//! current) without materialising either set. After a cycle, no mark is left
//! `Confirmed`.
//!
//! # Stack
//!
//! Contexts are cached per owner in a [`ContextStack`] and reused across
//! cycles. Nested evaluations (a computed reading a computed that has never
//! run) push a new context and pop back to the outer one when done. Only the
//! top of the stack records reads.

use std::collections::HashMap;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::error::{Error, Result};
use crate::graph::{NodeId, NodeRef};

/// Per-dependency state inside a tracking context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyMark {
    /// Subscribed last cycle; not read yet this cycle.
    Pending,
    /// Read this cycle.
    Confirmed,
}

/// Saved marks of a context, taken before a cycle so a failed cycle can be
/// undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSnapshot {
    marks: IndexMap<NodeId, DependencyMark>,
}

/// Read-tracking bookkeeping for one owner.
pub struct TrackingContext {
    owner: NodeId,
    new_reads: SmallVec<[NodeRef; 8]>,
    marks: IndexMap<NodeId, DependencyMark>,
}

impl TrackingContext {
    /// Create an empty context for the given owner.
    pub fn new(owner: NodeId) -> Self {
        Self {
            owner,
            new_reads: SmallVec::new(),
            marks: IndexMap::new(),
        }
    }

    /// The node (or autorun) this context tracks for.
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    /// Record a read of `node`.
    pub fn add(&mut self, node: &NodeRef) {
        let id = node.id();
        if let Some(mark) = self.marks.get_mut(&id) {
            *mark = DependencyMark::Confirmed;
            return;
        }
        if self.new_reads.iter().any(|read| read.id() == id) {
            return;
        }
        trace!(owner = %self.owner, node = %id, "new dependency read");
        self.new_reads.push(node.clone());
    }

    /// Nodes read for the first time this cycle, in read order.
    pub fn new_reads(&self) -> &[NodeRef] {
        &self.new_reads
    }

    /// Visit and drop every dependency not confirmed this cycle, then reset
    /// the confirmed ones to pending.
    pub fn reconcile_unconfirmed(&mut self, mut visit: impl FnMut(NodeId)) {
        self.marks.retain(|id, mark| match mark {
            DependencyMark::Pending => {
                visit(*id);
                false
            }
            DependencyMark::Confirmed => {
                *mark = DependencyMark::Pending;
                true
            }
        });
    }

    /// Start tracking this cycle's new reads as pending dependencies.
    ///
    /// Returns the committed nodes. Callers holding the engine lock must drop
    /// them only after releasing it, since a node's teardown takes that lock.
    pub fn commit(&mut self) -> Vec<NodeRef> {
        let committed: Vec<NodeRef> = self.new_reads.drain(..).collect();
        for node in &committed {
            self.marks.insert(node.id(), DependencyMark::Pending);
        }
        committed
    }

    /// Current mark of a dependency, if it is one.
    pub fn mark(&self, id: NodeId) -> Option<DependencyMark> {
        self.marks.get(&id).copied()
    }

    /// Ids of all tracked dependencies, in the order they were first read.
    pub fn dependencies(&self) -> Vec<NodeId> {
        self.marks.keys().copied().collect()
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            marks: self.marks.clone(),
        }
    }

    /// Put the marks back to `snapshot` and forget this cycle's new reads,
    /// returning them.
    pub fn restore(&mut self, snapshot: ContextSnapshot) -> Vec<NodeRef> {
        self.marks = snapshot.marks;
        self.new_reads.drain(..).collect()
    }
}

impl std::fmt::Debug for TrackingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingContext")
            .field("owner", &self.owner)
            .field("new_reads", &self.new_reads.len())
            .field("marks", &self.marks)
            .finish()
    }
}

/// Stack of active tracking contexts plus the per-owner context cache.
#[derive(Debug, Default)]
pub struct ContextStack {
    /// Previously active owners, innermost last. `None` means "no context".
    stack: Vec<Option<NodeId>>,
    current: Option<NodeId>,
    cache: HashMap<NodeId, TrackingContext>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate the (cached or fresh) context of `owner`.
    ///
    /// Fails with [`Error::CycleDetected`] if that context is already active
    /// or suspended further down the stack: reusing it mid-cycle would corrupt
    /// its marks.
    pub fn create_context(&mut self, owner: NodeId) -> Result<&mut TrackingContext> {
        if self.current == Some(owner) || self.stack.contains(&Some(owner)) {
            return Err(Error::CycleDetected(owner));
        }
        self.stack.push(self.current);
        self.current = Some(owner);
        Ok(self
            .cache
            .entry(owner)
            .or_insert_with(|| TrackingContext::new(owner)))
    }

    /// Return to the previously active context.
    pub fn dispose_context(&mut self) -> Result<()> {
        let previous = self.stack.pop().ok_or(Error::StackUnderflow)?;
        self.current = previous;
        Ok(())
    }

    /// Pop every context pushed above `owner`, then `owner` itself.
    ///
    /// Returns how many contexts above `owner` were discarded, or `None` (and
    /// leaves the stack alone) if `owner` is neither active nor suspended.
    pub fn unwind_to(&mut self, owner: NodeId) -> Option<usize> {
        if self.current != Some(owner) && !self.stack.contains(&Some(owner)) {
            return None;
        }
        let mut discarded = 0;
        while self.current != Some(owner) {
            self.current = self.stack.pop()?;
            discarded += 1;
        }
        self.current = self.stack.pop()?;
        Some(discarded)
    }

    /// Report a read to the active context. No-op if none is active.
    pub fn record_read(&mut self, node: &NodeRef) {
        if let Some(context) = self.current_mut() {
            context.add(node);
        }
    }

    pub fn current_owner(&self) -> Option<NodeId> {
        self.current
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&TrackingContext> {
        self.current.and_then(|owner| self.cache.get(&owner))
    }

    pub fn current_mut(&mut self) -> Option<&mut TrackingContext> {
        let owner = self.current?;
        self.cache.get_mut(&owner)
    }

    /// Cached context of `owner`, active or not.
    pub fn context(&self, owner: NodeId) -> Option<&TrackingContext> {
        self.cache.get(&owner)
    }

    pub fn context_mut(&mut self, owner: NodeId) -> Option<&mut TrackingContext> {
        self.cache.get_mut(&owner)
    }

    /// Drop the cached context of `owner`, returning it.
    pub fn forget(&mut self, owner: NodeId) -> Option<TrackingContext> {
        self.cache.remove(&owner)
    }

    /// Number of suspended entries below the active context.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}
