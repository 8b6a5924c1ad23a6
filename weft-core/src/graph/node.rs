//! Graph Nodes
//!
//! This module defines the identity and capabilities shared by every reactive
//! node (observables and computeds) in the dependency graph.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::reactive::{Subscriber, SubscriberId};

/// Unique identifier for a node in the dependency graph.
///
/// Ids come from one process-wide counter, so they are never reused, not even
/// across engines. Autorun owners draw from the same counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A mutable source cell. Only ever a dependency.
    Observable,

    /// A derived cell. Consumes dependencies and is itself one.
    Computed,
}

/// Capabilities every reactive node exposes to the engine.
///
/// Subscriber sets have set semantics keyed by [`SubscriberId`]: subscribing
/// the same id twice keeps one entry, unsubscribing an absent id is a no-op.
pub trait ReactiveNode: Send + Sync {
    /// The node's unique id.
    fn id(&self) -> NodeId;

    /// Whether this is an observable or a computed.
    fn kind(&self) -> NodeKind;

    /// Human-readable name given at construction.
    fn name(&self) -> &str;

    /// Add a subscriber. Idempotent.
    fn subscribe(&self, subscriber: &Subscriber);

    /// Remove a subscriber. Idempotent.
    fn unsubscribe(&self, id: SubscriberId);

    /// Whether the given subscriber is currently attached.
    fn has_subscriber(&self, id: SubscriberId) -> bool;

    /// Number of attached subscribers.
    fn subscriber_count(&self) -> usize;
}

/// Shared handle to a type-erased node.
pub type NodeRef = Arc<dyn ReactiveNode>;

/// Serializable snapshot of a node, for debugging dumps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    pub subscribers: usize,
}

impl NodeInfo {
    /// Capture the current state of a node.
    pub fn of(node: &dyn ReactiveNode) -> Self {
        Self {
            id: node.id(),
            kind: node.kind(),
            name: node.name().to_string(),
            subscribers: node.subscriber_count(),
        }
    }
}
