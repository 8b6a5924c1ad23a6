//! Node Registry
//!
//! Maps node ids back to live nodes. The tracking context only remembers ids
//! for dependencies it already subscribed to, so pruning a stale dependency
//! goes through here.
//!
//! Entries are weak: the registry never keeps a node alive. A node removes its
//! own entry when its last handle is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::node::{NodeId, NodeInfo, NodeRef, ReactiveNode};

/// Id-to-node lookup table owned by an engine.
#[derive(Default)]
pub struct Registry {
    nodes: RwLock<HashMap<NodeId, Weak<dyn ReactiveNode>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node under its own id.
    pub fn register(&self, node: &NodeRef) {
        self.nodes.write().insert(node.id(), Arc::downgrade(node));
    }

    /// Remove a node. Missing ids are ignored.
    pub fn unregister(&self, id: NodeId) {
        self.nodes.write().remove(&id);
    }

    /// Resolve an id to a live node.
    pub fn resolve(&self, id: NodeId) -> Option<NodeRef> {
        self.nodes.read().get(&id).and_then(Weak::upgrade)
    }

    /// Whether an id is registered (live or not yet cleaned up).
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.read().contains_key(&id)
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Snapshot every live node, ordered by id.
    pub fn infos(&self) -> Vec<NodeInfo> {
        // Upgrade under the lock, inspect after releasing it.
        let live: Vec<NodeRef> = self.nodes.read().values().filter_map(Weak::upgrade).collect();
        let mut infos: Vec<NodeInfo> = live.iter().map(|node| NodeInfo::of(node.as_ref())).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::mock::MockNode;

    #[test]
    fn registers_and_resolves() {
        let registry = Registry::new();
        let node: NodeRef = MockNode::new_ref("mock");
        let id = node.id();

        registry.register(&node);
        assert!(registry.contains(id));
        assert_eq!(registry.resolve(id).map(|n| n.id()), Some(id));

        registry.unregister(id);
        assert!(!registry.contains(id));
        assert!(registry.resolve(id).is_none());
    }

    #[test]
    fn does_not_keep_nodes_alive() {
        let registry = Registry::new();
        let node: NodeRef = MockNode::new_ref("mock");
        let id = node.id();

        registry.register(&node);
        drop(node);

        assert!(registry.resolve(id).is_none());
        assert!(registry.infos().is_empty());
    }
}
