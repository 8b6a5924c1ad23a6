//! Minimal node used by unit tests that do not need a full engine.

use std::sync::Arc;

use crate::reactive::{Subscriber, SubscriberId, SubscriberSet};

use super::node::{NodeId, NodeKind, NodeRef, ReactiveNode};

pub(crate) struct MockNode {
    id: NodeId,
    name: String,
    subscribers: SubscriberSet,
}

impl MockNode {
    pub(crate) fn new_ref(name: &str) -> NodeRef {
        Arc::new(Self {
            id: NodeId::new(),
            name: name.to_string(),
            subscribers: SubscriberSet::default(),
        })
    }
}

impl ReactiveNode for MockNode {
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
