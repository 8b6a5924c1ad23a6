//! Dependency Graph
//!
//! Node identity and lookup for the reactive engine.
//!
//! # Overview
//!
//! Edges are not stored centrally. Each node keeps its own subscriber set
//! (who to notify), and each tracking context keeps the ids its owner depends
//! on. The [`Registry`] closes the loop by turning a dependency id back into a
//! node when a stale subscription has to be removed.

mod node;
mod registry;
#[cfg(test)]
pub(crate) mod mock;

pub use node::{NodeId, NodeInfo, NodeKind, NodeRef, ReactiveNode};
pub use registry::Registry;
