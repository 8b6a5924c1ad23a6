//! Error types for weft-core.

use thiserror::Error;

use crate::graph::NodeId;

/// Result type for weft-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the reactive engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A context was popped while none had been pushed.
    #[error("context stack underflow: no tracking context to dispose")]
    StackUnderflow,

    /// A node tried to evaluate while its own evaluation was still running.
    #[error("cycle detected: node {0} re-entered its own evaluation")]
    CycleDetected(NodeId),

    /// A watch window was closed while another owner's context was active.
    #[error("context mismatch: expected owner {expected}, found {}", found.map(|id| id.to_string()).unwrap_or_else(|| "none".to_string()))]
    ContextMismatch {
        expected: NodeId,
        found: Option<NodeId>,
    },

    /// A computed cell has no value yet (pending or suppressed first evaluation).
    #[error("computed {0} has no value yet")]
    Unresolved(NodeId),

    /// A computed cell was disposed before it ever produced a value.
    #[error("computed {0} is disposed")]
    Disposed(NodeId),

    /// A fallible or asynchronous compute function failed.
    #[error("compute failed: {0}")]
    Compute(String),

    /// An asynchronous compute result was produced outside a tokio runtime.
    #[error("no async runtime available to resolve computed {0}")]
    NoRuntime(NodeId),

    /// An asynchronous compute result was produced on a multi-thread tokio
    /// runtime, where it could resolve concurrently with the thread driving
    /// the engine.
    #[error("computed {0} needs a current-thread tokio runtime to resolve on")]
    UnsupportedRuntime(NodeId),

    /// Engine configuration could not be parsed.
    #[error("invalid engine config: {0}")]
    Config(String),
}

impl Error {
    /// Build a [`Error::Compute`] from anything displayable.
    pub fn compute(message: impl std::fmt::Display) -> Self {
        Self::Compute(message.to_string())
    }
}
