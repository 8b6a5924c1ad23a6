//! Reactive Primitives
//!
//! This module implements the core reactive system: observables, computeds
//! and autoruns, plus the tracking machinery that wires them together.
//!
//! # Concepts
//!
//! ## Observables
//!
//! An Observable is a container for mutable state. Reading it while a
//! tracking context is active records it as a dependency of that context's
//! owner. Writing it calls every subscriber.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It evaluates on first
//! read and afterwards only when something it read last time changes. Its
//! compute function may finish synchronously, fail, or hand back a future.
//!
//! ## Autoruns
//!
//! An autorun is a callback subscribed to whatever it read on its first run.
//! Hosts can refresh that set with watch windows.
//!
//! # Implementation Notes
//!
//! Dependencies are found by recording reads in the engine's active
//! [`TrackingContext`]. Each context keeps a mark per dependency so that
//! after a cycle only the difference against the previous cycle is applied:
//! new reads get subscribed, dependencies not read again get unsubscribed.
//!
//! All of this state lives in an [`Engine`] value rather than in globals, so
//! independent engines never see each other's reads.

mod autorun;
mod computed;
mod context;
mod gate;
mod observable;
mod runtime;
mod subscriber;

pub use autorun::Disposer;
pub use computed::{BoxFuture, Computation, Computed, ComputedState};
pub use context::{ContextSnapshot, ContextStack, DependencyMark, TrackingContext};
pub use gate::{ReactionGate, ResumeHandle};
pub use observable::Observable;
pub use runtime::Engine;
pub use subscriber::{Subscriber, SubscriberId};

#[cfg(test)]
pub(crate) use subscriber::SubscriberSet;
