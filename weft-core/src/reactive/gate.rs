//! Reaction Gate
//!
//! A single switch that suppresses reactions while a host sets up state in
//! bulk. While the gate is closed:
//!
//! - observable writes store the value but notify nobody,
//! - computed evaluation is skipped and the cached value goes stale.
//!
//! Nothing is queued: changes made while closed are simply not reacted to.
//! Reads are never affected.
//!
//! The gate is a plain boolean, not a counter. Disabling an already-disabled
//! gate hands back a no-op [`ResumeHandle`], so only the caller that actually
//! closed it can reopen it. Callers that need overlapping windows have to
//! coordinate among themselves.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::runtime::Engine;

/// The enabled/disabled flag itself.
#[derive(Debug)]
pub struct ReactionGate {
    enabled: AtomicBool,
}

impl ReactionGate {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Close the gate. Returns false if it was already closed.
    pub(crate) fn close(&self) -> bool {
        self.enabled.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn open(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }
}

impl Default for ReactionGate {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Returned by [`Engine::disable_reactions`]; reopens the gate on
/// [`resume`](ResumeHandle::resume).
///
/// Dropping the handle without resuming leaves the gate closed.
#[must_use = "the gate stays disabled until `resume` is called"]
#[derive(Debug)]
pub struct ResumeHandle {
    engine: Option<Engine>,
}

impl ResumeHandle {
    pub(crate) fn active(engine: Engine) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    pub(crate) fn noop() -> Self {
        Self { engine: None }
    }

    /// Whether resuming will actually reopen the gate.
    pub fn is_noop(&self) -> bool {
        self.engine.is_none()
    }

    /// Re-enable reactions.
    pub fn resume(self) {
        if let Some(engine) = self.engine {
            engine.gate().open();
            debug!(engine = %engine.name(), "reactions enabled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_reports_previous_state() {
        let gate = ReactionGate::default();
        assert!(gate.is_enabled());

        assert!(gate.close());
        assert!(!gate.is_enabled());
        assert!(!gate.close());

        gate.open();
        assert!(gate.is_enabled());
    }

    #[test]
    fn second_disable_is_a_noop() {
        let engine = Engine::new();

        let first = engine.disable_reactions();
        let second = engine.disable_reactions();
        assert!(!first.is_noop());
        assert!(second.is_noop());

        // The inner resume does not reopen the gate.
        second.resume();
        assert!(!engine.reactions_enabled());

        first.resume();
        assert!(engine.reactions_enabled());
    }
}
