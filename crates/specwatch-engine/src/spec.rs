//! The specification contract and the observed instance wrapper
//!
//! A specification describes one scenario: a single observed action plus any
//! number of observations about its outcome. The engine constructs exactly
//! one instance per class run, runs the action exactly once, and then lets
//! every observation read the settled state through [`Observed`].

use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;

/// A type whose behavior is specified by observations
///
/// Implementors supply the observed action via [`observe`](Self::observe) and
/// may override the lifecycle hooks; all hooks default to no-ops. Within one
/// class run the stages execute strictly in order: `initialize` → `observe`
/// (exactly once) → `dispose` → `teardown` → observation dispatch.
///
/// There is no inheritance-based "call base then extend" here: a variant that
/// builds on another specification's action composes explicitly, invoking the
/// base behavior from its own `observe`.
#[async_trait]
pub trait Specification: Send + Sync + 'static {
    /// Async initialization hook, run before the observed action
    async fn initialize(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// The observed action: the single operation under test
    ///
    /// Runs exactly once per class run, no matter how many observations are
    /// declared. An error (or panic) here lands in the instance's
    /// thrown-error slot; whether it aborts the class run depends on the
    /// type's handle-exceptions capability.
    async fn observe(&mut self) -> anyhow::Result<()>;

    /// Async disposal hook, run after the observed action
    async fn dispose(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Synchronous teardown hook, run after async disposal
    fn teardown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// One constructed specification instance plus its thrown-error slot
///
/// The slot is single-assignment: it stays empty until the observed action
/// runs and is written at most once per instance, by the executor only.
/// Observation bodies and the dispatcher get a read-only view through
/// [`thrown`](Self::thrown). `Observed` derefs to the specification itself so
/// bodies can assert against its state directly.
///
/// Once the observe stage has settled, nothing mutates the instance again, so
/// concurrent reads from observation bodies are safe without locking.
pub struct Observed<S> {
    spec: S,
    thrown: OnceCell<Arc<anyhow::Error>>,
}

impl<S: Specification> Observed<S> {
    pub(crate) fn new(spec: S) -> Self {
        Self {
            spec,
            thrown: OnceCell::new(),
        }
    }

    /// The error captured from the observed action, if it failed
    pub fn thrown(&self) -> Option<&anyhow::Error> {
        self.thrown.get().map(Arc::as_ref)
    }

    /// Record the observed action's failure
    ///
    /// Returns `false` if the slot was already written. The executor is the
    /// only caller; a second write per instance indicates an engine bug, not
    /// a specification bug.
    pub(crate) fn record_thrown(&self, err: Arc<anyhow::Error>) -> bool {
        self.thrown.set(err).is_ok()
    }

    pub(crate) fn spec_mut(&mut self) -> &mut S {
        &mut self.spec
    }
}

impl<S: Specification> Deref for Observed<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Specification for Noop {
        async fn observe(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn thrown_slot_starts_empty() {
        let observed = Observed::new(Noop);
        assert!(observed.thrown().is_none());
    }

    #[test]
    fn thrown_slot_is_single_assignment() {
        let observed = Observed::new(Noop);
        assert!(observed.record_thrown(Arc::new(anyhow::anyhow!("first"))));
        assert!(!observed.record_thrown(Arc::new(anyhow::anyhow!("second"))));
        assert_eq!(observed.thrown().unwrap().to_string(), "first");
    }
}
