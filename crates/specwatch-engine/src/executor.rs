//! Exactly-once execution of the observed action
//!
//! The executor owns the one write to the instance's thrown-error slot and
//! the policy decision that follows it: an opted-in type absorbs the failure
//! (dispatch proceeds, the error stays inspectable), any other type
//! propagates it and the class run aborts. The two outcomes are explicit in
//! [`ObserveOutcome`] rather than hidden in raise/catch control flow.

use std::any::TypeId;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{EngineError, Stage};
use crate::policy::ExceptionPolicyCache;
use crate::spec::{Observed, Specification};

/// Outcome of the observe stage
#[derive(Debug)]
pub enum ObserveOutcome {
    /// The action succeeded, or failed on a type that handles exceptions
    ///
    /// Carries the captured failure when there was one; it is also stored in
    /// the instance's thrown-error slot for observation bodies to inspect.
    Absorbed(Option<Arc<anyhow::Error>>),

    /// The action failed and the type does not handle exceptions
    ///
    /// The class run must abort: no observation body executes, and every
    /// non-skipped observation is reported failed by association.
    Propagated(Arc<anyhow::Error>),
}

/// Render a panic payload into a displayable message
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run the observed action exactly once against the instance
///
/// Failures (error returns and panics alike) are written into the instance's
/// thrown-error slot before the policy cache is consulted, so an absorbed
/// failure is always visible to observation bodies. Cancellation surfaces as
/// an error, not an outcome: nothing was decided about the action's result.
pub(crate) async fn observe_once<S: Specification>(
    observed: &mut Observed<S>,
    policy: &ExceptionPolicyCache,
    cancel: &CancellationToken,
) -> crate::error::Result<ObserveOutcome> {
    let outcome = {
        let action = AssertUnwindSafe(observed.spec_mut().observe()).catch_unwind();
        cancel.run_until_cancelled(action).await
    };

    let failure = match outcome {
        None => return Err(EngineError::Cancelled { stage: Stage::Observe }),
        Some(Ok(Ok(()))) => {
            debug!("observed action completed");
            return Ok(ObserveOutcome::Absorbed(None));
        }
        Some(Ok(Err(err))) => err,
        Some(Err(payload)) => anyhow::anyhow!(
            "observed action panicked: {}",
            panic_message(payload)
        ),
    };

    let err = Arc::new(failure);
    observed.record_thrown(Arc::clone(&err));

    if policy.should_handle_exceptions(TypeId::of::<S>()).await {
        warn!(error = %err, "observed action failed; absorbed by policy");
        Ok(ObserveOutcome::Absorbed(Some(err)))
    } else {
        Ok(ObserveOutcome::Propagated(err))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::policy::StaticCapabilities;

    struct Throwing {
        invocations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Specification for Throwing {
        async fn observe(&mut self) -> anyhow::Result<()> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("boom")
        }
    }

    struct Panicking;

    #[async_trait]
    impl Specification for Panicking {
        async fn observe(&mut self) -> anyhow::Result<()> {
            panic!("assertion blew up");
        }
    }

    fn cache_handling<S: 'static>() -> ExceptionPolicyCache {
        ExceptionPolicyCache::new(Arc::new(
            StaticCapabilities::new().handle_exceptions::<S>(),
        ))
    }

    fn cache_default() -> ExceptionPolicyCache {
        ExceptionPolicyCache::new(Arc::new(StaticCapabilities::new()))
    }

    #[tokio::test]
    async fn failure_is_absorbed_for_opted_in_types() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let mut observed = Observed::new(Throwing {
            invocations: invocations.clone(),
        });
        let policy = cache_handling::<Throwing>();
        let cancel = CancellationToken::new();

        let outcome = observe_once(&mut observed, &policy, &cancel).await.unwrap();
        assert!(matches!(outcome, ObserveOutcome::Absorbed(Some(_))));
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(observed.thrown().unwrap().to_string(), "boom");
    }

    #[tokio::test]
    async fn failure_propagates_by_default() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let mut observed = Observed::new(Throwing {
            invocations: invocations.clone(),
        });
        let policy = cache_default();
        let cancel = CancellationToken::new();

        let outcome = observe_once(&mut observed, &policy, &cancel).await.unwrap();
        match outcome {
            ObserveOutcome::Propagated(err) => assert_eq!(err.to_string(), "boom"),
            other => panic!("expected propagation, got {:?}", other),
        }
        // The slot is written either way.
        assert!(observed.thrown().is_some());
    }

    #[tokio::test]
    async fn panics_are_captured_like_errors() {
        let mut observed = Observed::new(Panicking);
        let policy = cache_handling::<Panicking>();
        let cancel = CancellationToken::new();

        let outcome = observe_once(&mut observed, &policy, &cancel).await.unwrap();
        assert!(matches!(outcome, ObserveOutcome::Absorbed(Some(_))));
        let thrown = observed.thrown().unwrap().to_string();
        assert!(thrown.contains("assertion blew up"), "got: {thrown}");
    }

    #[tokio::test]
    async fn cancellation_preempts_the_action() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let mut observed = Observed::new(Throwing {
            invocations: invocations.clone(),
        });
        let policy = cache_default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = observe_once(&mut observed, &policy, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled { stage: Stage::Observe }));
        assert!(observed.thrown().is_none());
    }
}
