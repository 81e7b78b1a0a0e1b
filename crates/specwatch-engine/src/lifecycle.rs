//! Class-run lifecycle coordination
//!
//! One class run is the full lifecycle for one specification type:
//! construct → async init → observe exactly once → async dispose → sync
//! teardown → observation dispatch. Each stage settles (including any
//! suspension) before the next begins. Hook failures do not short-circuit the
//! remaining stages; they are aggregated and raised together as the terminal
//! outcome. Construction failure is the one early exit: nothing else runs and
//! no observation-level results are produced.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::dispatcher;
use crate::error::{EngineError, Stage};
use crate::executor::{self, panic_message, ObserveOutcome};
use crate::policy::{CapabilityProbe, ExceptionPolicyCache};
use crate::spec::{Observed, Specification};
use crate::timing::TimedAggregation;
use crate::types::{ClassRunOutcome, ClassRunPlan, ClassRunReport};

/// The observation engine: runs class runs against a shared policy cache
///
/// The policy cache is the only state shared across class runs; everything
/// else is owned per run. The host may drive many class runs concurrently on
/// one engine.
pub struct ObservationEngine {
    policy: Arc<ExceptionPolicyCache>,
}

impl ObservationEngine {
    /// Create an engine whose policy cache is backed by the given probe
    pub fn new(probe: Arc<dyn CapabilityProbe>) -> Self {
        Self {
            policy: Arc::new(ExceptionPolicyCache::new(probe)),
        }
    }

    /// Create an engine sharing an existing policy cache
    pub fn with_policy_cache(policy: Arc<ExceptionPolicyCache>) -> Self {
        Self { policy }
    }

    /// The engine's policy cache
    pub fn policy_cache(&self) -> Arc<ExceptionPolicyCache> {
        Arc::clone(&self.policy)
    }

    /// Run one class run to completion
    ///
    /// Returns either one aggregate failure (construction or an unhandled
    /// failure anywhere in the lifecycle) or one result per declared
    /// observation. Skipped observations report their reason in both cases.
    pub async fn run_class<S: Specification>(
        &self,
        plan: ClassRunPlan<S>,
        cancel: CancellationToken,
    ) -> ClassRunReport {
        let ClassRunPlan {
            type_name,
            constructor,
            observations,
        } = plan;

        info!(
            type_name = %type_name,
            observations = observations.len(),
            "starting class run"
        );

        let spec = match panic::catch_unwind(AssertUnwindSafe(constructor)) {
            Ok(Ok(spec)) => spec,
            Ok(Err(source)) => return construction_failure(type_name, source),
            Err(payload) => {
                return construction_failure(
                    type_name,
                    anyhow::anyhow!("constructor panicked: {}", panic_message(payload)),
                )
            }
        };

        let mut observed = Observed::new(spec);
        let mut timer = TimedAggregation::new();

        timer
            .aggregate(guarded(
                &cancel,
                Stage::Initialize,
                observed.spec_mut().initialize(),
            ))
            .await;

        if !cancel.is_cancelled() {
            match executor::observe_once(&mut observed, &self.policy, &cancel).await {
                Ok(ObserveOutcome::Absorbed(_)) => {}
                Ok(ObserveOutcome::Propagated(err)) => timer.push(EngineError::Observe(err)),
                Err(err) => timer.push(err),
            }
        }

        if !cancel.is_cancelled() {
            timer
                .aggregate(guarded(
                    &cancel,
                    Stage::Dispose,
                    observed.spec_mut().dispose(),
                ))
                .await;
            timer.aggregate_sync(|| {
                observed.spec_mut().teardown().map_err(|cause| EngineError::Hook {
                    stage: Stage::Teardown,
                    cause,
                })
            });
        }

        let hook_duration_ms = timer.elapsed().as_millis() as u64;

        if timer.has_errors() {
            let errors: Vec<String> = timer
                .into_errors()
                .iter()
                .map(ToString::to_string)
                .collect();
            error!(
                type_name = %type_name,
                causes = errors.len(),
                "class run failed"
            );
            let cause = format!("class run failed: {}", errors.join("; "));
            let results = dispatcher::failed_by_association(&observations, &cause);
            return ClassRunReport {
                type_name,
                outcome: ClassRunOutcome::Failed { errors, results },
                hook_duration_ms,
            };
        }

        let results = dispatcher::dispatch(&observed, &observations, &cancel);
        info!(
            type_name = %type_name,
            results = results.len(),
            "class run completed"
        );
        ClassRunReport {
            type_name,
            outcome: ClassRunOutcome::Completed { results },
            hook_duration_ms,
        }
    }
}

/// Race a lifecycle hook against cancellation, mapping failures to its stage
async fn guarded<F>(
    cancel: &CancellationToken,
    stage: Stage,
    op: F,
) -> Result<(), EngineError>
where
    F: Future<Output = anyhow::Result<()>>,
{
    match cancel.run_until_cancelled(op).await {
        Some(Ok(())) => Ok(()),
        Some(Err(cause)) => Err(EngineError::Hook { stage, cause }),
        None => Err(EngineError::Cancelled { stage }),
    }
}

fn construction_failure(type_name: String, source: anyhow::Error) -> ClassRunReport {
    let err = EngineError::Construction(source);
    error!(type_name = %type_name, error = %err, "class run aborted");
    ClassRunReport {
        type_name,
        outcome: ClassRunOutcome::Failed {
            errors: vec![err.to_string()],
            results: Vec::new(),
        },
        hook_duration_ms: 0,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::policy::StaticCapabilities;
    use crate::types::ObservationDescriptor;

    struct FailsToConstruct;

    #[async_trait]
    impl Specification for FailsToConstruct {
        async fn observe(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn engine() -> ObservationEngine {
        ObservationEngine::new(Arc::new(StaticCapabilities::new()))
    }

    #[tokio::test]
    async fn construction_failure_yields_no_observation_results() {
        let plan = ClassRunPlan::new("fails_to_construct", || {
            Err::<FailsToConstruct, _>(anyhow::anyhow!("no database"))
        })
        .observation(ObservationDescriptor::new(
            "should_never_matter",
            |_: &Observed<FailsToConstruct>| Ok(()),
        ));

        let report = engine()
            .run_class(plan, CancellationToken::new())
            .await;

        assert!(report.is_failed());
        assert!(report.results().is_empty());
        match report.outcome {
            ClassRunOutcome::Failed { errors, .. } => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("no database"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn construction_panic_is_reported_not_propagated() {
        let plan = ClassRunPlan::<FailsToConstruct>::new("panics_in_constructor", || {
            panic!("missing fixture");
        });

        let report = engine()
            .run_class(plan, CancellationToken::new())
            .await;

        assert!(report.is_failed());
        match report.outcome {
            ClassRunOutcome::Failed { errors, .. } => {
                assert!(errors[0].contains("missing fixture"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
