//! Fan-out of one observed instance into independent observation results
//!
//! Every descriptor becomes one independently scored result. Observation
//! isolation mirrors hook isolation: one failing assertion fails only its own
//! result and never re-triggers the observed action. Skip is absolute — a
//! descriptor with a skip reason never invokes its body, regardless of how
//! the observe stage ended.

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::executor::panic_message;
use crate::spec::{Observed, Specification};
use crate::types::{ObservationDescriptor, ObservationResult};

/// Run each observation against the settled instance
///
/// Issuance is sequential; on cancellation no further bodies are invoked but
/// every already-scored result is still returned. The instance is read-only
/// at this point, so bodies observe exactly the state the observe stage left
/// behind.
pub(crate) fn dispatch<S: Specification>(
    observed: &Observed<S>,
    descriptors: &[ObservationDescriptor<S>],
    cancel: &CancellationToken,
) -> Vec<ObservationResult> {
    let mut results = Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        if let Some(reason) = &descriptor.skip_reason {
            debug!(observation = %descriptor.name, reason = %reason, "observation skipped");
            results.push(ObservationResult::skipped(
                descriptor.display_name(),
                reason.as_str(),
            ));
            continue;
        }

        if cancel.is_cancelled() {
            warn!(
                completed = results.len(),
                declared = descriptors.len(),
                "cancellation observed; not issuing further observations"
            );
            break;
        }

        results.push(run_observation(observed, descriptor));
    }

    results
}

/// Synthesize results for a class run that failed before dispatch
///
/// Every declared observation still yields an explicit result: skipped ones
/// keep their reason, every other one is reported failed by association with
/// the class-level cause. No body is invoked.
pub(crate) fn failed_by_association<S: Specification>(
    descriptors: &[ObservationDescriptor<S>],
    cause: &str,
) -> Vec<ObservationResult> {
    descriptors
        .iter()
        .map(|descriptor| match &descriptor.skip_reason {
            Some(reason) => ObservationResult::skipped(descriptor.display_name(), reason.as_str()),
            None => ObservationResult::failed(descriptor.display_name(), cause, 0),
        })
        .collect()
}

fn run_observation<S: Specification>(
    observed: &Observed<S>,
    descriptor: &ObservationDescriptor<S>,
) -> ObservationResult {
    let start = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| descriptor.invoke(observed)));
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(())) => {
            debug!(observation = %descriptor.name, duration_ms, "observation passed");
            ObservationResult::passed(descriptor.display_name(), duration_ms)
        }
        Ok(Err(err)) => {
            debug!(observation = %descriptor.name, error = %err, "observation failed");
            ObservationResult::failed(descriptor.display_name(), err.to_string(), duration_ms)
        }
        Err(payload) => {
            let message = panic_message(payload);
            debug!(observation = %descriptor.name, error = %message, "observation panicked");
            ObservationResult::failed(descriptor.display_name(), message, duration_ms)
        }
    }
}
