//! Error types for the observation engine
//!
//! This module defines the error types raised by the engine itself. Failures
//! produced by host-supplied code (constructors, lifecycle hooks, the observed
//! action, observation bodies) arrive as [`anyhow::Error`] values and are
//! wrapped into the variants below with the stage they occurred in.
//!
//! # Error Handling Patterns
//!
//! The engine distinguishes four classes of failure:
//!
//! 1. **Construction failures**: fatal to the class run; no observations
//!    execute and none are reported individually. Never subject to the
//!    handle-exceptions policy.
//!
//! 2. **Observed-action failures**: either absorbed (the type opts into the
//!    handle-exceptions policy; the error stays inspectable on the instance)
//!    or propagated (the class run fails as a whole).
//!
//! 3. **Lifecycle hook failures**: aggregated across init/dispose/teardown
//!    and surfaced together as a single class-run failure, preserving all
//!    causes rather than only the first.
//!
//! 4. **Cancellation**: the host cancelled the class run; in-flight stages
//!    unwind promptly and the run is reported failed.

use std::sync::Arc;

use thiserror::Error;

/// Lifecycle stage in which an engine error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The async initialization hook
    Initialize,
    /// The observed action itself
    Observe,
    /// The async disposal hook
    Dispose,
    /// The synchronous teardown hook
    Teardown,
    /// Observation dispatch
    Dispatch,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Initialize => "initialize",
            Stage::Observe => "observe",
            Stage::Dispose => "dispose",
            Stage::Teardown => "teardown",
            Stage::Dispatch => "dispatch",
        };
        f.write_str(name)
    }
}

/// Errors that can fail a class run
///
/// Each variant carries the failure from the host-supplied code that caused
/// it. `anyhow::Error` does not implement `std::error::Error` directly, so
/// the underlying cause is rendered into the message rather than chained as
/// a `source`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The specification constructor returned an error or panicked
    ///
    /// Fatal to the class run: the observed action never runs, no
    /// observation-level results are produced, and the handle-exceptions
    /// policy is never consulted.
    #[error("specification construction failed: {0}")]
    Construction(anyhow::Error),

    /// An async or sync lifecycle hook failed
    ///
    /// Hook failures do not stop the remaining stages; they are aggregated
    /// and raised together as the class run's terminal outcome.
    #[error("{stage} hook failed: {cause}")]
    Hook {
        /// Which hook failed
        stage: Stage,
        /// The failure returned by the hook
        cause: anyhow::Error,
    },

    /// The observed action failed and the type does not handle exceptions
    ///
    /// The error is shared with the instance's thrown-error slot, which is
    /// why it is reference-counted here.
    #[error("observed action failed: {0}")]
    Observe(Arc<anyhow::Error>),

    /// The host cancelled the class run during the given stage
    #[error("class run cancelled during {stage}")]
    Cancelled {
        /// The stage that was in flight when cancellation was observed
        stage: Stage,
    },
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_error_names_its_stage() {
        let err = EngineError::Hook {
            stage: Stage::Dispose,
            cause: anyhow::anyhow!("socket already closed"),
        };
        assert_eq!(err.to_string(), "dispose hook failed: socket already closed");
    }

    #[test]
    fn cancellation_names_its_stage() {
        let err = EngineError::Cancelled {
            stage: Stage::Observe,
        };
        assert_eq!(err.to_string(), "class run cancelled during observe");
    }
}
