//! Core data types for the observation engine
//!
//! This module defines the inbound contract from the host's discovery layer
//! (observation descriptors and the class-run plan) and the outbound report
//! model handed back to the host's reporting layer.
//!
//! # Examples
//!
//! Declaring a class-run plan:
//!
//! ```ignore
//! use specwatch_engine::{ClassRunPlan, ObservationDescriptor};
//!
//! let plan = ClassRunPlan::new("when_the_cache_is_warm", || Ok(WarmCacheSpec::default()))
//!     .observation(ObservationDescriptor::new("should_hit_without_io", |spec| {
//!         anyhow::ensure!(spec.io_calls == 0, "expected no I/O, saw {}", spec.io_calls);
//!         Ok(())
//!     }))
//!     .observation(
//!         ObservationDescriptor::new("should_refresh_in_background", |_spec| Ok(()))
//!             .with_skip("flaky on CI"),
//!     );
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::spec::{Observed, Specification};

/// Body of one observation: an assertion over the settled instance
pub type ObservationFn<S> = Arc<dyn Fn(&Observed<S>) -> anyhow::Result<()> + Send + Sync>;

/// Constructor for one specification instance
///
/// `FnOnce` keeps construction structurally exactly-once per class run.
pub type ConstructorFn<S> = Box<dyn FnOnce() -> anyhow::Result<S> + Send>;

/// One declared observation on a specification type
///
/// Descriptors come from the host's discovery layer: a method-style name, an
/// optional display label, an optional skip reason, and the assertion body.
/// A descriptor with a skip reason never invokes its body, under any
/// combination of construction and observe outcomes.
pub struct ObservationDescriptor<S> {
    /// Method-style identifier for the observation
    pub name: String,

    /// Optional display label overriding `name` in reports
    pub label: Option<String>,

    /// If set, the observation is reported skipped with this reason
    pub skip_reason: Option<String>,

    body: ObservationFn<S>,
}

impl<S: Specification> ObservationDescriptor<S> {
    /// Create a descriptor from a name and an assertion body
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Observed<S>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            label: None,
            skip_reason: None,
            body: Arc::new(body),
        }
    }

    /// Set a display label for reports
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Mark the observation skipped with a reason
    pub fn with_skip(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = Some(reason.into());
        self
    }

    /// Name used in reports: the label when present, the name otherwise
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    pub(crate) fn invoke(&self, observed: &Observed<S>) -> anyhow::Result<()> {
        (self.body)(observed)
    }
}

impl<S> std::fmt::Debug for ObservationDescriptor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationDescriptor")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("skip_reason", &self.skip_reason)
            .finish_non_exhaustive()
    }
}

/// Everything the engine needs to run one specification type
///
/// Produced by the host's discovery layer: the type's name, its constructor,
/// and the declared observations. The handle-exceptions opt-in is not part of
/// the plan; the engine queries it through its capability probe.
pub struct ClassRunPlan<S: Specification> {
    /// Name of the specification type, used in reports and logs
    pub type_name: String,

    pub(crate) constructor: ConstructorFn<S>,

    /// Declared observations, in declaration order
    pub observations: Vec<ObservationDescriptor<S>>,
}

impl<S: Specification> ClassRunPlan<S> {
    /// Create a plan from a type name and a constructor
    pub fn new<F>(type_name: impl Into<String>, constructor: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<S> + Send + 'static,
    {
        Self {
            type_name: type_name.into(),
            constructor: Box::new(constructor),
            observations: Vec::new(),
        }
    }

    /// Add one observation descriptor
    pub fn observation(mut self, descriptor: ObservationDescriptor<S>) -> Self {
        self.observations.push(descriptor);
        self
    }

    /// Add many observation descriptors
    pub fn observations(
        mut self,
        descriptors: impl IntoIterator<Item = ObservationDescriptor<S>>,
    ) -> Self {
        self.observations.extend(descriptors);
        self
    }
}

/// Outcome of one observation test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationStatus {
    /// The assertion body returned success
    Passed,
    /// The assertion body failed, panicked, or the class run aborted
    Failed,
    /// The descriptor carried a skip reason; the body never ran
    Skipped,
}

/// One independently reported observation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationResult {
    /// Display name of the observation
    pub name: String,

    /// Pass/fail/skip outcome
    pub status: ObservationStatus,

    /// Failure message, when status is `Failed`
    pub error: Option<String>,

    /// Configured skip reason, when status is `Skipped`
    pub skip_reason: Option<String>,

    /// Time spent inside the assertion body
    pub duration_ms: u64,
}

impl ObservationResult {
    pub(crate) fn passed(name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            status: ObservationStatus::Passed,
            error: None,
            skip_reason: None,
            duration_ms,
        }
    }

    pub(crate) fn failed(
        name: impl Into<String>,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            status: ObservationStatus::Failed,
            error: Some(error.into()),
            skip_reason: None,
            duration_ms,
        }
    }

    pub(crate) fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ObservationStatus::Skipped,
            error: None,
            skip_reason: Some(reason.into()),
            duration_ms: 0,
        }
    }
}

/// Terminal outcome of one class run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassRunOutcome {
    /// Construction, hooks, and the observed action all settled cleanly (or
    /// the action's failure was absorbed); observations were dispatched
    Completed {
        /// One result per declared observation
        results: Vec<ObservationResult>,
    },

    /// The class run failed as a whole
    ///
    /// `results` is empty when construction failed; otherwise it holds one
    /// entry per declared observation — skipped ones with their reason,
    /// every other one failed by association.
    Failed {
        /// All aggregated causes, in stage order
        errors: Vec<String>,
        /// Synthesized per-observation results
        results: Vec<ObservationResult>,
    },
}

/// Report for one class run, handed to the host's reporting layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRunReport {
    /// Name of the specification type
    pub type_name: String,

    /// Terminal outcome
    pub outcome: ClassRunOutcome,

    /// Aggregated time spent in lifecycle hooks
    pub hook_duration_ms: u64,
}

impl ClassRunReport {
    /// Whether the class run failed as a whole
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, ClassRunOutcome::Failed { .. })
    }

    /// The per-observation results, regardless of outcome
    pub fn results(&self) -> &[ObservationResult] {
        match &self.outcome {
            ClassRunOutcome::Completed { results } => results,
            ClassRunOutcome::Failed { results, .. } => results,
        }
    }
}
