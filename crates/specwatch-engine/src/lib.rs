//! specwatch engine
//!
//! Execution engine for observation-style behavior specifications: one shared
//! action is performed exactly once against one constructed instance, and a
//! set of independently declared observations are each scored as their own
//! test case against the outcome of that single action. Expensive setup is
//! amortized across many assertions while every assertion stays individually
//! reportable and isolated from its siblings.
//!
//! # Architecture
//!
//! The engine consists of five components:
//!
//! 1. **Policy cache** (`policy`): per-type handle-exceptions opt-in,
//!    resolved once through the host's capability probe and cached for the
//!    process lifetime
//! 2. **Specification instance** (`spec`): the shared instance plus its
//!    single-assignment thrown-error slot
//! 3. **Lifecycle coordinator** (`lifecycle`): construct → init → observe →
//!    dispose → teardown → dispatch, strictly ordered, failures aggregated
//! 4. **Observation executor** (`executor`): the exactly-once action
//!    invocation and the absorb-or-propagate policy decision
//! 5. **Observation dispatcher** (`dispatcher`): fan-out into independently
//!    scored results, with absolute skip semantics
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use specwatch_engine::{
//!     ClassRunPlan, ObservationDescriptor, ObservationEngine, Specification,
//!     StaticCapabilities,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Default)]
//! struct when_the_queue_drains {
//!     drained: usize,
//! }
//!
//! #[async_trait::async_trait]
//! impl Specification for when_the_queue_drains {
//!     async fn observe(&mut self) -> anyhow::Result<()> {
//!         self.drained = 3;
//!         Ok(())
//!     }
//! }
//!
//! let engine = ObservationEngine::new(Arc::new(StaticCapabilities::new()));
//! let plan = ClassRunPlan::new("when_the_queue_drains", || {
//!     Ok(when_the_queue_drains::default())
//! })
//! .observation(ObservationDescriptor::new("should_drain_everything", |spec| {
//!     anyhow::ensure!(spec.drained == 3, "drained {}", spec.drained);
//!     Ok(())
//! }));
//!
//! let report = engine.run_class(plan, CancellationToken::new()).await;
//! assert!(!report.is_failed());
//! ```

mod dispatcher;

pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod policy;
pub mod spec;
pub mod timing;
pub mod types;

pub use error::{EngineError, Result, Stage};
pub use executor::ObserveOutcome;
pub use lifecycle::ObservationEngine;
pub use policy::{Capability, CapabilityProbe, ExceptionPolicyCache, StaticCapabilities};
pub use spec::{Observed, Specification};
pub use timing::TimedAggregation;
pub use types::{
    ClassRunOutcome, ClassRunPlan, ClassRunReport, ObservationDescriptor, ObservationResult,
    ObservationStatus,
};
