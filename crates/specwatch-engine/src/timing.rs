//! Timed aggregation of lifecycle hook failures
//!
//! One [`TimedAggregation`] lives per class run. It times each guarded hook,
//! collects any failures without re-raising them, and lets the lifecycle
//! coordinator inspect everything at the end and surface all causes together
//! as the class run's terminal outcome.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::EngineError;

/// Accumulates elapsed time and failures across guarded operations
#[derive(Debug, Default)]
pub struct TimedAggregation {
    elapsed: Duration,
    errors: Vec<EngineError>,
}

impl TimedAggregation {
    /// Create an empty aggregation
    pub fn new() -> Self {
        Self::default()
    }

    /// Run an async operation, timing it and capturing any failure
    pub async fn aggregate<F>(&mut self, op: F)
    where
        F: Future<Output = Result<(), EngineError>>,
    {
        let start = Instant::now();
        let outcome = op.await;
        self.elapsed += start.elapsed();
        if let Err(err) = outcome {
            self.errors.push(err);
        }
    }

    /// Run a sync operation, timing it and capturing any failure
    pub fn aggregate_sync<F>(&mut self, op: F)
    where
        F: FnOnce() -> Result<(), EngineError>,
    {
        let start = Instant::now();
        let outcome = op();
        self.elapsed += start.elapsed();
        if let Err(err) = outcome {
            self.errors.push(err);
        }
    }

    /// Record a failure that occurred outside a guarded operation
    pub fn push(&mut self, err: EngineError) {
        self.errors.push(err);
    }

    /// Whether any guarded operation failed so far
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Total time spent inside guarded operations
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Consume the aggregation, yielding the collected failures in order
    pub fn into_errors(self) -> Vec<EngineError> {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;

    #[tokio::test]
    async fn collects_failures_without_raising() {
        let mut timer = TimedAggregation::new();

        timer.aggregate(async { Ok(()) }).await;
        assert!(!timer.has_errors());

        timer
            .aggregate(async {
                Err(EngineError::Hook {
                    stage: Stage::Initialize,
                    cause: anyhow::anyhow!("bind failed"),
                })
            })
            .await;
        timer.aggregate_sync(|| {
            Err(EngineError::Hook {
                stage: Stage::Teardown,
                cause: anyhow::anyhow!("already torn down"),
            })
        });

        assert!(timer.has_errors());
        let errors = timer.into_errors();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].to_string().contains("initialize"));
        assert!(errors[1].to_string().contains("teardown"));
    }

    #[tokio::test]
    async fn accumulates_elapsed_across_operations() {
        let mut timer = TimedAggregation::new();
        timer
            .aggregate(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(())
            })
            .await;
        timer
            .aggregate(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(())
            })
            .await;
        assert!(timer.elapsed() >= Duration::from_millis(10));
    }
}
