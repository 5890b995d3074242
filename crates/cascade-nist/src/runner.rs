//! Suite runner: drives a selection of tests over one bit field.
//!
//! Tests run sequentially in selection order; the input is borrowed shared
//! by every test and never mutated. One progress event fires per completed
//! test, and a cancellation check sits between tests. Statistical failures
//! stay inside the results; the only error a run can produce is
//! cancellation, which carries whatever results were already complete.

use cascade_core::{BitField, CancelToken, ConfigError, ProgressSink};
use thiserror::Error;

use crate::{StatisticalTest, TestResult};

/// Progress task name emitted by the runner.
pub const SUITE_TASK: &str = "statistical-tests";

/// Failure of a suite run.
#[derive(Debug, Error)]
pub enum SuiteError {
    /// Cancelled between tests; `partial` holds the completed results.
    #[error("suite cancelled after {completed} of {total} tests")]
    Cancelled {
        completed: usize,
        total: usize,
        partial: Vec<TestResult>,
    },
}

/// Runs a test selection under one significance level.
#[derive(Debug, Clone, Copy)]
pub struct TestRunner {
    alpha: f64,
}

impl TestRunner {
    /// `alpha` must lie strictly inside `(0, 1)`.
    pub fn new(alpha: f64) -> Result<Self, ConfigError> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ConfigError::InvalidAlpha(alpha));
        }
        Ok(Self { alpha })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Execute `tests` against `data` in order, emitting one progress event
    /// per completed test.
    pub fn run(
        &self,
        data: &BitField,
        tests: &[Box<dyn StatisticalTest>],
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<TestResult>, SuiteError> {
        let total = tests.len();
        let mut results = Vec::with_capacity(total);
        for (index, test) in tests.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SuiteError::Cancelled {
                    completed: index,
                    total,
                    partial: results,
                });
            }
            results.extend(test.execute(data, self.alpha));
            sink.update(SUITE_TASK, (index + 1) as u64, total as u64);
        }
        sink.complete(SUITE_TASK);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestRegistry;
    use crate::testdata::random_field;
    use cascade_core::NullSink;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct CountingSink {
        updates: AtomicU64,
        completions: AtomicU64,
    }

    impl ProgressSink for CountingSink {
        fn update(&self, _task: &str, _processed: u64, _total: u64) {
            self.updates.fetch_add(1, Ordering::Relaxed);
        }
        fn complete(&self, _task: &str) {
            self.completions.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn rejects_invalid_alpha() {
        assert!(TestRunner::new(0.0).is_err());
        assert!(TestRunner::new(1.0).is_err());
        assert!(TestRunner::new(-0.5).is_err());
        assert!(TestRunner::new(f64::NAN).is_err());
        assert_eq!(TestRunner::new(0.01).unwrap().alpha(), 0.01);
    }

    #[test]
    fn preserves_selection_order() {
        let registry = TestRegistry::canonical();
        let tests = registry
            .build_selection("runs,frequency.monobit,frequency.block")
            .unwrap();
        let field = random_field(1000, 0x70);
        let results = TestRunner::new(0.01)
            .unwrap()
            .run(&field, &tests, &CancelToken::new(), &NullSink)
            .unwrap();
        assert_eq!(results[0].test_name, "runs");
        assert_eq!(results[1].test_name, "frequency.monobit");
        assert_eq!(results[2].test_name, "frequency.block");
    }

    #[test]
    fn one_progress_event_per_test() {
        let registry = TestRegistry::canonical();
        let tests = registry
            .build_selection("frequency.monobit,runs,cusum")
            .unwrap();
        let field = random_field(1000, 0x71);
        let sink = CountingSink::default();
        let results = TestRunner::new(0.01)
            .unwrap()
            .run(&field, &tests, &CancelToken::new(), &sink)
            .unwrap();
        // cusum contributes two results but only one progress event.
        assert_eq!(results.len(), 4);
        assert_eq!(sink.updates.load(Ordering::Relaxed), 3);
        assert_eq!(sink.completions.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn cancellation_returns_partial_results() {
        let registry = TestRegistry::canonical();
        let tests = registry.build_selection("frequency.monobit,runs").unwrap();
        let field = random_field(1000, 0x72);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = TestRunner::new(0.01)
            .unwrap()
            .run(&field, &tests, &cancel, &NullSink)
            .unwrap_err();
        let SuiteError::Cancelled {
            completed,
            total,
            partial,
        } = err;
        assert_eq!(completed, 0);
        assert_eq!(total, 2);
        assert!(partial.is_empty());
    }

    #[test]
    fn input_is_not_mutated() {
        let field = random_field(2000, 0x73);
        let before = field.clone();
        let registry = TestRegistry::canonical();
        let tests = registry.build_selection("frequency.monobit,serial").unwrap();
        let _ = TestRunner::new(0.01)
            .unwrap()
            .run(&field, &tests, &CancelToken::new(), &NullSink)
            .unwrap();
        assert_eq!(field, before);
    }
}
