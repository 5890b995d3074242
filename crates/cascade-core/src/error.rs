//! Error taxonomy for the analysis engine.
//!
//! Per-test statistical failures (too little data, numerics out of domain)
//! are *data*: they land inside a test result, never here. These types cover
//! structural failures that abort a run, and configuration problems the
//! front end surfaces before a run starts.

use thiserror::Error;

use crate::bitfield::BitField;

/// Configuration rejected before any work starts.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// Significance level outside `(0, 1)`.
    #[error("alpha must be in (0, 1), got {0}")]
    InvalidAlpha(f64),

    /// Rule name the front end could not map to a rule.
    #[error("unknown rule: {0}")]
    UnknownRule(String),

    /// Neighborhood name the front end could not map.
    #[error("unknown neighborhood: {0}")]
    UnknownNeighborhood(String),

    /// Test name not present in the registry.
    #[error("unknown test: {0}")]
    UnknownTest(String),

    /// Input mapped to a zero-length bit field.
    #[error("input is empty")]
    EmptyInput,

    /// Combination of options that has no defined semantics.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure of a CA processing run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaError {
    /// A kernel worker thread panicked; the run is abandoned.
    #[error("worker thread failed during iteration {iteration}")]
    WorkerFailed { iteration: u32 },

    /// Cooperative cancellation observed between iterations. `partial` is
    /// the field after the last completed iteration.
    #[error("cancelled after {completed} of {total} iterations")]
    Cancelled {
        completed: u32,
        total: u32,
        partial: BitField,
    },
}
