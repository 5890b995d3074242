//! # cascade-nist
//!
//! NIST SP 800-22 statistical randomness battery.
//!
//! Each test consumes a shared [`BitField`] and produces one or more
//! [`TestResult`] records: a p-value, a pass/fail verdict under the suite's
//! significance level α, and enough diagnostic metrics to reconstruct the
//! decision. Tests that SP 800-22 defines with several p-values (serial,
//! cumulative sums, the excursion tests, per-template matching) return one
//! record per p-value under a dotted sub-name.
//!
//! Tests are value types: they hold their parameters, never mutable state,
//! and are safe to invoke concurrently on distinct inputs. Every χ² tail
//! probability routes through `cascade_core::special::igamc` — the general
//! regularized incomplete gamma — rather than any df-2-only shortcut.

use std::collections::BTreeMap;

use cascade_core::{BitField, ConfigError};
use serde::Serialize;

pub mod complexity;
pub mod excursions;
pub mod frequency;
pub mod matrix;
pub mod runner;
pub mod spectral;
pub mod template;
pub mod universal;

pub use runner::{SuiteError, TestRunner};

// ═══════════════════════════════════════════════════════════════════════════
// Result record
// ═══════════════════════════════════════════════════════════════════════════

/// Diagnostic code stored under `metrics["error"]` when a test's minimum
/// input-length precondition fails.
pub const ERROR_INPUT_TOO_SHORT: f64 = 1.0;
/// Diagnostic code for a statistic that left the numeric domain of the
/// special functions (NaN/∞ χ², zero variance, and similar).
pub const ERROR_NUMERIC: f64 = 2.0;

/// Result of a single statistical test (or sub-test).
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub test_name: String,
    /// p-value in `[0, 1]`; 0 when the test could not produce one.
    pub p_value: f64,
    /// `p_value >= alpha`, and false whenever `metrics["error"]` is set.
    pub passed: bool,
    /// Free-form diagnostics: counts, χ², z-scores, block parameters.
    /// Ordered map so report field order is stable.
    pub metrics: BTreeMap<String, f64>,
}

impl TestResult {
    /// Result from a defined p-value: clamps into `[0, 1]` and applies α.
    /// A non-finite p-value becomes a numeric-error result instead.
    pub fn from_p_value(
        name: impl Into<String>,
        p_value: f64,
        alpha: f64,
        metrics: BTreeMap<String, f64>,
    ) -> Self {
        if !p_value.is_finite() {
            return Self::error(name, ERROR_NUMERIC, metrics);
        }
        let p = p_value.clamp(0.0, 1.0);
        Self {
            test_name: name.into(),
            p_value: p,
            passed: p >= alpha,
            metrics,
        }
    }

    /// Failed result carrying a diagnostic error code.
    pub fn error(name: impl Into<String>, code: f64, mut metrics: BTreeMap<String, f64>) -> Self {
        metrics.insert("error".to_string(), code);
        Self {
            test_name: name.into(),
            p_value: 0.0,
            passed: false,
            metrics,
        }
    }

    /// Failed result for an input shorter than `needed` bits.
    pub fn input_too_short(name: impl Into<String>, needed: usize, got: usize) -> Self {
        let mut metrics = BTreeMap::new();
        metrics.insert("bits_needed".to_string(), needed as f64);
        metrics.insert("bits_available".to_string(), got as f64);
        Self::error(name, ERROR_INPUT_TOO_SHORT, metrics)
    }
}

/// Convenience constructor for metric maps:
/// `metrics![("chi_squared", chi2), ("num_blocks", n as f64)]`.
#[macro_export]
macro_rules! metrics {
    ($(($key:expr, $value:expr)),* $(,)?) => {{
        let mut map = std::collections::BTreeMap::new();
        $(map.insert($key.to_string(), $value as f64);)*
        map
    }};
}

// ═══════════════════════════════════════════════════════════════════════════
// Test trait and registry
// ═══════════════════════════════════════════════════════════════════════════

/// A statistical randomness test.
///
/// Implementations are immutable after construction and callable from
/// multiple threads on distinct inputs.
pub trait StatisticalTest: Send + Sync {
    /// Stable registry name, e.g. `"frequency.monobit"`.
    fn name(&self) -> &'static str;

    /// Run the test against `data` with significance level `alpha`.
    ///
    /// Returns at least one result. Precondition and numeric failures are
    /// reported inside the results, never panicked or errored.
    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult>;
}

type TestConstructor = fn() -> Box<dyn StatisticalTest>;

/// Immutable registry mapping stable names to test constructors.
///
/// Populated once from the canonical SP 800-22 list; iteration order is the
/// canonical order, which the runner preserves in its output.
pub struct TestRegistry {
    entries: Vec<(&'static str, TestConstructor)>,
}

impl TestRegistry {
    /// The canonical fifteen-test battery.
    pub fn canonical() -> Self {
        let entries: Vec<(&'static str, TestConstructor)> = vec![
            ("frequency.monobit", || {
                Box::new(frequency::MonobitTest::default())
            }),
            ("frequency.block", || {
                Box::new(frequency::BlockFrequencyTest::default())
            }),
            ("runs", || Box::new(frequency::RunsTest::default())),
            ("runs.longest", || {
                Box::new(frequency::LongestRunTest::default())
            }),
            ("matrix.rank", || Box::new(matrix::MatrixRankTest::default())),
            ("spectral.dft", || Box::new(spectral::DftTest::default())),
            ("template.non_overlapping", || {
                Box::new(template::NonOverlappingTemplateTest::default())
            }),
            ("template.overlapping", || {
                Box::new(template::OverlappingTemplateTest::default())
            }),
            ("universal.maurer", || {
                Box::new(universal::UniversalTest::default())
            }),
            ("complexity.linear", || {
                Box::new(complexity::LinearComplexityTest::default())
            }),
            ("serial", || Box::new(complexity::SerialTest::default())),
            ("entropy.approximate", || {
                Box::new(complexity::ApproximateEntropyTest::default())
            }),
            ("cusum", || Box::new(excursions::CumulativeSumsTest::default())),
            ("excursions", || {
                Box::new(excursions::RandomExcursionsTest::default())
            }),
            ("excursions.variant", || {
                Box::new(excursions::ExcursionsVariantTest::default())
            }),
        ];
        Self { entries }
    }

    /// Registered names in canonical order.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(name, _)| *name).collect()
    }

    /// Construct the test registered under `name`.
    pub fn build(&self, name: &str) -> Result<Box<dyn StatisticalTest>, ConfigError> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, ctor)| ctor())
            .ok_or_else(|| ConfigError::UnknownTest(name.to_string()))
    }

    /// Construct a selection from a comma-separated list; `"all"` selects
    /// the whole battery in canonical order.
    pub fn build_selection(
        &self,
        selection: &str,
    ) -> Result<Vec<Box<dyn StatisticalTest>>, ConfigError> {
        if selection.trim().eq_ignore_ascii_case("all") {
            return Ok(self.entries.iter().map(|(_, ctor)| ctor()).collect());
        }
        selection
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|name| self.build(name))
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Shared helpers
// ═══════════════════════════════════════════════════════════════════════════

/// Unpack a bit field into one byte per bit. Several tests walk patterns bit
/// by bit; unpacking once beats re-extracting through the packed view.
pub(crate) fn unpack_bits(data: &BitField) -> Vec<u8> {
    let n = data.len();
    let mut bits = Vec::with_capacity(n);
    let bytes = data.as_bytes();
    for (j, &byte) in bytes.iter().enumerate() {
        let hi = (n - j * 8).min(8);
        for shift in 0..hi {
            bits.push((byte >> (7 - shift)) & 1);
        }
    }
    bits
}
