//! Frequency-family tests: monobit, block frequency, runs, and the longest
//! run of ones.

use cascade_core::BitField;
use cascade_core::special::{erfc, igamc};

use crate::{ERROR_INPUT_TOO_SHORT, StatisticalTest, TestResult, metrics};

// ═══════════════════════════════════════════════════════════════════════════
// Frequency (Monobit)
// ═══════════════════════════════════════════════════════════════════════════

/// Proportion of ones vs zeros over the whole sequence.
///
/// `S = 2·ones − n`, `s_obs = |S|/√n`, `p = erfc(s_obs/√2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonobitTest;

impl StatisticalTest for MonobitTest {
    fn name(&self) -> &'static str {
        "frequency.monobit"
    }

    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult> {
        let n = data.len();
        if n < 100 {
            return vec![TestResult::input_too_short(self.name(), 100, n)];
        }
        let ones = data.count_ones() as f64;
        let nf = n as f64;
        let s = 2.0 * ones - nf;
        let s_obs = s.abs() / nf.sqrt();
        let p = erfc(s_obs / 2.0f64.sqrt());
        vec![TestResult::from_p_value(
            self.name(),
            p,
            alpha,
            metrics![
                ("ones_count", ones),
                ("zeros_count", nf - ones),
                ("bias", ones / nf),
                ("s_obs", s_obs),
            ],
        )]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Block Frequency
// ═══════════════════════════════════════════════════════════════════════════

/// Proportion of ones within M-bit blocks, χ² across blocks.
#[derive(Debug, Clone, Copy)]
pub struct BlockFrequencyTest {
    block_size: usize,
}

impl BlockFrequencyTest {
    pub fn with_block_size(block_size: usize) -> Self {
        Self { block_size }
    }
}

impl Default for BlockFrequencyTest {
    fn default() -> Self {
        Self { block_size: 128 }
    }
}

impl StatisticalTest for BlockFrequencyTest {
    fn name(&self) -> &'static str {
        "frequency.block"
    }

    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult> {
        let n = data.len();
        let m = self.block_size;
        if n < 100 || n / m == 0 {
            return vec![TestResult::input_too_short(self.name(), 100.max(m), n)];
        }
        let num_blocks = n / m;
        let mut chi_squared = 0.0;
        for block in 0..num_blocks {
            let ones: u32 = (0..m).map(|j| u32::from(data.get(block * m + j))).sum();
            let v = f64::from(ones) / m as f64 - 0.5;
            chi_squared += 4.0 * m as f64 * v * v;
        }
        let p = igamc(num_blocks as f64 / 2.0, chi_squared / 2.0);
        vec![TestResult::from_p_value(
            self.name(),
            p,
            alpha,
            metrics![
                ("block_size", m),
                ("num_blocks", num_blocks),
                ("chi_squared", chi_squared),
            ],
        )]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Runs
// ═══════════════════════════════════════════════════════════════════════════

/// Total number of runs (maximal blocks of identical bits).
///
/// Only meaningful when the monobit proportion is already near 1/2, so the
/// test first requires `|π − 0.5| < 2/√n`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunsTest;

impl StatisticalTest for RunsTest {
    fn name(&self) -> &'static str {
        "runs"
    }

    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult> {
        let n = data.len();
        if n < 100 {
            return vec![TestResult::input_too_short(self.name(), 100, n)];
        }
        let nf = n as f64;
        let pi = data.count_ones() as f64 / nf;
        if (pi - 0.5).abs() >= 2.0 / nf.sqrt() {
            return vec![TestResult::error(
                self.name(),
                ERROR_INPUT_TOO_SHORT,
                metrics![("pi", pi)],
            )];
        }
        let mut runs = 1u64;
        let mut prev = data.get(0);
        for i in 1..n {
            let bit = data.get(i);
            if bit != prev {
                runs += 1;
            }
            prev = bit;
        }
        let expected = 2.0 * nf * pi * (1.0 - pi);
        let denom = 2.0 * (2.0 * nf).sqrt() * pi * (1.0 - pi);
        let p = erfc((runs as f64 - expected).abs() / denom);
        vec![TestResult::from_p_value(
            self.name(),
            p,
            alpha,
            metrics![
                ("pi", pi),
                ("runs_count", runs),
                ("expected_runs", expected),
            ],
        )]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Longest Run of Ones in a Block
// ═══════════════════════════════════════════════════════════════════════════

/// SP 800-22 category tables, keyed by sequence length.
struct LongestRunTable {
    block_size: usize,
    /// Category upper bounds for the first K bins; runs above the last bound
    /// fall in the final bin.
    bounds: &'static [usize],
    probabilities: &'static [f64],
}

const TABLE_M8: LongestRunTable = LongestRunTable {
    block_size: 8,
    bounds: &[1, 2, 3],
    probabilities: &[0.2148, 0.3672, 0.2305, 0.1875],
};

const TABLE_M128: LongestRunTable = LongestRunTable {
    block_size: 128,
    bounds: &[4, 5, 6, 7, 8],
    probabilities: &[0.1174, 0.2430, 0.2493, 0.1752, 0.1027, 0.1124],
};

const TABLE_M10000: LongestRunTable = LongestRunTable {
    block_size: 10_000,
    bounds: &[10, 11, 12, 13, 14, 15],
    probabilities: &[0.0882, 0.2092, 0.2483, 0.1933, 0.1208, 0.0675, 0.0727],
};

/// Longest run of ones per block, binned into the SP 800-22 categories.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongestRunTest;

impl StatisticalTest for LongestRunTest {
    fn name(&self) -> &'static str {
        "runs.longest"
    }

    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult> {
        let n = data.len();
        if n < 128 {
            return vec![TestResult::input_too_short(self.name(), 128, n)];
        }
        let table = if n < 6272 {
            &TABLE_M8
        } else if n < 750_000 {
            &TABLE_M128
        } else {
            &TABLE_M10000
        };
        let m = table.block_size;
        let k = table.bounds.len();
        let num_blocks = n / m;

        let mut frequencies = vec![0u64; k + 1];
        for block in 0..num_blocks {
            let mut longest = 0usize;
            let mut current = 0usize;
            for j in 0..m {
                if data.get(block * m + j) {
                    current += 1;
                    longest = longest.max(current);
                } else {
                    current = 0;
                }
            }
            let bin = table
                .bounds
                .iter()
                .position(|&bound| longest <= bound)
                .unwrap_or(k);
            frequencies[bin] += 1;
        }

        let nf = num_blocks as f64;
        let chi_squared: f64 = frequencies
            .iter()
            .zip(table.probabilities)
            .map(|(&v, &pi)| {
                let expected = nf * pi;
                (v as f64 - expected).powi(2) / expected
            })
            .sum();
        let p = igamc(k as f64 / 2.0, chi_squared / 2.0);
        vec![TestResult::from_p_value(
            self.name(),
            p,
            alpha,
            metrics![
                ("block_size", m),
                ("num_blocks", num_blocks),
                ("chi_squared", chi_squared),
            ],
        )]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
