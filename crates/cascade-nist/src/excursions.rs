//! Random-walk tests: cumulative sums, random excursions, and the
//! excursions variant.
//!
//! All three view the sequence as a ±1 walk `S_k`. Cumulative sums bounds
//! the maximum excursion; the excursion tests slice the walk into
//! zero-to-zero cycles and compare per-state visit statistics against the
//! exact return probabilities of the simple random walk.

use cascade_core::BitField;
use cascade_core::special::{erfc, igamc};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::{StatisticalTest, TestResult, metrics, unpack_bits};

// ═══════════════════════════════════════════════════════════════════════════
// Cumulative sums
// ═══════════════════════════════════════════════════════════════════════════

/// Two-sided cumulative sums test, forward and reverse directions.
#[derive(Debug, Clone, Copy, Default)]
pub struct CumulativeSumsTest;

impl CumulativeSumsTest {
    /// SP 800-22 double-sum p-value for the maximum excursion `z`.
    fn p_value(n: usize, z: f64) -> f64 {
        let nf = n as f64;
        let sqrt_n = nf.sqrt();
        let normal = Normal::standard();
        let phi = |x: f64| normal.cdf(x);

        let lo1 = ((-nf / z + 1.0) / 4.0).floor() as i64;
        let hi = ((nf / z - 1.0) / 4.0).floor() as i64;
        let mut sum1 = 0.0;
        for k in lo1..=hi {
            let kf = k as f64;
            sum1 += phi((4.0 * kf + 1.0) * z / sqrt_n) - phi((4.0 * kf - 1.0) * z / sqrt_n);
        }
        let lo2 = ((-nf / z - 3.0) / 4.0).floor() as i64;
        let mut sum2 = 0.0;
        for k in lo2..=hi {
            let kf = k as f64;
            sum2 += phi((4.0 * kf + 3.0) * z / sqrt_n) - phi((4.0 * kf + 1.0) * z / sqrt_n);
        }
        1.0 - sum1 + sum2
    }

    fn direction(name: &'static str, bits: &[u8], alpha: f64) -> TestResult {
        let mut s = 0i64;
        let mut z = 0i64;
        for &bit in bits {
            s += if bit == 1 { 1 } else { -1 };
            z = z.max(s.abs());
        }
        let p = Self::p_value(bits.len(), z as f64);
        TestResult::from_p_value(name, p, alpha, metrics![("max_excursion", z)])
    }
}

impl StatisticalTest for CumulativeSumsTest {
    fn name(&self) -> &'static str {
        "cusum"
    }

    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult> {
        let n = data.len();
        if n < 100 {
            return vec![TestResult::input_too_short(self.name(), 100, n)];
        }
        let mut bits = unpack_bits(data);
        let forward = Self::direction("cusum.forward", &bits, alpha);
        bits.reverse();
        let reverse = Self::direction("cusum.reverse", &bits, alpha);
        vec![forward, reverse]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Walk cycles
// ═══════════════════════════════════════════════════════════════════════════

/// Walk summary for the excursion tests: number of zero-to-zero cycles, per
/// cycle visit counts binned 0..=5 for states ±1..±4, and total visits for
/// states ±1..±9. The walk is implicitly closed with a terminal zero.
struct WalkCycles {
    cycles: u64,
    /// `visit_bins[state_index][k]`: cycles visiting state exactly k times
    /// (k = 5 means ≥ 5). State index 0..8 maps −4..−1, 1..4.
    visit_bins: [[u64; 6]; 8],
    /// Total visits per state −9..−1, 1..9 (index 0..18 skipping zero).
    total_visits: [u64; 18],
}

fn excursion_state_index(s: i64) -> Option<usize> {
    match s {
        -4..=-1 => Some((s + 4) as usize),
        1..=4 => Some((s + 3) as usize),
        _ => None,
    }
}

fn variant_state_index(s: i64) -> Option<usize> {
    match s {
        -9..=-1 => Some((s + 9) as usize),
        1..=9 => Some((s + 8) as usize),
        _ => None,
    }
}

/// The state value for a variant index, inverse of [`variant_state_index`].
fn variant_state(index: usize) -> i64 {
    if index < 9 {
        index as i64 - 9
    } else {
        index as i64 - 8
    }
}

fn walk_cycles(bits: &[u8]) -> WalkCycles {
    let mut out = WalkCycles {
        cycles: 0,
        visit_bins: [[0; 6]; 8],
        total_visits: [0; 18],
    };
    let mut per_cycle = [0u64; 8];
    let mut s = 0i64;
    let mut cycle_open = false;

    let flush = |per_cycle: &mut [u64; 8], out: &mut WalkCycles| {
        out.cycles += 1;
        for (state, &count) in per_cycle.iter().enumerate() {
            out.visit_bins[state][(count as usize).min(5)] += 1;
        }
        *per_cycle = [0; 8];
    };

    for &bit in bits {
        s += if bit == 1 { 1 } else { -1 };
        if s == 0 {
            flush(&mut per_cycle, &mut out);
            cycle_open = false;
        } else {
            cycle_open = true;
            if let Some(idx) = excursion_state_index(s) {
                per_cycle[idx] += 1;
            }
            if let Some(idx) = variant_state_index(s) {
                out.total_visits[idx] += 1;
            }
        }
    }
    // Terminal zero: an unfinished excursion still counts as a cycle.
    if cycle_open {
        flush(&mut per_cycle, &mut out);
    }
    out
}

/// Minimum cycle count for the excursion χ²/normal approximations.
const MIN_CYCLES: u64 = 500;

// ═══════════════════════════════════════════════════════════════════════════
// Random excursions
// ═══════════════════════════════════════════════════════════════════════════

/// `π_k(x)`: probability a random-walk cycle visits state `x` exactly `k`
/// times (k = 5 means ≥ 5).
fn visit_probability(x: i64, k: usize) -> f64 {
    let ax = x.abs() as f64;
    let stay = 1.0 - 1.0 / (2.0 * ax);
    match k {
        0 => stay,
        1..=4 => (1.0 / (4.0 * ax * ax)) * stay.powi(k as i32 - 1),
        _ => (1.0 / (2.0 * ax)) * stay.powi(4),
    }
}

/// Per-cycle visit distribution for states ±1..±4, one result per state.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomExcursionsTest;

impl StatisticalTest for RandomExcursionsTest {
    fn name(&self) -> &'static str {
        "excursions"
    }

    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult> {
        let n = data.len();
        if n < 100 {
            return vec![TestResult::input_too_short(self.name(), 100, n)];
        }
        let bits = unpack_bits(data);
        let walk = walk_cycles(&bits);
        if walk.cycles < MIN_CYCLES {
            return vec![TestResult::error(
                self.name(),
                crate::ERROR_INPUT_TOO_SHORT,
                metrics![("cycles", walk.cycles), ("cycles_needed", MIN_CYCLES)],
            )];
        }

        let j = walk.cycles as f64;
        let states: [i64; 8] = [-4, -3, -2, -1, 1, 2, 3, 4];
        states
            .iter()
            .map(|&x| {
                let idx = excursion_state_index(x).unwrap();
                let chi_squared: f64 = (0..6)
                    .map(|k| {
                        let expected = j * visit_probability(x, k);
                        let observed = walk.visit_bins[idx][k] as f64;
                        (observed - expected).powi(2) / expected
                    })
                    .sum();
                let p = igamc(2.5, chi_squared / 2.0);
                TestResult::from_p_value(
                    format!("excursions.state_{x:+}"),
                    p,
                    alpha,
                    metrics![
                        ("state", x),
                        ("cycles", walk.cycles),
                        ("chi_squared", chi_squared),
                    ],
                )
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Random excursions variant
// ═══════════════════════════════════════════════════════════════════════════

/// Total visit counts for states ±1..±9 against the cycle count.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExcursionsVariantTest;

impl StatisticalTest for ExcursionsVariantTest {
    fn name(&self) -> &'static str {
        "excursions.variant"
    }

    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult> {
        let n = data.len();
        if n < 100 {
            return vec![TestResult::input_too_short(self.name(), 100, n)];
        }
        let bits = unpack_bits(data);
        let walk = walk_cycles(&bits);
        if walk.cycles < MIN_CYCLES {
            return vec![TestResult::error(
                self.name(),
                crate::ERROR_INPUT_TOO_SHORT,
                metrics![("cycles", walk.cycles), ("cycles_needed", MIN_CYCLES)],
            )];
        }

        let j = walk.cycles as f64;
        (0..18)
            .map(|idx| {
                let x = variant_state(idx);
                let visits = walk.total_visits[idx] as f64;
                let denom = (2.0 * j * (4.0 * x.abs() as f64 - 2.0)).sqrt();
                let p = erfc((visits - j).abs() / denom);
                TestResult::from_p_value(
                    format!("excursions.variant.state_{x:+}"),
                    p,
                    alpha,
                    metrics![
                        ("state", x),
                        ("visits", visits),
                        ("cycles", walk.cycles),
                    ],
                )
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
