//! Pattern-complexity tests: linear complexity (Berlekamp–Massey), serial,
//! and approximate entropy.

use cascade_core::BitField;
use cascade_core::special::igamc;

use crate::{StatisticalTest, TestResult, metrics, unpack_bits};

// ═══════════════════════════════════════════════════════════════════════════
// Linear complexity
// ═══════════════════════════════════════════════════════════════════════════

/// Berlekamp–Massey: length of the shortest LFSR generating `seq`.
fn berlekamp_massey(seq: &[u8]) -> usize {
    let n = seq.len();
    let mut c = vec![0u8; n];
    let mut b = vec![0u8; n];
    c[0] = 1;
    b[0] = 1;
    let mut l = 0usize;
    let mut m: isize = -1;

    for i in 0..n {
        let mut discrepancy = seq[i];
        for j in 1..=l {
            discrepancy ^= c[j] & seq[i - j];
        }
        if discrepancy == 1 {
            let t = c.clone();
            let shift = (i as isize - m) as usize;
            for j in shift..n {
                c[j] ^= b[j - shift];
            }
            if l <= i / 2 {
                l = i + 1 - l;
                m = i as isize;
                b = t;
            }
        }
    }
    l
}

/// Binned probabilities for the `T_i` statistic (SP 800-22 §2.10).
const LC_PI: [f64; 7] = [0.010417, 0.03125, 0.125, 0.5, 0.25, 0.0625, 0.020833];

/// Per-block LFSR complexity distribution.
#[derive(Debug, Clone, Copy)]
pub struct LinearComplexityTest {
    block_size: usize,
}

impl LinearComplexityTest {
    pub fn with_block_size(block_size: usize) -> Self {
        Self { block_size }
    }
}

impl Default for LinearComplexityTest {
    fn default() -> Self {
        Self { block_size: 500 }
    }
}

impl StatisticalTest for LinearComplexityTest {
    fn name(&self) -> &'static str {
        "complexity.linear"
    }

    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult> {
        let n = data.len();
        let m = self.block_size;
        let num_blocks = n / m;
        if num_blocks == 0 {
            return vec![TestResult::input_too_short(self.name(), m, n)];
        }

        let bits = unpack_bits(data);
        let mf = m as f64;
        let sign = if m % 2 == 0 { 1.0 } else { -1.0 };
        // μ uses (−1)^(M+1), the opposite sign of the (−1)^M factor in T_i.
        let mu = mf / 2.0 + (9.0 - sign) / 36.0 - (mf / 3.0 + 2.0 / 9.0) / 2.0f64.powf(mf);
        // T_i = (−1)^M (L_i − μ) + 2/9, binned at half-integer boundaries.
        let mut observed = [0u64; 7];
        let mut mean_complexity = 0.0;
        for block in 0..num_blocks {
            let l = berlekamp_massey(&bits[block * m..(block + 1) * m]);
            mean_complexity += l as f64;
            let t = sign * (l as f64 - mu) + 2.0 / 9.0;
            let bin = if t <= -2.5 {
                0
            } else if t <= -1.5 {
                1
            } else if t <= -0.5 {
                2
            } else if t <= 0.5 {
                3
            } else if t <= 1.5 {
                4
            } else if t <= 2.5 {
                5
            } else {
                6
            };
            observed[bin] += 1;
        }
        mean_complexity /= num_blocks as f64;

        let nf = num_blocks as f64;
        let chi_squared: f64 = observed
            .iter()
            .zip(LC_PI.iter())
            .map(|(&v, &pi)| {
                let expected = nf * pi;
                (v as f64 - expected).powi(2) / expected
            })
            .sum();
        let p = igamc(3.0, chi_squared / 2.0);
        vec![TestResult::from_p_value(
            self.name(),
            p,
            alpha,
            metrics![
                ("block_size", m),
                ("num_blocks", num_blocks),
                ("mean_complexity", mean_complexity),
                ("mu", mu),
                ("chi_squared", chi_squared),
            ],
        )]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Serial
// ═══════════════════════════════════════════════════════════════════════════

/// `ψ²_m` from overlapping m-bit pattern counts with wraparound.
fn psi_squared(bits: &[u8], m: usize) -> f64 {
    if m == 0 {
        return 0.0;
    }
    let n = bits.len();
    let num_patterns = 1usize << m;
    let mask = num_patterns - 1;
    let mut counts = vec![0u64; num_patterns];

    // Seed the window with the first m−1 bits, then slide across all n
    // positions, wrapping at the end.
    let mut window = 0usize;
    for &bit in &bits[..m - 1] {
        window = (window << 1) | bit as usize;
    }
    for i in 0..n {
        window = ((window << 1) | bits[(i + m - 1) % n] as usize) & mask;
        counts[window] += 1;
    }

    let sum_squares: f64 = counts.iter().map(|&c| (c as f64) * (c as f64)).sum();
    sum_squares * num_patterns as f64 / n as f64 - n as f64
}

/// Serial test: uniformity of overlapping m-bit patterns, two p-values from
/// the first and second ψ² differences.
#[derive(Debug, Clone, Copy)]
pub struct SerialTest {
    pattern_len: usize,
}

impl SerialTest {
    pub fn with_pattern_len(pattern_len: usize) -> Self {
        assert!(pattern_len >= 3, "serial test needs m >= 3");
        Self { pattern_len }
    }
}

impl Default for SerialTest {
    fn default() -> Self {
        Self { pattern_len: 4 }
    }
}

impl StatisticalTest for SerialTest {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult> {
        let n = data.len();
        let m = self.pattern_len;
        if n < (1 << m) + 10 {
            return vec![TestResult::input_too_short(self.name(), (1 << m) + 10, n)];
        }

        let bits = unpack_bits(data);
        let psi_m = psi_squared(&bits, m);
        let psi_m1 = psi_squared(&bits, m - 1);
        let psi_m2 = psi_squared(&bits, m - 2);
        let delta1 = psi_m - psi_m1;
        let delta2 = psi_m - 2.0 * psi_m1 + psi_m2;

        let base = metrics![
            ("pattern_length", m),
            ("psi_squared", psi_m),
            ("delta1", delta1),
            ("delta2", delta2),
        ];
        vec![
            TestResult::from_p_value(
                "serial.p1",
                igamc(2.0f64.powi(m as i32 - 2), delta1 / 2.0),
                alpha,
                base.clone(),
            ),
            TestResult::from_p_value(
                "serial.p2",
                igamc(2.0f64.powi(m as i32 - 3), delta2 / 2.0),
                alpha,
                base,
            ),
        ]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Approximate entropy
// ═══════════════════════════════════════════════════════════════════════════

/// Approximate entropy: compares m and m+1 pattern frequencies.
#[derive(Debug, Clone, Copy)]
pub struct ApproximateEntropyTest {
    pattern_len: usize,
}

impl ApproximateEntropyTest {
    pub fn with_pattern_len(pattern_len: usize) -> Self {
        assert!(pattern_len >= 1, "approximate entropy needs m >= 1");
        Self { pattern_len }
    }
}

impl Default for ApproximateEntropyTest {
    fn default() -> Self {
        Self { pattern_len: 3 }
    }
}

impl ApproximateEntropyTest {
    /// `φ(m) = Σ π_i ln π_i` over overlapping m-bit patterns with wrap.
    fn phi(bits: &[u8], m: usize) -> f64 {
        let n = bits.len();
        let num_patterns = 1usize << m;
        let mask = num_patterns - 1;
        let mut counts = vec![0u64; num_patterns];
        let mut window = 0usize;
        for &bit in &bits[..m - 1] {
            window = (window << 1) | bit as usize;
        }
        for i in 0..n {
            window = ((window << 1) | bits[(i + m - 1) % n] as usize) & mask;
            counts[window] += 1;
        }
        counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let pi = c as f64 / n as f64;
                pi * pi.ln()
            })
            .sum()
    }
}

impl StatisticalTest for ApproximateEntropyTest {
    fn name(&self) -> &'static str {
        "entropy.approximate"
    }

    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult> {
        let n = data.len();
        let m = self.pattern_len;
        if n < 100 {
            return vec![TestResult::input_too_short(self.name(), 100, n)];
        }

        let bits = unpack_bits(data);
        let apen = Self::phi(&bits, m) - Self::phi(&bits, m + 1);
        let chi_squared = 2.0 * n as f64 * (std::f64::consts::LN_2 - apen);
        let p = igamc(2.0f64.powi(m as i32 - 1), chi_squared / 2.0);
        vec![TestResult::from_p_value(
            self.name(),
            p,
            alpha,
            metrics![
                ("pattern_length", m),
                ("apen", apen),
                ("chi_squared", chi_squared),
            ],
        )]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::{REJECTION_FLOOR, random_field};

    #[test]
    fn berlekamp_massey_known_sequences() {
        assert_eq!(berlekamp_massey(&[0, 0, 0, 0]), 0);
        assert_eq!(berlekamp_massey(&[1, 0, 0, 0]), 1);
        // First one at index k needs an LFSR of length k + 1.
        assert_eq!(berlekamp_massey(&[0, 0, 1]), 3);
        // Alternating bits come from a 2-stage register.
        assert_eq!(berlekamp_massey(&[1, 0, 1, 0, 1, 0, 1, 0]), 2);
    }

    #[test]
    fn linear_complexity_random_data_is_not_rejected() {
        let field = random_field(125_000, 0x50);
        let r = &LinearComplexityTest::default().execute(&field, 0.01)[0];
        assert!(r.p_value > REJECTION_FLOOR, "p = {}", r.p_value);
        // Random blocks sit tightly around M/2.
        assert!((r.metrics["mean_complexity"] - 250.0).abs() < 2.0);
    }

    #[test]
    fn linear_complexity_periodic_data_fails() {
        // Period-16 data has complexity ~16 in every 500-bit block.
        let field = BitField::from_bytes(&[0xDE, 0xAD].repeat(10_000));
        let r = &LinearComplexityTest::default().execute(&field, 0.01)[0];
        assert!(r.p_value < 1e-12);
        assert!(r.metrics["mean_complexity"] < 20.0);
    }

    #[test]
    fn linear_complexity_short_input_is_an_error() {
        let field = random_field(10, 0x51);
        let r = &LinearComplexityTest::default().execute(&field, 0.01)[0];
        assert_eq!(r.metrics.get("error"), Some(&1.0));
    }

    #[test]
    fn psi_squared_of_alternating_bits() {
        // 0101…: two patterns of each length split all n positions evenly,
        // giving ψ²_m = (2^m / 2 − 1) · n.
        let bits: Vec<u8> = (0..1000).map(|i| (i % 2) as u8).collect();
        let n = 1000.0;
        assert!((psi_squared(&bits, 1) - 0.0).abs() < 1e-9);
        assert!((psi_squared(&bits, 2) - n).abs() < 1e-9);
        assert!((psi_squared(&bits, 3) - 3.0 * n).abs() < 1e-9);
    }

    #[test]
    fn serial_emits_two_p_values() {
        let field = random_field(10_000, 0x52);
        let results = SerialTest::default().execute(&field, 0.01);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].test_name, "serial.p1");
        assert_eq!(results[1].test_name, "serial.p2");
        for r in &results {
            assert!(r.p_value > REJECTION_FLOOR, "{}: p = {}", r.test_name, r.p_value);
        }
    }

    #[test]
    fn serial_alternating_bits_fail() {
        let field = BitField::from_bytes(&[0x55; 1000]);
        let results = SerialTest::default().execute(&field, 0.01);
        assert!(results[0].p_value < 1e-12);
    }

    #[test]
    fn approximate_entropy_random_data_is_not_rejected() {
        let field = random_field(10_000, 0x53);
        let r = &ApproximateEntropyTest::default().execute(&field, 0.01)[0];
        assert!(r.p_value > REJECTION_FLOOR, "p = {}", r.p_value);
    }

    #[test]
    fn approximate_entropy_constant_data_fails() {
        let field = BitField::from_bytes(&vec![0u8; 1000]);
        let r = &ApproximateEntropyTest::default().execute(&field, 0.01)[0];
        assert!(r.p_value < 1e-12);
        assert!((r.metrics["apen"]).abs() < 1e-9);
    }
}
