//! Maurer's universal statistical test.
//!
//! Measures the distance between repeated occurrences of L-bit blocks: a
//! compressible sequence revisits patterns sooner than a random one. The
//! first Q blocks initialize a last-seen table, the remaining K blocks
//! accumulate `log2` of their gap to the previous occurrence, and the mean
//! is standardized against the tabulated expectation for L.

use cascade_core::BitField;
use cascade_core::special::erfc;

use crate::{StatisticalTest, TestResult, metrics, unpack_bits};

/// Smallest sequence the SP 800-22 parameter ladder covers (L = 6).
const MIN_BITS: usize = 387_840;

/// `(n threshold, L, Q)` ladder; the largest applicable row wins.
const PARAMS: [(usize, usize, usize); 11] = [
    (387_840, 6, 640),
    (904_960, 7, 1_280),
    (2_068_480, 8, 2_560),
    (4_654_080, 9, 5_120),
    (10_342_400, 10, 10_240),
    (22_753_280, 11, 20_480),
    (50_331_648, 12, 40_960),
    (110_100_480, 13, 81_920),
    (239_075_328, 14, 163_840),
    (516_096_000, 15, 327_680),
    (1_059_061_760, 16, 655_360),
];

/// Tabulated `E[fn]` for L = 6..=16.
const EXPECTED: [f64; 11] = [
    5.217_705_2, 6.196_250_7, 7.183_665_6, 8.176_424_8, 9.172_324_3, 10.170_032, 11.168_765,
    12.168_070, 13.167_693, 14.167_488, 15.167_379,
];

/// Tabulated `Var[fn]` for L = 6..=16.
const VARIANCE: [f64; 11] = [
    2.954, 3.125, 3.238, 3.311, 3.356, 3.384, 3.401, 3.410, 3.416, 3.419, 3.421,
];

/// Maurer's universal test with the standard (L, Q) ladder.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniversalTest;

impl StatisticalTest for UniversalTest {
    fn name(&self) -> &'static str {
        "universal.maurer"
    }

    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult> {
        let n = data.len();
        if n < MIN_BITS {
            return vec![TestResult::input_too_short(self.name(), MIN_BITS, n)];
        }
        let row = PARAMS.iter().rev().find(|&&(min, _, _)| n >= min).unwrap();
        let (_, l, q) = *row;
        let total_blocks = n / l;
        let k = total_blocks - q;

        let bits = unpack_bits(data);
        let block_at = |index: usize| -> usize {
            let start = index * l;
            bits[start..start + l]
                .iter()
                .fold(0usize, |acc, &bit| (acc << 1) | bit as usize)
        };

        let mut last_seen = vec![0usize; 1 << l];
        for i in 0..q {
            last_seen[block_at(i)] = i + 1;
        }

        let mut sum = 0.0f64;
        for i in q..total_blocks {
            let block = block_at(i);
            let previous = last_seen[block];
            let distance = if previous > 0 {
                (i + 1 - previous) as f64
            } else {
                // Block never seen during initialization; the gap spans the
                // whole prefix.
                (i + 1) as f64
            };
            sum += distance.log2();
            last_seen[block] = i + 1;
        }

        let fn_value = sum / k as f64;
        let li = l - 6;
        let expected = EXPECTED[li];
        let kf = k as f64;
        // Finite-K correction to the asymptotic standard deviation.
        let c = 0.7 - 0.8 / l as f64 + (4.0 + 32.0 / l as f64) * kf.powf(-3.0 / l as f64) / 15.0;
        let sigma = c * (VARIANCE[li] / kf).sqrt();
        let p = erfc((fn_value - expected).abs() / (2.0f64.sqrt() * sigma));
        vec![TestResult::from_p_value(
            self.name(),
            p,
            alpha,
            metrics![
                ("L", l),
                ("Q", q),
                ("K", k),
                ("fn", fn_value),
                ("expected", expected),
                ("sigma", sigma),
            ],
        )]
    }
}
