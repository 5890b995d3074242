//! Discrete Fourier transform (spectral) test.
//!
//! Maps bits to ±1, takes the DFT, and counts how many of the first n/2
//! moduli stay below the 95% threshold `T = √(n·ln(1/0.05))`. Periodic
//! structure concentrates power into few bins and pushes the count away
//! from its expectation.

use cascade_core::BitField;
use cascade_core::special::erfc;
use rustfft::{FftPlanner, num_complex::Complex};

use crate::{StatisticalTest, TestResult, metrics, unpack_bits};

/// Spectral test. The FFT keeps this O(n log n); a naive transform would be
/// unusable at realistic input sizes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DftTest;

impl StatisticalTest for DftTest {
    fn name(&self) -> &'static str {
        "spectral.dft"
    }

    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult> {
        let n = data.len();
        if n < 1000 {
            return vec![TestResult::input_too_short(self.name(), 1000, n)];
        }

        let mut buffer: Vec<Complex<f64>> = unpack_bits(data)
            .into_iter()
            .map(|bit| Complex {
                re: if bit == 1 { 1.0 } else { -1.0 },
                im: 0.0,
            })
            .collect();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        let half = n / 2;
        let threshold = (n as f64 * (1.0 / 0.05f64).ln()).sqrt();
        let below = buffer[..half]
            .iter()
            .filter(|c| c.norm() < threshold)
            .count() as f64;
        let expected = 0.95 * half as f64;
        let d = (below - expected) / (n as f64 * 0.95 * 0.05 / 4.0).sqrt();
        let p = erfc(d.abs() / 2.0f64.sqrt());
        vec![TestResult::from_p_value(
            self.name(),
            p,
            alpha,
            metrics![
                ("threshold", threshold),
                ("below_threshold", below),
                ("expected_below", expected),
                ("d_statistic", d),
            ],
        )]
    }
}
