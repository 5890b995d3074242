//! Binary matrix rank test.
//!
//! Partitions the sequence into 32×32 matrices over GF(2) and compares the
//! distribution of ranks (full, full−1, lower) against the asymptotic
//! probabilities. Linear dependence between substreams — the signature of a
//! linear generator — drags ranks down.

use cascade_core::BitField;
use cascade_core::special::igamc;

use crate::{StatisticalTest, TestResult, metrics};

const M: usize = 32;
const BITS_PER_MATRIX: usize = M * M;
/// Minimum matrix count for the χ² approximation (SP 800-22 §2.5).
const MIN_MATRICES: usize = 38;

/// Asymptotic rank probabilities for random 32×32 GF(2) matrices:
/// full rank, full−1, everything lower.
const P_FULL: f64 = 0.2888;
const P_MINUS_ONE: f64 = 0.5776;
const P_LOWER: f64 = 0.1336;

/// Rank of a 32×32 GF(2) matrix, rows packed one `u32` each (column `c` at
/// bit `31 - c`). Plain Gauss-Jordan; row XOR is one instruction here.
fn gf2_rank(rows: &mut [u32; M]) -> usize {
    let mut rank = 0;
    for col in 0..M {
        let mask = 1u32 << (31 - col);
        if let Some(pivot_row) = (rank..M).find(|&r| rows[r] & mask != 0) {
            rows.swap(rank, pivot_row);
            let pivot = rows[rank];
            for (r, row) in rows.iter_mut().enumerate() {
                if r != rank && *row & mask != 0 {
                    *row ^= pivot;
                }
            }
            rank += 1;
        }
    }
    rank
}

/// 32×32 GF(2) rank distribution test.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixRankTest;

impl StatisticalTest for MatrixRankTest {
    fn name(&self) -> &'static str {
        "matrix.rank"
    }

    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult> {
        let n = data.len();
        let num_matrices = n / BITS_PER_MATRIX;
        if num_matrices < MIN_MATRICES {
            return vec![TestResult::input_too_short(
                self.name(),
                MIN_MATRICES * BITS_PER_MATRIX,
                n,
            )];
        }

        let mut full = 0u64;
        let mut minus_one = 0u64;
        for matrix in 0..num_matrices {
            let base = matrix * BITS_PER_MATRIX;
            let mut rows = [0u32; M];
            for (r, row) in rows.iter_mut().enumerate() {
                let mut word = 0u32;
                for c in 0..M {
                    word = (word << 1) | u32::from(data.get(base + r * M + c));
                }
                *row = word;
            }
            match gf2_rank(&mut rows) {
                32 => full += 1,
                31 => minus_one += 1,
                _ => {}
            }
        }
        let lower = num_matrices as u64 - full - minus_one;

        let nf = num_matrices as f64;
        let chi_squared = (full as f64 - nf * P_FULL).powi(2) / (nf * P_FULL)
            + (minus_one as f64 - nf * P_MINUS_ONE).powi(2) / (nf * P_MINUS_ONE)
            + (lower as f64 - nf * P_LOWER).powi(2) / (nf * P_LOWER);
        // df = 2, where Q(1, χ²/2) reduces to exp(−χ²/2).
        let p = igamc(1.0, chi_squared / 2.0);
        vec![TestResult::from_p_value(
            self.name(),
            p,
            alpha,
            metrics![
                ("num_matrices", num_matrices),
                ("full_rank", full),
                ("rank_minus_one", minus_one),
                ("lower_rank", lower),
                ("chi_squared", chi_squared),
            ],
        )]
    }
}
