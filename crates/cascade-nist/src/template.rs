//! Template matching tests.
//!
//! The non-overlapping test scans for each template from the SP 800-22
//! aperiodic set and χ²-compares per-block hit counts against the
//! theoretical mean. The set is generated rather than tabulated: the
//! canonical templates are exactly the bifix-free bit strings of the chosen
//! length (148 of them at the default m = 9), in ascending numeric order.
//!
//! The overlapping test uses the canonical all-ones template with the
//! SP 800-22 parameterization (m = 9, M = 1032, K = 5) and its published
//! category probabilities.

use cascade_core::BitField;
use cascade_core::special::igamc;

use crate::{StatisticalTest, TestResult, metrics, unpack_bits};

// ═══════════════════════════════════════════════════════════════════════════
// Canonical template set
// ═══════════════════════════════════════════════════════════════════════════

/// All aperiodic (bifix-free) templates of `m` bits, ascending. A template
/// is aperiodic when no proper prefix equals the suffix of the same length,
/// so shifted copies of it can never overlap a match.
pub fn aperiodic_templates(m: usize) -> Vec<u32> {
    assert!((2..=16).contains(&m), "template length {m} out of range");
    (0..1u32 << m)
        .filter(|&pattern| {
            (1..m).all(|border| {
                let prefix = pattern >> border;
                let suffix = pattern & ((1 << (m - border)) - 1);
                prefix != suffix
            })
        })
        .collect()
}

fn template_name(pattern: u32, m: usize) -> String {
    format!("template.non_overlapping.{pattern:0width$b}", width = m)
}

// ═══════════════════════════════════════════════════════════════════════════
// Non-overlapping template matching
// ═══════════════════════════════════════════════════════════════════════════

/// Non-overlapping template matching over N blocks, one result per template.
///
/// On a match the scan advances past the whole template; between matches it
/// slides one bit at a time.
#[derive(Debug, Clone)]
pub struct NonOverlappingTemplateTest {
    template_len: usize,
    num_blocks: usize,
    templates: Vec<u32>,
}

impl NonOverlappingTemplateTest {
    /// The full canonical set for templates of `m` bits, N = 8 blocks.
    pub fn with_template_len(m: usize) -> Self {
        Self {
            template_len: m,
            num_blocks: 8,
            templates: aperiodic_templates(m),
        }
    }

    /// A single template out of the canonical parameterization. Panics if
    /// `pattern` is not aperiodic for length `m`.
    pub fn for_template(pattern: u32, m: usize) -> Self {
        assert!(
            aperiodic_templates(m).contains(&pattern),
            "{pattern:#b} is not an aperiodic template of length {m}"
        );
        Self {
            template_len: m,
            num_blocks: 8,
            templates: vec![pattern],
        }
    }
}

impl Default for NonOverlappingTemplateTest {
    fn default() -> Self {
        Self::with_template_len(9)
    }
}

impl StatisticalTest for NonOverlappingTemplateTest {
    fn name(&self) -> &'static str {
        "template.non_overlapping"
    }

    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult> {
        let n = data.len();
        let m = self.template_len;
        let big_n = self.num_blocks;
        let big_m = n / big_n;
        if big_m < m + 1 {
            return vec![TestResult::input_too_short(
                self.name(),
                big_n * (m + 1),
                n,
            )];
        }

        let bits = unpack_bits(data);
        let mu = (big_m - m + 1) as f64 / (1u64 << m) as f64;
        let two_m = (1u64 << m) as f64;
        let sigma_squared = big_m as f64 * (1.0 / two_m) * (1.0 - (2.0 * m as f64 - 1.0) / two_m);
        let mask = (1u32 << m) - 1;

        self.templates
            .iter()
            .map(|&pattern| {
                let mut chi_squared = 0.0;
                for block in 0..big_n {
                    let start = block * big_m;
                    let block_bits = &bits[start..start + big_m];
                    // Rolling m-bit window; on a hit, jump past the match.
                    let mut hits = 0u64;
                    let mut window = 0u32;
                    let mut filled = 0usize;
                    let mut pos = 0usize;
                    while pos < big_m {
                        window = ((window << 1) | u32::from(block_bits[pos])) & mask;
                        filled += 1;
                        pos += 1;
                        if filled >= m && window == pattern {
                            hits += 1;
                            filled = 0;
                            window = 0;
                        }
                    }
                    let diff = hits as f64 - mu;
                    chi_squared += diff * diff / sigma_squared;
                }
                let p = igamc(big_n as f64 / 2.0, chi_squared / 2.0);
                TestResult::from_p_value(
                    template_name(pattern, m),
                    p,
                    alpha,
                    metrics![
                        ("template", pattern),
                        ("template_length", m),
                        ("block_size", big_m),
                        ("num_blocks", big_n),
                        ("mu", mu),
                        ("sigma_squared", sigma_squared),
                        ("chi_squared", chi_squared),
                    ],
                )
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Overlapping template matching
// ═══════════════════════════════════════════════════════════════════════════

/// SP 800-22 parameterization for the overlapping test.
const OVL_M: usize = 9;
const OVL_BLOCK: usize = 1032;
const OVL_K: usize = 5;
/// Published category probabilities for m=9, M=1032, K=5.
const OVL_PI: [f64; OVL_K + 1] = [
    0.364091, 0.185659, 0.139381, 0.100571, 0.070432, 0.139865,
];

/// Overlapping all-ones template matching: counts per 1032-bit block are
/// binned into {0, 1, 2, 3, 4, ≥5} and χ²-tested against [`OVL_PI`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlappingTemplateTest;

impl StatisticalTest for OverlappingTemplateTest {
    fn name(&self) -> &'static str {
        "template.overlapping"
    }

    fn execute(&self, data: &BitField, alpha: f64) -> Vec<TestResult> {
        let n = data.len();
        let num_blocks = n / OVL_BLOCK;
        if num_blocks == 0 {
            return vec![TestResult::input_too_short(self.name(), OVL_BLOCK, n)];
        }

        let bits = unpack_bits(data);
        let mut v = [0u64; OVL_K + 1];
        for block in 0..num_blocks {
            let start = block * OVL_BLOCK;
            let block_bits = &bits[start..start + OVL_BLOCK];
            let mut matches = 0usize;
            let mut run = 0usize;
            // The all-ones template matches wherever the trailing run of
            // ones reaches m, advancing one bit at a time.
            for &bit in block_bits {
                if bit == 1 {
                    run += 1;
                    if run >= OVL_M {
                        matches += 1;
                    }
                } else {
                    run = 0;
                }
            }
            v[matches.min(OVL_K)] += 1;
        }

        let lambda = (OVL_BLOCK - OVL_M + 1) as f64 / (1u64 << OVL_M) as f64;
        let nf = num_blocks as f64;
        let chi_squared: f64 = v
            .iter()
            .zip(OVL_PI.iter())
            .map(|(&observed, &pi)| {
                let expected = nf * pi;
                (observed as f64 - expected).powi(2) / expected
            })
            .sum();
        let p = igamc(OVL_K as f64 / 2.0, chi_squared / 2.0);
        vec![TestResult::from_p_value(
            self.name(),
            p,
            alpha,
            metrics![
                ("template_length", OVL_M),
                ("block_size", OVL_BLOCK),
                ("num_blocks", num_blocks),
                ("lambda", lambda),
                ("eta", lambda / 2.0),
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
    fn canonical_template_counts() {
        // Bifix-free binary strings: 6 of length 4, 148 of length 9.
        assert_eq!(aperiodic_templates(2).len(), 2);
        assert_eq!(aperiodic_templates(4).len(), 6);
        assert_eq!(aperiodic_templates(9).len(), 148);
    }

    #[test]
    fn known_templates_are_classified_correctly() {
        let set = aperiodic_templates(9);
        assert!(set.contains(&0b000000001));
        assert!(set.contains(&0b011111111));
        // 101010101 overlaps itself shifted by two.
        assert!(!set.contains(&0b101010101));
        // All-ones overlaps itself at every shift.
        assert!(!set.contains(&0b111111111));
        // Sorted ascending, first element is 000000001.
        assert_eq!(set[0], 1);
    }

    #[test]
    fn non_overlapping_counts_respect_the_jump() {
        // 0011 0011 0011 … : template 0011 occurs back to back; the
        // non-overlap rule must count every occurrence exactly once.
        let field = BitField::from_bytes(&[0x33; 80]); // 640 bits, 8 × 80
        let test = NonOverlappingTemplateTest::for_template(0b0011, 4);
        let r = &test.execute(&field, 0.01)[0];
        // Each 80-bit block holds 20 disjoint 0011 patterns, far above the
        // expected (80 - 4 + 1) / 16 ≈ 4.8.
        assert!(r.p_value < 1e-12);
        assert!(!r.passed);
        assert_eq!(r.metrics["template"], 3.0);
    }

    #[test]
    fn non_overlapping_default_emits_one_result_per_template() {
        let field = random_field(4000, 0x30);
        let results = NonOverlappingTemplateTest::default().execute(&field, 0.01);
        assert_eq!(results.len(), 148);
        assert!(results[0].test_name.starts_with("template.non_overlapping."));
    }

    #[test]
    fn non_overlapping_single_template_on_random_data() {
        let field = random_field(125_000, 0x31);
        let test = NonOverlappingTemplateTest::for_template(0b000000001, 9);
        let r = &test.execute(&field, 0.01)[0];
        assert!(r.p_value > REJECTION_FLOOR, "p = {}", r.p_value);
    }

    #[test]
    fn non_overlapping_short_input_is_an_error() {
        let field = random_field(8, 0x32);
        let r = &NonOverlappingTemplateTest::default().execute(&field, 0.01)[0];
        assert_eq!(r.metrics.get("error"), Some(&1.0));
    }

    #[test]
    fn overlapping_random_data_is_not_rejected() {
        let field = random_field(125_000, 0x33);
        let r = &OverlappingTemplateTest.execute(&field, 0.01)[0];
        assert!(r.p_value > REJECTION_FLOOR, "p = {}", r.p_value);
        assert_eq!(r.metrics["lambda"], 2.0);
    }

    #[test]
    fn overlapping_all_ones_fails_hard() {
        let field = BitField::from_bytes(&vec![0xFF; 13_000]);
        let r = &OverlappingTemplateTest.execute(&field, 0.01)[0];
        assert!(r.p_value < 1e-12);
        assert!(!r.passed);
    }

    #[test]
    fn overlapping_short_input_is_an_error() {
        let field = random_field(100, 0x34); // 800 bits < one block
        let r = &OverlappingTemplateTest.execute(&field, 0.01)[0];
        assert_eq!(r.metrics.get("error"), Some(&1.0));
    }
}
