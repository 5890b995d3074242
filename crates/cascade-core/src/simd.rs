//! Vector-tier dispatch and the per-tier CA step kernels.
//!
//! The hot loop of a CA step is embarrassingly data-parallel, and for the
//! one-dimensional neighborhood it vectorizes perfectly: the truth-table
//! lookup `(rule >> pattern) & 1` expands into a fixed boolean combination of
//! the left/center/right neighbor streams, which are themselves just shifted
//! copies of the packed bit field. Every tier computes exactly that boolean
//! form, so all tiers are bit-identical to the scalar path by construction.
//!
//! The two-dimensional neighborhoods count live neighbors across grid rows;
//! those run on the shared per-cell path at every tier, matching the
//! reference processor.
//!
//! # Runtime dispatch
//!
//! [`KernelDispatch::new`] takes the opaque [`VectorTier`] token produced by
//! the CPU-feature collaborator, verifies the named tier is actually usable
//! on the running CPU (downgrading otherwise — a compiled path may be absent
//! for the current target), and resolves a step function pointer once. The
//! per-chunk calls then go through a direct function pointer with no
//! per-cell dispatch.

use std::fmt;

use crate::bitfield::BitField;
use crate::ca::{
    self, CaNeighborhood, CaRule, GridGeometry, next_moore, next_one_dimensional,
    next_von_neumann,
};

// ---------------------------------------------------------------------------
// Vector tier token
// ---------------------------------------------------------------------------

/// Opaque SIMD capability token, ordered weakest to strongest.
///
/// The core never detects CPU features on its own behalf; this token arrives
/// from the front end. Unsupported or absent tiers degrade to the strongest
/// compiled path below them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VectorTier {
    Scalar,
    Sse2,
    Avx,
    Avx2,
    Avx512f,
    Avx512Vnni,
    Neon,
}

impl fmt::Display for VectorTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::Sse2 => write!(f, "sse2"),
            Self::Avx => write!(f, "avx"),
            Self::Avx2 => write!(f, "avx2"),
            Self::Avx512f => write!(f, "avx512f"),
            Self::Avx512Vnni => write!(f, "avx512vnni"),
            Self::Neon => write!(f, "neon"),
        }
    }
}

impl VectorTier {
    /// Next tier to try when this one is unsupported on the running CPU.
    fn downgrade(self) -> Option<Self> {
        match self {
            Self::Avx512Vnni => Some(Self::Avx512f),
            Self::Avx512f => Some(Self::Avx2),
            Self::Avx2 => Some(Self::Avx),
            Self::Avx => Some(Self::Sse2),
            Self::Sse2 | Self::Neon => Some(Self::Scalar),
            Self::Scalar => None,
        }
    }

    /// Whether this tier's kernel can run on the current CPU.
    fn usable(self) -> bool {
        match self {
            Self::Scalar => true,
            #[cfg(target_arch = "x86_64")]
            Self::Sse2 => true, // baseline on x86_64
            #[cfg(target_arch = "x86_64")]
            Self::Avx => is_x86_feature_detected!("avx"),
            #[cfg(target_arch = "x86_64")]
            Self::Avx2 => is_x86_feature_detected!("avx2"),
            #[cfg(target_arch = "x86_64")]
            Self::Avx512f => is_x86_feature_detected!("avx512f"),
            #[cfg(target_arch = "x86_64")]
            Self::Avx512Vnni => {
                is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512vnni")
            }
            #[cfg(target_arch = "aarch64")]
            Self::Neon => true, // baseline on aarch64
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Step parameters and dispatcher
// ---------------------------------------------------------------------------

/// Borrowed inputs for one CA step over a byte range.
pub struct StepParams<'a> {
    /// Source field, read-only for the whole iteration.
    pub src: &'a BitField,
    pub rule: &'a CaRule,
    pub neighborhood: CaNeighborhood,
    pub geom: GridGeometry,
}

/// A kernel writes the next states of bits `[8 * byte_start, 8 * byte_start
/// + 8 * dst.len())` (clipped to the field length) into `dst`.
type StepRangeFn = fn(&StepParams<'_>, &mut [u8], usize);

/// Resolved CA kernel for one tier. Built once per run.
#[derive(Clone, Copy)]
pub struct KernelDispatch {
    tier: VectorTier,
    step_fn: StepRangeFn,
}

impl KernelDispatch {
    /// Resolve the kernel for `requested`, downgrading past tiers the
    /// running CPU cannot execute or that were not compiled for this target.
    pub fn new(requested: VectorTier) -> Self {
        let mut tier = requested;
        while !tier.usable() {
            tier = tier.downgrade().unwrap_or(VectorTier::Scalar);
        }
        let step_fn: StepRangeFn = match tier {
            VectorTier::Scalar => step_range_scalar,
            #[cfg(target_arch = "x86_64")]
            VectorTier::Sse2 | VectorTier::Avx => step_range_sse2,
            #[cfg(target_arch = "x86_64")]
            VectorTier::Avx2 => step_range_avx2,
            #[cfg(target_arch = "x86_64")]
            VectorTier::Avx512f | VectorTier::Avx512Vnni => step_range_avx512,
            #[cfg(target_arch = "aarch64")]
            VectorTier::Neon => step_range_neon,
            #[allow(unreachable_patterns)]
            _ => step_range_scalar,
        };
        Self { tier, step_fn }
    }

    /// The tier actually selected after downgrade.
    pub fn tier(&self) -> VectorTier {
        self.tier
    }

    /// Apply one CA step to the bits covered by `dst`, which starts at byte
    /// `byte_start` of the destination field.
    #[inline]
    pub fn step_range(&self, params: &StepParams<'_>, dst: &mut [u8], byte_start: usize) {
        (self.step_fn)(params, dst, byte_start)
    }
}

// ---------------------------------------------------------------------------
// Shared per-cell path (2-D neighborhoods, custom rules, boundary bytes)
// ---------------------------------------------------------------------------

/// Per-cell evaluation for an arbitrary byte range. Handles every
/// rule/neighborhood combination; the vector paths only replace it for the
/// 1-D interior.
fn step_range_cells(params: &StepParams<'_>, dst: &mut [u8], byte_start: usize) {
    let src = params.src;
    let n = src.len();
    let code = params.rule.code();
    for (bi, out_byte) in dst.iter_mut().enumerate() {
        let lo = (byte_start + bi) * 8;
        let hi = (lo + 8).min(n);
        let mut b = 0u8;
        for i in lo..hi {
            let next = match (&params.rule, params.neighborhood) {
                (CaRule::Custom(f), _) => f(src, i),
                (_, CaNeighborhood::OneDimensional) => {
                    next_one_dimensional(code.unwrap_or(0), src, i)
                }
                (_, CaNeighborhood::VonNeumann) => {
                    let k = ca::count_von_neumann(src, params.geom, i);
                    next_von_neumann(code.unwrap_or(0), src.get(i), k)
                }
                (_, CaNeighborhood::Moore) => {
                    let k = ca::count_moore(src, params.geom, i);
                    next_moore(code.unwrap_or(0), src.get(i), k)
                }
            };
            if next {
                b |= 1 << (7 - (i - lo));
            }
        }
        *out_byte = b;
    }
}

/// Next states of one byte of a 1-D field, per-bit with toroidal wrap. Used
/// for the first and last bytes of the field, where neighbors wrap.
fn one_d_boundary_byte(code: u8, src: &BitField, byte_index: usize) -> u8 {
    let n = src.len();
    let lo = byte_index * 8;
    let hi = (lo + 8).min(n);
    let mut b = 0u8;
    for i in lo..hi {
        if next_one_dimensional(code, src, i) {
            b |= 1 << (7 - (i - lo));
        }
    }
    b
}

/// Expand the truth table into a boolean combination of the three neighbor
/// streams. Works for any word-like type through the bit operators, which is
/// what makes every tier bit-identical: they all evaluate this same form.
#[inline]
fn combine_u64(code: u8, l: u64, c: u64, r: u64) -> u64 {
    let mut out = 0u64;
    for p in 0..8u8 {
        if (code >> p) & 1 != 0 {
            let lp = if p & 4 != 0 { l } else { !l };
            let cp = if p & 2 != 0 { c } else { !c };
            let rp = if p & 1 != 0 { r } else { !r };
            out |= lp & cp & rp;
        }
    }
    out
}

/// Scalar u64 interior kernel: bytes `[lo, hi)` must all be interior (no
/// wraparound, all eight bits valid, right neighbor of the last bit exists).
fn one_d_interior_u64(
    code: u8,
    src_bytes: &[u8],
    dst: &mut [u8],
    byte_start: usize,
    lo: usize,
    hi: usize,
) {
    let mut j = lo;
    while j + 8 <= hi {
        let c = u64::from_be_bytes(src_bytes[j..j + 8].try_into().unwrap());
        let prev = u64::from(src_bytes[j - 1]);
        let next = u64::from(src_bytes[j + 8]);
        let l = (c >> 1) | ((prev & 1) << 63);
        let r = (c << 1) | (next >> 7);
        let out = combine_u64(code, l, c, r);
        dst[j - byte_start..j - byte_start + 8].copy_from_slice(&out.to_be_bytes());
        j += 8;
    }
    while j < hi {
        let c = u64::from(src_bytes[j]);
        let l = ((c >> 1) | ((u64::from(src_bytes[j - 1]) & 1) << 7)) & 0xff;
        let r = ((c << 1) & 0xff) | (u64::from(src_bytes[j + 1]) >> 7);
        dst[j - byte_start] = combine_u64(code, l, c, r) as u8;
        j += 1;
    }
}

/// Drive a 1-D step over `[byte_start, byte_start + dst.len())`: boundary
/// bytes go per-bit, interior runs go through `interior`.
///
/// A byte is interior when its left neighbor byte exists, all eight of its
/// bits are field bits, and the right neighbor of its last bit is still in
/// the field — i.e. bytes `1 ..= (n - 9) / 8` for `n >= 9`.
fn one_d_range(
    code: u8,
    src: &BitField,
    dst: &mut [u8],
    byte_start: usize,
    interior: impl Fn(u8, &[u8], &mut [u8], usize, usize, usize),
) {
    let n = src.len();
    let end = byte_start + dst.len();
    let interior_end = if n >= 9 { (n - 9) / 8 + 1 } else { 0 };
    let src_bytes = src.as_bytes();

    let mut j = byte_start;
    while j < end {
        if j >= 1 && j < interior_end {
            let run_end = end.min(interior_end);
            interior(code, src_bytes, &mut *dst, byte_start, j, run_end);
            j = run_end;
        } else {
            dst[j - byte_start] = one_d_boundary_byte(code, src, j);
            j += 1;
        }
    }
}

/// Scalar tier entry point.
fn step_range_scalar(params: &StepParams<'_>, dst: &mut [u8], byte_start: usize) {
    match (params.rule.code(), params.neighborhood) {
        (Some(code), CaNeighborhood::OneDimensional) => {
            one_d_range(code, params.src, dst, byte_start, one_d_interior_u64);
        }
        _ => step_range_cells(params, dst, byte_start),
    }
}

// ---------------------------------------------------------------------------
// x86_64 tiers
// ---------------------------------------------------------------------------

#[cfg(target_arch = "x86_64")]
fn step_range_sse2(params: &StepParams<'_>, dst: &mut [u8], byte_start: usize) {
    match (params.rule.code(), params.neighborhood) {
        (Some(code), CaNeighborhood::OneDimensional) => {
            one_d_range(code, params.src, dst, byte_start, |c, s, d, bs, lo, hi| {
                // SAFETY: KernelDispatch::new only selects this path when
                // SSE2 is available (baseline on x86_64).
                unsafe { x86::interior_sse2(c, s, d, bs, lo, hi) }
            });
        }
        _ => step_range_cells(params, dst, byte_start),
    }
}

#[cfg(target_arch = "x86_64")]
fn step_range_avx2(params: &StepParams<'_>, dst: &mut [u8], byte_start: usize) {
    match (params.rule.code(), params.neighborhood) {
        (Some(code), CaNeighborhood::OneDimensional) => {
            one_d_range(code, params.src, dst, byte_start, |c, s, d, bs, lo, hi| {
                // SAFETY: KernelDispatch::new verified AVX2 support.
                unsafe { x86::interior_avx2(c, s, d, bs, lo, hi) }
            });
        }
        _ => step_range_cells(params, dst, byte_start),
    }
}

#[cfg(target_arch = "x86_64")]
fn step_range_avx512(params: &StepParams<'_>, dst: &mut [u8], byte_start: usize) {
    match (params.rule.code(), params.neighborhood) {
        (Some(code), CaNeighborhood::OneDimensional) => {
            one_d_range(code, params.src, dst, byte_start, |c, s, d, bs, lo, hi| {
                // SAFETY: KernelDispatch::new verified AVX-512F support.
                unsafe { x86::interior_avx512(c, s, d, bs, lo, hi) }
            });
        }
        _ => step_range_cells(params, dst, byte_start),
    }
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    //! Interior 1-D kernels on 128/256/512-bit registers.
    //!
    //! The neighbor streams are built with 64-bit lane shifts plus per-byte
    //! masks; bits that a lane shift drags across a byte boundary are masked
    //! off, and the byte that crosses a *register* boundary is supplied by a
    //! one-byte-offset unaligned load of the source. Loads at `j - 1` and
    //! `j + width` stay in bounds because the range only covers interior
    //! bytes (the last interior byte always has a successor byte).

    use super::one_d_interior_u64;
    use core::arch::x86_64::*;

    /// # Safety
    /// Requires SSE2; `[lo, hi)` must be interior bytes of the field.
    #[target_feature(enable = "sse2")]
    pub(super) unsafe fn interior_sse2(
        code: u8,
        src: &[u8],
        dst: &mut [u8],
        byte_start: usize,
        lo: usize,
        hi: usize,
    ) {
        let m7f = _mm_set1_epi8(0x7f);
        let m01 = _mm_set1_epi8(0x01);
        let mfe = _mm_set1_epi8(0xfeu8 as i8);
        let m80 = _mm_set1_epi8(0x80u8 as i8);
        let ones = _mm_set1_epi8(-1);

        let mut j = lo;
        while j + 16 <= hi {
            let c = _mm_loadu_si128(src.as_ptr().add(j).cast());
            let pv = _mm_loadu_si128(src.as_ptr().add(j - 1).cast());
            let nv = _mm_loadu_si128(src.as_ptr().add(j + 1).cast());

            let l = _mm_or_si128(
                _mm_and_si128(_mm_srli_epi64(c, 1), m7f),
                _mm_slli_epi64(_mm_and_si128(pv, m01), 7),
            );
            let r = _mm_or_si128(
                _mm_and_si128(_mm_slli_epi64(c, 1), mfe),
                _mm_srli_epi64(_mm_and_si128(nv, m80), 7),
            );

            let mut out = _mm_setzero_si128();
            for p in 0..8u8 {
                if (code >> p) & 1 != 0 {
                    let lp = if p & 4 != 0 { l } else { _mm_xor_si128(l, ones) };
                    let cp = if p & 2 != 0 { c } else { _mm_xor_si128(c, ones) };
                    let rp = if p & 1 != 0 { r } else { _mm_xor_si128(r, ones) };
                    out = _mm_or_si128(out, _mm_and_si128(_mm_and_si128(lp, cp), rp));
                }
            }
            _mm_storeu_si128(dst.as_mut_ptr().add(j - byte_start).cast(), out);
            j += 16;
        }
        one_d_interior_u64(code, src, dst, byte_start, j, hi);
    }

    /// # Safety
    /// Requires AVX2; `[lo, hi)` must be interior bytes of the field.
    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn interior_avx2(
        code: u8,
        src: &[u8],
        dst: &mut [u8],
        byte_start: usize,
        lo: usize,
        hi: usize,
    ) {
        let m7f = _mm256_set1_epi8(0x7f);
        let m01 = _mm256_set1_epi8(0x01);
        let mfe = _mm256_set1_epi8(0xfeu8 as i8);
        let m80 = _mm256_set1_epi8(0x80u8 as i8);
        let ones = _mm256_set1_epi8(-1);

        let mut j = lo;
        while j + 32 <= hi {
            let c = _mm256_loadu_si256(src.as_ptr().add(j).cast());
            let pv = _mm256_loadu_si256(src.as_ptr().add(j - 1).cast());
            let nv = _mm256_loadu_si256(src.as_ptr().add(j + 1).cast());

            let l = _mm256_or_si256(
                _mm256_and_si256(_mm256_srli_epi64(c, 1), m7f),
                _mm256_slli_epi64(_mm256_and_si256(pv, m01), 7),
            );
            let r = _mm256_or_si256(
                _mm256_and_si256(_mm256_slli_epi64(c, 1), mfe),
                _mm256_srli_epi64(_mm256_and_si256(nv, m80), 7),
            );

            let mut out = _mm256_setzero_si256();
            for p in 0..8u8 {
                if (code >> p) & 1 != 0 {
                    let lp = if p & 4 != 0 { l } else { _mm256_xor_si256(l, ones) };
                    let cp = if p & 2 != 0 { c } else { _mm256_xor_si256(c, ones) };
                    let rp = if p & 1 != 0 { r } else { _mm256_xor_si256(r, ones) };
                    out = _mm256_or_si256(out, _mm256_and_si256(_mm256_and_si256(lp, cp), rp));
                }
            }
            _mm256_storeu_si256(dst.as_mut_ptr().add(j - byte_start).cast(), out);
            j += 32;
        }
        one_d_interior_u64(code, src, dst, byte_start, j, hi);
    }

    /// # Safety
    /// Requires AVX-512F; `[lo, hi)` must be interior bytes of the field.
    #[target_feature(enable = "avx512f")]
    pub(super) unsafe fn interior_avx512(
        code: u8,
        src: &[u8],
        dst: &mut [u8],
        byte_start: usize,
        lo: usize,
        hi: usize,
    ) {
        let m7f = _mm512_set1_epi8(0x7f);
        let m01 = _mm512_set1_epi8(0x01);
        let mfe = _mm512_set1_epi8(0xfeu8 as i8);
        let m80 = _mm512_set1_epi8(0x80u8 as i8);
        let ones = _mm512_set1_epi8(-1);

        let mut j = lo;
        while j + 64 <= hi {
            let c = _mm512_loadu_si512(src.as_ptr().add(j).cast());
            let pv = _mm512_loadu_si512(src.as_ptr().add(j - 1).cast());
            let nv = _mm512_loadu_si512(src.as_ptr().add(j + 1).cast());

            let l = _mm512_or_si512(
                _mm512_and_si512(_mm512_srli_epi64(c, 1), m7f),
                _mm512_slli_epi64(_mm512_and_si512(pv, m01), 7),
            );
            let r = _mm512_or_si512(
                _mm512_and_si512(_mm512_slli_epi64(c, 1), mfe),
                _mm512_srli_epi64(_mm512_and_si512(nv, m80), 7),
            );

            let mut out = _mm512_setzero_si512();
            for p in 0..8u8 {
                if (code >> p) & 1 != 0 {
                    let lp = if p & 4 != 0 { l } else { _mm512_xor_si512(l, ones) };
                    let cp = if p & 2 != 0 { c } else { _mm512_xor_si512(c, ones) };
                    let rp = if p & 1 != 0 { r } else { _mm512_xor_si512(r, ones) };
                    out = _mm512_or_si512(out, _mm512_and_si512(_mm512_and_si512(lp, cp), rp));
                }
            }
            _mm512_storeu_si512(dst.as_mut_ptr().add(j - byte_start).cast(), out);
            j += 64;
        }
        one_d_interior_u64(code, src, dst, byte_start, j, hi);
    }
}

// ---------------------------------------------------------------------------
// aarch64 tier
// ---------------------------------------------------------------------------

#[cfg(target_arch = "aarch64")]
fn step_range_neon(params: &StepParams<'_>, dst: &mut [u8], byte_start: usize) {
    match (params.rule.code(), params.neighborhood) {
        (Some(code), CaNeighborhood::OneDimensional) => {
            one_d_range(code, params.src, dst, byte_start, |c, s, d, bs, lo, hi| {
                // SAFETY: NEON is baseline on aarch64.
                unsafe { neon::interior_neon(c, s, d, bs, lo, hi) }
            });
        }
        _ => step_range_cells(params, dst, byte_start),
    }
}

#[cfg(target_arch = "aarch64")]
mod neon {
    //! 128-bit NEON interior kernel. NEON has native per-byte shifts, so the
    //! neighbor streams need no masking: the shifts discard the bits that
    //! would cross byte boundaries.

    use super::one_d_interior_u64;
    use core::arch::aarch64::*;

    /// # Safety
    /// Requires NEON (baseline on aarch64); `[lo, hi)` must be interior
    /// bytes of the field.
    #[target_feature(enable = "neon")]
    pub(super) unsafe fn interior_neon(
        code: u8,
        src: &[u8],
        dst: &mut [u8],
        byte_start: usize,
        lo: usize,
        hi: usize,
    ) {
        let ones = vdupq_n_u8(0xff);
        let mut j = lo;
        while j + 16 <= hi {
            let c = vld1q_u8(src.as_ptr().add(j));
            let pv = vld1q_u8(src.as_ptr().add(j - 1));
            let nv = vld1q_u8(src.as_ptr().add(j + 1));

            let l = vorrq_u8(vshrq_n_u8(c, 1), vshlq_n_u8(pv, 7));
            let r = vorrq_u8(vshlq_n_u8(c, 1), vshrq_n_u8(nv, 7));

            let mut out = vdupq_n_u8(0);
            for p in 0..8u8 {
                if (code >> p) & 1 != 0 {
                    let lp = if p & 4 != 0 { l } else { veorq_u8(l, ones) };
                    let cp = if p & 2 != 0 { c } else { veorq_u8(c, ones) };
                    let rp = if p & 1 != 0 { r } else { veorq_u8(r, ones) };
                    out = vorrq_u8(out, vandq_u8(vandq_u8(lp, cp), rp));
                }
            }
            vst1q_u8(dst.as_mut_ptr().add(j - byte_start), out);
            j += 16;
        }
        one_d_interior_u64(code, src, dst, byte_start, j, hi);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn random_field_seeded(n_bits: usize, seed: u64) -> BitField {
        let mut bytes = Vec::with_capacity(n_bits.div_ceil(8));
        let mut state = seed;
        for _ in 0..n_bits.div_ceil(8) {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            bytes.push((state >> 33) as u8);
        }
        BitField::from_bytes_with_len(&bytes, n_bits)
    }

    /// Per-bit oracle: the definition of one CA step, with no word tricks.
    fn step_oracle(params: &StepParams<'_>) -> BitField {
        let n = params.src.len();
        let mut out = BitField::zeroed(n);
        let mut bytes = vec![0u8; params.src.byte_len()];
        step_range_cells(params, &mut bytes, 0);
        out.as_bytes_mut().copy_from_slice(&bytes);
        out.mask_tail();
        out
    }

    fn run_tier(tier: VectorTier, params: &StepParams<'_>) -> BitField {
        let dispatch = KernelDispatch::new(tier);
        let mut out = BitField::zeroed(params.src.len());
        let nb = out.byte_len();
        dispatch.step_range(params, &mut out.as_bytes_mut()[..nb], 0);
        out.mask_tail();
        out
    }

    fn assert_tier_matches(tier: VectorTier, n_bits: usize, seed: u64) {
        let src = random_field_seeded(n_bits, seed);
        for rule in [CaRule::Rule30, CaRule::Rule82, CaRule::Rule110, CaRule::Rule150] {
            for neighborhood in [
                CaNeighborhood::OneDimensional,
                CaNeighborhood::VonNeumann,
                CaNeighborhood::Moore,
            ] {
                let params = StepParams {
                    src: &src,
                    rule: &rule,
                    neighborhood,
                    geom: GridGeometry::for_field(n_bits, 0),
                };
                let expect = step_oracle(&params);
                let got = run_tier(tier, &params);
                assert_eq!(
                    got, expect,
                    "tier {tier} diverged: rule {rule:?}, {neighborhood}, n={n_bits}"
                );
            }
        }
    }

    #[test]
    fn scalar_matches_oracle() {
        for &n in &[8usize, 24, 64, 100, 256, 1000, 4096, 10_000] {
            assert_tier_matches(VectorTier::Scalar, n, 0xdead_beef ^ n as u64);
        }
    }

    #[test]
    fn compiled_tiers_match_scalar() {
        let mut tiers = vec![VectorTier::Scalar];
        #[cfg(target_arch = "x86_64")]
        {
            tiers.push(VectorTier::Sse2);
            if is_x86_feature_detected!("avx2") {
                tiers.push(VectorTier::Avx2);
            }
            if is_x86_feature_detected!("avx512f") {
                tiers.push(VectorTier::Avx512f);
            }
        }
        #[cfg(target_arch = "aarch64")]
        tiers.push(VectorTier::Neon);

        for tier in tiers {
            for &n in &[64usize, 100, 1000, 4096, 65_536] {
                assert_tier_matches(tier, n, 0x5eed ^ n as u64);
            }
        }
    }

    #[test]
    fn unsupported_tier_downgrades() {
        // NEON can never be selected on x86 and vice versa; the dispatcher
        // must land on something usable rather than an absent path.
        for requested in [
            VectorTier::Scalar,
            VectorTier::Sse2,
            VectorTier::Avx,
            VectorTier::Avx2,
            VectorTier::Avx512f,
            VectorTier::Avx512Vnni,
            VectorTier::Neon,
        ] {
            let dispatch = KernelDispatch::new(requested);
            assert!(dispatch.tier().usable(), "resolved unusable tier for {requested}");
        }
    }

    #[test]
    fn rule150_is_three_term_xor() {
        // Truth-table semantics: rule 150 is left XOR center XOR right.
        let src = random_field_seeded(256, 77);
        let params = StepParams {
            src: &src,
            rule: &CaRule::Rule150,
            neighborhood: CaNeighborhood::OneDimensional,
            geom: GridGeometry::for_field(256, 0),
        };
        let stepped = run_tier(VectorTier::Scalar, &params);
        let n = src.len();
        for i in 0..n {
            let l = src.get(if i == 0 { n - 1 } else { i - 1 });
            let c = src.get(i);
            let r = src.get(if i + 1 == n { 0 } else { i + 1 });
            assert_eq!(stepped.get(i), l ^ c ^ r, "bit {i}");
        }
    }

    #[test]
    fn rule30_single_seed_step() {
        // 10000000 steps to 11000001 under rule 30 with toroidal wrap.
        let src = BitField::from_bytes(&[0b1000_0000]);
        let params = StepParams {
            src: &src,
            rule: &CaRule::Rule30,
            neighborhood: CaNeighborhood::OneDimensional,
            geom: GridGeometry::for_field(8, 0),
        };
        let stepped = run_tier(VectorTier::Scalar, &params);
        assert_eq!(stepped.to_bytes(), vec![0b1100_0001]);
    }

    #[test]
    fn split_ranges_agree_with_full_range() {
        // Writing the destination in several chunks must give the same field
        // as one full-range call: chunk boundaries carry no state.
        let src = random_field_seeded(10_000, 3);
        let params = StepParams {
            src: &src,
            rule: &CaRule::Rule110,
            neighborhood: CaNeighborhood::OneDimensional,
            geom: GridGeometry::for_field(10_000, 0),
        };
        let full = run_tier(VectorTier::Scalar, &params);

        let dispatch = KernelDispatch::new(VectorTier::Scalar);
        let mut chunked = BitField::zeroed(10_000);
        let nb = chunked.byte_len();
        let bytes = chunked.as_bytes_mut();
        let mut start = 0usize;
        for size in [1usize, 7, 64, 300, nb] {
            if start >= nb {
                break;
            }
            let end = (start + size).min(nb);
            dispatch.step_range(&params, &mut bytes[start..end], start);
            start = end;
        }
        chunked.mask_tail();
        assert_eq!(chunked, full);
    }

    #[test]
    fn custom_rule_runs_per_cell_on_every_tier() {
        let src = random_field_seeded(512, 9);
        let rule = CaRule::from_code(30);
        let reference = {
            let params = StepParams {
                src: &src,
                rule: &CaRule::Rule30,
                neighborhood: CaNeighborhood::OneDimensional,
                geom: GridGeometry::for_field(512, 0),
            };
            run_tier(VectorTier::Scalar, &params)
        };
        let params = StepParams {
            src: &src,
            rule: &rule,
            neighborhood: CaNeighborhood::OneDimensional,
            geom: GridGeometry::for_field(512, 0),
        };
        assert_eq!(run_tier(VectorTier::Scalar, &params), reference);
    }
}
