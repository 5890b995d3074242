//! Cellular-automaton rules, neighborhoods, and grid geometry.
//!
//! For the one-dimensional neighborhood the named rules are standard Wolfram
//! codes: an 8-bit truth table indexed by the `(left, center, right)` pattern,
//! with toroidal wrap in the linear index. For the two-dimensional
//! neighborhoods the same rule names map to live-neighbor-count predicates
//! (see [`next_von_neumann`] / [`next_moore`]); out-of-grid neighbors read as
//! dead, and the grid does not wrap.

use std::fmt;
use std::sync::Arc;

use crate::bitfield::BitField;

/// Predicate type for user-supplied rules: `(field, index) -> next state`.
pub type CustomRuleFn = dyn Fn(&BitField, usize) -> bool + Send + Sync;

/// A cellular-automaton rule.
#[derive(Clone)]
pub enum CaRule {
    /// Wolfram rule 30, chaotic.
    Rule30,
    /// Wolfram rule 82, random-like.
    Rule82,
    /// Wolfram rule 110, capable of universal computation.
    Rule110,
    /// Wolfram rule 150, linear (three-term XOR).
    Rule150,
    /// User-defined next-state predicate, evaluated per cell.
    Custom(Arc<CustomRuleFn>),
}

impl CaRule {
    /// The Wolfram code for the named rules; `None` for custom predicates.
    pub fn code(&self) -> Option<u8> {
        match self {
            Self::Rule30 => Some(30),
            Self::Rule82 => Some(82),
            Self::Rule110 => Some(110),
            Self::Rule150 => Some(150),
            Self::Custom(_) => None,
        }
    }

    /// Wrap an arbitrary Wolfram code as a custom 1-D rule with toroidal
    /// wrap. This is how the CLI's `custom:<u8>` rules are built.
    pub fn from_code(code: u8) -> Self {
        Self::Custom(Arc::new(move |field: &BitField, i: usize| {
            let n = field.len();
            let left = field.get(if i == 0 { n - 1 } else { i - 1 });
            let center = field.get(i);
            let right = field.get(if i + 1 == n { 0 } else { i + 1 });
            let pattern = (u8::from(left) << 2) | (u8::from(center) << 1) | u8::from(right);
            (code >> pattern) & 1 != 0
        }))
    }
}

impl fmt::Debug for CaRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rule30 => write!(f, "Rule30"),
            Self::Rule82 => write!(f, "Rule82"),
            Self::Rule110 => write!(f, "Rule110"),
            Self::Rule150 => write!(f, "Rule150"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl fmt::Display for CaRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rule30 => write!(f, "Rule 30 (Chaotic)"),
            Self::Rule82 => write!(f, "Rule 82 (Random-like)"),
            Self::Rule110 => write!(f, "Rule 110 (Universal)"),
            Self::Rule150 => write!(f, "Rule 150 (Linear)"),
            Self::Custom(_) => write!(f, "Custom Rule"),
        }
    }
}

/// Neighborhood topology for a CA step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaNeighborhood {
    /// Left and right neighbors on a ring.
    OneDimensional,
    /// Four cardinal neighbors on the rectangular grid, zero-padded edges.
    VonNeumann,
    /// Eight neighbors including diagonals, zero-padded edges.
    Moore,
}

impl fmt::Display for CaNeighborhood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneDimensional => write!(f, "1-D"),
            Self::VonNeumann => write!(f, "Von Neumann"),
            Self::Moore => write!(f, "Moore"),
        }
    }
}

/// Rectangular interpretation of a bit field for the 2-D neighborhoods.
///
/// Invariant: `width * height >= n_bits`. Cells at linear index `>= n_bits`
/// read as dead and are never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridGeometry {
    pub width: usize,
    pub height: usize,
}

impl GridGeometry {
    /// Geometry for a field of `n_bits` bits. A `width` of 0 selects an
    /// automatic near-square layout (`⌊√n⌋` columns).
    pub fn for_field(n_bits: usize, width: usize) -> Self {
        let width = if width == 0 {
            ((n_bits as f64).sqrt() as usize).max(1)
        } else {
            width
        };
        let height = n_bits.div_ceil(width).max(1);
        Self { width, height }
    }
}

/// Next state from the 1-D truth table: `(rule >> pattern) & 1`.
#[inline]
pub(crate) fn table_bit(code: u8, left: bool, center: bool, right: bool) -> bool {
    let pattern = (u8::from(left) << 2) | (u8::from(center) << 1) | u8::from(right);
    (code >> pattern) & 1 != 0
}

/// 1-D next state for cell `i` with toroidal wrap.
pub(crate) fn next_one_dimensional(code: u8, field: &BitField, i: usize) -> bool {
    let n = field.len();
    let left = field.get(if i == 0 { n - 1 } else { i - 1 });
    let right = field.get(if i + 1 == n { 0 } else { i + 1 });
    table_bit(code, left, field.get(i), right)
}

/// Count live Von Neumann neighbors (N, E, S, W) of cell `i`.
pub(crate) fn count_von_neumann(field: &BitField, geom: GridGeometry, i: usize) -> u32 {
    let (x, y) = (i % geom.width, i / geom.width);
    let mut k = 0u32;
    if y > 0 && field.get_padded(i - geom.width) {
        k += 1;
    }
    if x + 1 < geom.width && field.get_padded(i + 1) {
        k += 1;
    }
    if y + 1 < geom.height && field.get_padded(i + geom.width) {
        k += 1;
    }
    if x > 0 && field.get_padded(i - 1) {
        k += 1;
    }
    k
}

/// Count live Moore neighbors (the eight surrounding cells) of cell `i`.
pub(crate) fn count_moore(field: &BitField, geom: GridGeometry, i: usize) -> u32 {
    let (x, y) = ((i % geom.width) as isize, (i / geom.width) as isize);
    let (w, h) = (geom.width as isize, geom.height as isize);
    let mut k = 0u32;
    for dy in -1..=1 {
        for dx in -1..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let (nx, ny) = (x + dx, y + dy);
            if nx >= 0 && nx < w && ny >= 0 && ny < h {
                let idx = (ny * w + nx) as usize;
                if field.get_padded(idx) {
                    k += 1;
                }
            }
        }
    }
    k
}

/// Von Neumann next-state predicate for the named rules.
pub(crate) fn next_von_neumann(rule_code: u8, alive: bool, k: u32) -> bool {
    match rule_code {
        30 => (alive && k < 2) || (!alive && k >= 2),
        82 => (alive && k < 3) || (!alive && k == 2),
        110 => (alive && k != 4) || (!alive && k >= 1),
        150 => k % 2 == 1,
        _ => alive,
    }
}

/// Moore next-state predicate for the named rules.
pub(crate) fn next_moore(rule_code: u8, alive: bool, k: u32) -> bool {
    match rule_code {
        30 => k == 3 || (alive && k == 2),
        82 => (!alive && k == 3) || (alive && (k == 2 || k == 3)),
        110 => (alive && k < 4) || (!alive && (k == 3 || k == 6)),
        150 => k % 2 == 1,
        _ => alive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_codes() {
        assert_eq!(CaRule::Rule30.code(), Some(30));
        assert_eq!(CaRule::Rule150.code(), Some(150));
        assert_eq!(CaRule::from_code(90).code(), None);
    }

    #[test]
    fn truth_table_rule_30() {
        // Rule 30 = 0b00011110: alive for patterns 1..=4.
        let expect = [false, true, true, true, true, false, false, false];
        for p in 0..8u8 {
            let (l, c, r) = (p & 4 != 0, p & 2 != 0, p & 1 != 0);
            assert_eq!(table_bit(30, l, c, r), expect[p as usize], "pattern {p}");
        }
    }

    #[test]
    fn truth_table_rule_150_is_parity() {
        for p in 0..8u8 {
            let (l, c, r) = (p & 4 != 0, p & 2 != 0, p & 1 != 0);
            assert_eq!(table_bit(150, l, c, r), l ^ c ^ r, "pattern {p}");
        }
    }

    #[test]
    fn custom_code_matches_builtin() {
        let bytes = [0x3C, 0xA5, 0x0F];
        let field = BitField::from_bytes(&bytes);
        let custom = CaRule::from_code(110);
        let CaRule::Custom(f) = &custom else {
            panic!("expected custom rule")
        };
        for i in 0..field.len() {
            assert_eq!(f(&field, i), next_one_dimensional(110, &field, i));
        }
    }

    #[test]
    fn auto_geometry_is_near_square() {
        let geom = GridGeometry::for_field(256, 0);
        assert_eq!(geom.width, 16);
        assert_eq!(geom.height, 16);

        let geom = GridGeometry::for_field(100, 7);
        assert_eq!(geom.width, 7);
        assert_eq!(geom.height, 15);
        assert!(geom.width * geom.height >= 100);
    }

    #[test]
    fn geometry_of_tiny_fields() {
        let geom = GridGeometry::for_field(3, 0);
        assert!(geom.width * geom.height >= 3);
        let geom = GridGeometry::for_field(1, 0);
        assert_eq!((geom.width, geom.height), (1, 1));
    }

    #[test]
    fn von_neumann_counts_edges_as_dead() {
        // 3x3 grid, all alive.
        let mut field = BitField::zeroed(9);
        for i in 0..9 {
            field.set(i, true);
        }
        let geom = GridGeometry { width: 3, height: 3 };
        assert_eq!(count_von_neumann(&field, geom, 0), 2); // corner
        assert_eq!(count_von_neumann(&field, geom, 1), 3); // edge
        assert_eq!(count_von_neumann(&field, geom, 4), 4); // center
        assert_eq!(count_moore(&field, geom, 0), 3);
        assert_eq!(count_moore(&field, geom, 4), 8);
    }

    #[test]
    fn cells_past_field_end_read_dead() {
        // 10 bits in a 4-wide grid: height 3, cells 10 and 11 do not exist.
        let mut field = BitField::zeroed(10);
        for i in 0..10 {
            field.set(i, true);
        }
        let geom = GridGeometry::for_field(10, 4);
        assert_eq!(geom.height, 3);
        // Cell 6 has south neighbor 10, which is past the end.
        assert_eq!(count_von_neumann(&field, geom, 6), 3);
    }
}
