//! Precision policies.
//!
//! All geometry math runs in `f64` (`HighPrecision`); values are narrowed to
//! `f32` exactly once, when a render-ready vertex is produced.

/// CPU-authoritative precision type.
pub type HighPrecision = f64;

/// Canonical NaN bit pattern used for missing values in exact keys.
pub const CANONICAL_NAN_BITS: u64 = 0x7ff8_0000_0000_0000;

/// Bit pattern of `v` for exact-equality keys.
///
/// Every NaN maps to one canonical pattern (NaN is a "missing" sentinel);
/// all other values keep their exact bits, so `-0.0` and `0.0` stay distinct.
#[inline]
pub fn exact_bits(v: HighPrecision) -> u64 {
    if v.is_nan() {
        CANONICAL_NAN_BITS
    } else {
        v.to_bits()
    }
}

/// Narrow to `f32`, rounding toward positive infinity.
///
/// Used for conservative bounds (e.g. bounding-sphere radii) that must never
/// shrink below their `f64` value.
pub fn narrow_up(v: HighPrecision) -> f32 {
    let narrowed = v as f32;
    if (narrowed as f64) >= v || !narrowed.is_finite() {
        narrowed
    } else {
        narrowed.next_up()
    }
}
