//! Epsilon float comparisons for the motion pipeline.
//!
//! Lengths, velocities and times accumulate rounding error as segments
//! are integrated; every equality test in the planner and executor goes
//! through these helpers rather than `==`.

use crate::consts::EPSILON;

/// True if `a` is within [`EPSILON`] of zero.
#[inline]
pub fn near_zero(a: f64) -> bool {
    a.abs() < EPSILON
}

/// True if `a` and `b` are within [`EPSILON`] of each other.
#[inline]
pub fn near_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

/// True if `a > b - EPSILON`: greater-or-equal with tolerance.
#[inline]
pub fn near_ge(a: f64, b: f64) -> bool {
    a > b - EPSILON
}

/// True if `a` and `b` differ by more than [`EPSILON`].
#[inline]
pub fn near_ne(a: f64, b: f64) -> bool {
    !near_eq(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_detection() {
        assert!(near_zero(0.0));
        assert!(near_zero(1e-9));
        assert!(!near_zero(1e-3));
    }

    #[test]
    fn equality_is_symmetric() {
        assert!(near_eq(1.0, 1.0 + 1e-9));
        assert!(near_eq(1.0 + 1e-9, 1.0));
        assert!(near_ne(1.0, 1.001));
    }

    #[test]
    fn ge_with_tolerance() {
        assert!(near_ge(1.0, 1.0));
        assert!(near_ge(1.0, 1.0 + 1e-9));
        assert!(!near_ge(1.0, 1.1));
    }
}
