//! Per-move axis participation flags.

use bitflags::bitflags;

use crate::consts::AXES;

bitflags! {
    /// Which axes a move actually displaces.
    ///
    /// The segment emitter integrates every axis through the unit
    /// vector, but reporting and homing care which axes participate.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AxisFlags: u8 {
        const X = 0x01;
        const Y = 0x02;
        const Z = 0x04;
        const A = 0x08;
    }
}

impl AxisFlags {
    /// Flag for a single axis by index.
    #[inline]
    pub fn axis(ix: usize) -> Self {
        debug_assert!(ix < AXES);
        Self::from_bits_truncate(1 << ix)
    }

    /// Derive flags from a unit vector: an axis participates when its
    /// component is non-zero.
    pub fn from_unit(unit: &[f64; AXES]) -> Self {
        let mut flags = Self::empty();
        for (ix, u) in unit.iter().enumerate() {
            if u.abs() > 0.0 {
                flags |= Self::axis(ix);
            }
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_from_unit_vector() {
        let unit = [0.6, 0.8, 0.0, 0.0];
        let flags = AxisFlags::from_unit(&unit);
        assert_eq!(flags, AxisFlags::X | AxisFlags::Y);
    }

    #[test]
    fn single_axis_lookup() {
        assert_eq!(AxisFlags::axis(2), AxisFlags::Z);
    }
}
