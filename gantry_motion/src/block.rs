//! Planner queue entries.
//!
//! A block describes one queued move. Blocks live in a fixed ring (see
//! [`crate::queue`]) and are linked by `u16` indices: `nx`/`pv` are the
//! static ring order, `nx_group`/`pv_group` the dynamic group chain. A
//! block whose `nx_group` equals its `nx` is the last block of its
//! group.

use gantry_common::consts::AXES;
use gantry_common::{AxisFlags, BufferState, MoveState};

/// Index of a block in the planner queue ring.
pub type BlockIx = u16;

/// What kind of move a block carries. Replaces the original firmware's
/// per-block callback pointer with a tagged dispatch; only the aline
/// path produces motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveType {
    /// Acceleration-managed straight line.
    #[default]
    Aline,
    /// Timed pause; no motion.
    Dwell,
    /// Synchronous command marker; no motion.
    Command,
}

/// One planner queue entry.
#[derive(Debug, Clone)]
pub struct Block {
    // ── Lifecycle ──
    /// Queue lifecycle state.
    pub buffer_state: BufferState,
    /// Move kind (dispatch tag).
    pub move_type: MoveType,
    /// Move-level run state.
    pub move_state: MoveState,
    /// Whether the back-planner may still touch this block.
    pub plannable: bool,

    // ── Geometry ──
    /// Move length [mm].
    pub length: f64,
    /// Total length of the group this block heads [mm]. Meaningful on
    /// the first block of a group; grows when co-linear moves join.
    pub group_length: f64,
    /// Direction unit vector.
    pub unit: [f64; AXES],
    /// Absolute move target [mm].
    pub target: [f64; AXES],
    /// Axes this move displaces.
    pub axis_flags: AxisFlags,

    // ── Jerk and derived values ──
    /// Jerk ceiling for the move [mm/s³].
    pub jerk: f64,
    /// `jerk²`, cached for the velocity cubic.
    pub jerk_sq: f64,
    /// `1/jerk`, cached for ramp lengths.
    pub recip_jerk: f64,
    /// `√jerk`, cached for ramp times.
    pub sqrt_j: f64,
    /// `1/(2·√jerk)`, cached for ramp times.
    pub q_recip_2_sqrt_j: f64,

    // ── Velocities [mm/s] ──
    /// Ceiling on cruise velocity.
    pub cruise_vmax: f64,
    /// Ceiling on exit velocity.
    pub exit_vmax: f64,
    /// Planned cruise velocity.
    pub cruise_velocity: f64,
    /// Planned exit velocity.
    pub exit_velocity: f64,

    // ── Timing ──
    /// Estimated (later: planned) move duration [s].
    pub move_time: f64,

    // ── Links ──
    /// Next block in ring order (static).
    pub nx: BlockIx,
    /// Previous block in ring order (static).
    pub pv: BlockIx,
    /// Block after the last block of this group.
    pub nx_group: BlockIx,
    /// Group back-link.
    pub pv_group: BlockIx,
}

impl Block {
    /// A fresh empty block at ring position `ix` of `size`.
    pub fn empty(ix: usize, size: usize) -> Self {
        let nx = ((ix + 1) % size) as BlockIx;
        let pv = ((ix + size - 1) % size) as BlockIx;
        Self {
            buffer_state: BufferState::Empty,
            move_type: MoveType::Aline,
            move_state: MoveState::Off,
            plannable: false,
            length: 0.0,
            group_length: 0.0,
            unit: [0.0; AXES],
            target: [0.0; AXES],
            axis_flags: AxisFlags::empty(),
            jerk: 0.0,
            jerk_sq: 0.0,
            recip_jerk: 0.0,
            sqrt_j: 0.0,
            q_recip_2_sqrt_j: 0.0,
            cruise_vmax: 0.0,
            exit_vmax: 0.0,
            cruise_velocity: 0.0,
            exit_velocity: 0.0,
            move_time: 0.0,
            nx,
            pv,
            nx_group: nx,
            pv_group: pv,
        }
    }

    /// Reset to empty, preserving the static ring links.
    pub fn reset(&mut self) {
        let (nx, pv) = (self.nx, self.pv);
        *self = Self::empty(0, 1);
        self.nx = nx;
        self.pv = pv;
        self.nx_group = nx;
        self.pv_group = pv;
    }

    /// Set the move jerk and recompute all derived values.
    pub fn set_jerk(&mut self, jerk: f64) {
        debug_assert!(jerk > 0.0);
        self.jerk = jerk;
        self.jerk_sq = jerk * jerk;
        self.recip_jerk = 1.0 / jerk;
        self.sqrt_j = jerk.sqrt();
        self.q_recip_2_sqrt_j = 1.0 / (2.0 * self.sqrt_j);
    }

    /// Copy the jerk tuple from another block without recomputing.
    pub fn copy_jerk(&mut self, other: &Block) {
        self.jerk = other.jerk;
        self.jerk_sq = other.jerk_sq;
        self.recip_jerk = other.recip_jerk;
        self.sqrt_j = other.sqrt_j;
        self.q_recip_2_sqrt_j = other.q_recip_2_sqrt_j;
    }

    /// Whether this block is the last of its group.
    #[inline]
    pub fn is_last_of_group(&self) -> bool {
        self.nx_group == self.nx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_links_wrap() {
        let first = Block::empty(0, 8);
        assert_eq!(first.nx, 1);
        assert_eq!(first.pv, 7);
        let last = Block::empty(7, 8);
        assert_eq!(last.nx, 0);
        assert_eq!(last.pv, 6);
    }

    #[test]
    fn jerk_derivation() {
        let mut b = Block::empty(0, 4);
        b.set_jerk(1e6);
        assert!((b.jerk_sq - 1e12).abs() < 1.0);
        assert!((b.recip_jerk - 1e-6).abs() < 1e-18);
        assert!((b.sqrt_j - 1000.0).abs() < 1e-9);
        assert!((b.q_recip_2_sqrt_j - 0.0005).abs() < 1e-12);
    }

    #[test]
    fn fresh_block_is_its_own_group() {
        let b = Block::empty(3, 8);
        assert!(b.is_last_of_group());
    }

    #[test]
    fn reset_preserves_ring_links() {
        let mut b = Block::empty(5, 8);
        b.length = 12.0;
        b.buffer_state = BufferState::Planned;
        b.nx_group = 2;
        b.reset();
        assert_eq!(b.nx, 6);
        assert_eq!(b.pv, 4);
        assert_eq!(b.nx_group, 6);
        assert_eq!(b.buffer_state, BufferState::Empty);
        assert_eq!(b.length, 0.0);
    }
}
