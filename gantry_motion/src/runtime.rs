//! The motion runtime singleton.
//!
//! Dual-buffered state shared between the executor (high interrupt
//! level) and the planner (lower interrupt level). Instead of the
//! original firmware's pointer pairs, both the per-block and per-group
//! runtime slots are two-element arenas with run/plan indices; the swap
//! at new-move setup is an integer toggle.
//!
//! ## Ownership partition
//!
//! [`MotionRuntime`] splits into two records:
//!
//! - [`ExecRuntime`]: section bookkeeping, forward differences,
//!   positions, waypoints and the step pipeline. Written **only** by
//!   the executor. The planner reads it (section, segment count) when
//!   judging group extensions.
//! - [`SharedRuntime`]: the runtime slot arenas and the entry-condition
//!   snapshot. The executor advances the indices and writes the entry
//!   snapshot at move end; the planner writes plan-side slots (or the
//!   run block slot during a sanctioned extension of the running group).
//!
//! The planner entry point takes `(&mut SharedRuntime, &ExecRuntime)`,
//! making the partition checkable at compile time.

use gantry_common::consts::{AXES, MOTORS};
use gantry_common::{AxisFlags, GroupState, MoveState, Section, SectionState};

use crate::block::BlockIx;
use crate::fdiff::ForwardDiffs;

/// Euclidean distance between two axis vectors.
#[inline]
pub fn axis_distance(a: &[f64; AXES], b: &[f64; AXES]) -> f64 {
    let mut sum = 0.0;
    for axis in 0..AXES {
        let d = a[axis] - b[axis];
        sum += d * d;
    }
    sum.sqrt()
}

/// Which runtime slot an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The running move / group.
    Run,
    /// The move / group being planned.
    Plan,
}

// ─── Per-block runtime ──────────────────────────────────────────────

/// Head/body/tail plan for one block, produced by the planner and
/// consumed by the executor.
///
/// A head always runs entry → cruise and a tail always cruise → exit,
/// even when the block carries only a fragment of its group's ramp. A
/// non-zero `cruise_jerk` marks such a fragment (partial head or tail):
/// the curve passes through the block boundary with live acceleration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockRuntime {
    pub head_length: f64,
    pub body_length: f64,
    pub tail_length: f64,
    pub head_time: f64,
    pub body_time: f64,
    pub tail_time: f64,
    pub cruise_velocity: f64,
    pub exit_velocity: f64,
    pub cruise_acceleration: f64,
    pub exit_acceleration: f64,
    pub cruise_jerk: f64,
    pub exit_jerk: f64,
    /// Set when the planner has filled this slot.
    pub planned: bool,
}

impl BlockRuntime {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ─── Per-group runtime ──────────────────────────────────────────────

/// Ramp plan for one group and the planner's dispersal cursor.
#[derive(Debug, Clone, Copy)]
pub struct GroupRuntime {
    pub group_state: GroupState,
    /// First block of the group (advanced past finished blocks).
    pub first_block: BlockIx,
    /// Velocity the group ramp starts from [mm/s].
    pub entry_velocity: f64,
    /// Total group length [mm].
    pub length: f64,
    pub head_length: f64,
    pub body_length: f64,
    pub tail_length: f64,
    pub head_time: f64,
    pub body_time: f64,
    pub tail_time: f64,
    /// Head length already handed to completed blocks [mm].
    pub completed_head_length: f64,
    /// Body length already handed to completed blocks [mm].
    pub completed_body_length: f64,
    pub cruise_velocity: f64,
    pub exit_velocity: f64,
    pub cruise_acceleration: f64,
    pub cruise_jerk: f64,
    pub exit_acceleration: f64,
    pub exit_jerk: f64,
    /// Dispersal cursor: length handed out within the current section.
    pub length_into_section: f64,
    /// Dispersal cursor: curve time matching `length_into_section` [s].
    pub t_into_section: f64,
}

impl Default for GroupRuntime {
    fn default() -> Self {
        Self {
            group_state: GroupState::Off,
            first_block: 0,
            entry_velocity: 0.0,
            length: 0.0,
            head_length: 0.0,
            body_length: 0.0,
            tail_length: 0.0,
            head_time: 0.0,
            body_time: 0.0,
            tail_time: 0.0,
            completed_head_length: 0.0,
            completed_body_length: 0.0,
            cruise_velocity: 0.0,
            exit_velocity: 0.0,
            cruise_acceleration: 0.0,
            cruise_jerk: 0.0,
            exit_acceleration: 0.0,
            exit_jerk: 0.0,
            length_into_section: 0.0,
            t_into_section: 0.0,
        }
    }
}

impl GroupRuntime {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ─── Shared runtime (slot arenas + entry snapshot) ──────────────────

/// The planner/executor hand-off area.
#[derive(Debug)]
pub struct SharedRuntime {
    blocks: [BlockRuntime; 2],
    groups: [GroupRuntime; 2],
    run_block: usize,
    plan_block: usize,
    run_group: usize,
    plan_group: usize,
    /// Velocity the next move enters at [mm/s]. Written by the executor
    /// at move end, read by the planner as a single-word snapshot.
    pub entry_velocity: f64,
    /// Acceleration at move entry [mm/s²].
    pub entry_acceleration: f64,
    /// Jerk at move entry [mm/s³].
    pub entry_jerk: f64,
    /// Velocity the running group was entered at [mm/s].
    pub group_entry_velocity: f64,
}

impl SharedRuntime {
    pub fn new() -> Self {
        Self {
            blocks: [BlockRuntime::default(); 2],
            groups: [GroupRuntime::default(); 2],
            run_block: 0,
            plan_block: 1,
            run_group: 0,
            plan_group: 1,
            entry_velocity: 0.0,
            entry_acceleration: 0.0,
            entry_jerk: 0.0,
            group_entry_velocity: 0.0,
        }
    }

    // ── Block slots ──

    #[inline]
    pub fn r(&self) -> &BlockRuntime {
        &self.blocks[self.run_block]
    }

    #[inline]
    pub fn r_mut(&mut self) -> &mut BlockRuntime {
        &mut self.blocks[self.run_block]
    }

    #[inline]
    pub fn p(&self) -> &BlockRuntime {
        &self.blocks[self.plan_block]
    }

    #[inline]
    pub fn p_mut(&mut self) -> &mut BlockRuntime {
        &mut self.blocks[self.plan_block]
    }

    /// `r ← p; p ← p.nx` as an index toggle. Executor only.
    #[inline]
    pub fn advance_blocks(&mut self) {
        let p = self.plan_block;
        self.run_block = p;
        self.plan_block = 1 - p;
    }

    // ── Group slots ──

    #[inline]
    pub fn r_group(&self) -> &GroupRuntime {
        &self.groups[self.run_group]
    }

    #[inline]
    pub fn r_group_mut(&mut self) -> &mut GroupRuntime {
        &mut self.groups[self.run_group]
    }

    #[inline]
    pub fn p_group(&self) -> &GroupRuntime {
        &self.groups[self.plan_group]
    }

    #[inline]
    pub fn p_group_mut(&mut self) -> &mut GroupRuntime {
        &mut self.groups[self.plan_group]
    }

    /// `r_group ← p_group; p_group ← p_group.nx`. Executor only.
    #[inline]
    pub fn advance_groups(&mut self) {
        let p = self.plan_group;
        self.run_group = p;
        self.plan_group = 1 - p;
    }

    // ── Slot-addressed access for the planner ──

    #[inline]
    pub fn block_slot(&self, slot: Slot) -> &BlockRuntime {
        match slot {
            Slot::Run => self.r(),
            Slot::Plan => self.p(),
        }
    }

    #[inline]
    pub fn group_slot(&self, slot: Slot) -> &GroupRuntime {
        match slot {
            Slot::Run => self.r_group(),
            Slot::Plan => self.p_group(),
        }
    }

    #[inline]
    pub fn group_slot_mut(&mut self, slot: Slot) -> &mut GroupRuntime {
        match slot {
            Slot::Run => self.r_group_mut(),
            Slot::Plan => self.p_group_mut(),
        }
    }

    /// Disjoint mutable access to a group slot and a block slot, as the
    /// dispersal step needs both.
    #[inline]
    pub fn group_and_block_mut(
        &mut self,
        group: Slot,
        block: Slot,
    ) -> (&mut GroupRuntime, &mut BlockRuntime) {
        let g = match group {
            Slot::Run => self.run_group,
            Slot::Plan => self.plan_group,
        };
        let b = match block {
            Slot::Run => self.run_block,
            Slot::Plan => self.plan_block,
        };
        (&mut self.groups[g], &mut self.blocks[b])
    }
}

impl Default for SharedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Executor runtime ───────────────────────────────────────────────

/// Executor-owned section and segment state.
#[derive(Debug)]
pub struct ExecRuntime {
    pub move_state: MoveState,
    pub section: Section,
    pub section_state: SectionState,
    /// Jerk of the running move [mm/s³].
    pub jerk: f64,
    /// Segment count of the current section, as computed (float form).
    pub segments: f64,
    /// Duration of each segment in the current section [s].
    pub segment_time: f64,
    /// Segments left in the current section.
    pub segment_count: u32,
    /// Velocity of the segment being emitted [mm/s].
    pub segment_velocity: f64,
    /// Forward-difference registers for the current section.
    pub fdiff: ForwardDiffs,
    /// Current position [mm].
    pub position: [f64; AXES],
    /// Final target of the running move [mm].
    pub target: [f64; AXES],
    /// Scratch target for the segment being emitted [mm].
    pub segment_target: [f64; AXES],
    /// Unit vector of the running move.
    pub unit: [f64; AXES],
    pub axis_flags: AxisFlags,
    /// Exact geometric position at each section end, indexed by
    /// [`Section`]. Snapping the final segment of a section to its
    /// waypoint cancels accumulated float drift.
    pub waypoint: [[f64; AXES]; 3],
    /// Steps at the end of the segment being prepared.
    pub target_steps: [f64; MOTORS],
    /// Steps at the end of the segment before it.
    pub position_steps: [f64; MOTORS],
    /// Steps delayed one more segment, time-aligned with the encoders.
    pub commanded_steps: [f64; MOTORS],
    /// Latest encoder samples [steps].
    pub encoder_steps: [f64; MOTORS],
    /// `encoder − commanded` per motor [steps].
    pub following_error: [f64; MOTORS],
    /// Body length already executed, for multi-block body extension.
    pub executed_body_length: f64,
    /// Body time already executed [s].
    pub executed_body_time: f64,
}

impl ExecRuntime {
    pub fn new() -> Self {
        Self {
            move_state: MoveState::Off,
            section: Section::Head,
            section_state: SectionState::Off,
            jerk: 0.0,
            segments: 0.0,
            segment_time: 0.0,
            segment_count: 0,
            segment_velocity: 0.0,
            fdiff: ForwardDiffs::default(),
            position: [0.0; AXES],
            target: [0.0; AXES],
            segment_target: [0.0; AXES],
            unit: [0.0; AXES],
            axis_flags: AxisFlags::empty(),
            waypoint: [[0.0; AXES]; 3],
            target_steps: [0.0; MOTORS],
            position_steps: [0.0; MOTORS],
            commanded_steps: [0.0; MOTORS],
            encoder_steps: [0.0; MOTORS],
            following_error: [0.0; MOTORS],
            executed_body_length: 0.0,
            executed_body_time: 0.0,
        }
    }

    /// Distance from the current position to the move target [mm].
    #[inline]
    pub fn remaining_length(&self) -> f64 {
        axis_distance(&self.target, &self.position)
    }
}

impl Default for ExecRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// The complete runtime singleton.
#[derive(Debug, Default)]
pub struct MotionRuntime {
    pub exec: ExecRuntime,
    pub shared: SharedRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_swap_is_a_toggle() {
        let mut rt = SharedRuntime::new();
        rt.p_mut().cruise_velocity = 42.0;
        rt.advance_blocks();
        assert!((rt.r().cruise_velocity - 42.0).abs() < 1e-12);
        rt.p_mut().cruise_velocity = 7.0;
        rt.advance_blocks();
        assert!((rt.r().cruise_velocity - 7.0).abs() < 1e-12);
        assert!((rt.p().cruise_velocity - 42.0).abs() < 1e-12);
    }

    #[test]
    fn group_swap_independent_of_block_swap() {
        let mut rt = SharedRuntime::new();
        rt.p_group_mut().cruise_velocity = 11.0;
        rt.advance_groups();
        assert!((rt.r_group().cruise_velocity - 11.0).abs() < 1e-12);
        assert!((rt.p().cruise_velocity).abs() < 1e-12);
    }

    #[test]
    fn disjoint_group_and_block_access() {
        let mut rt = SharedRuntime::new();
        let (g, b) = rt.group_and_block_mut(Slot::Run, Slot::Plan);
        g.cruise_velocity = 1.0;
        b.cruise_velocity = 2.0;
        assert!((rt.r_group().cruise_velocity - 1.0).abs() < 1e-12);
        assert!((rt.p().cruise_velocity - 2.0).abs() < 1e-12);
    }

    #[test]
    fn axis_distance_is_euclidean() {
        let a = [0.0, 0.0, 0.0, 0.0];
        let b = [3.0, 4.0, 0.0, 0.0];
        assert!((axis_distance(&a, &b) - 5.0).abs() < 1e-12);
    }
}
