//! The planner queue ring.
//!
//! A fixed ring of [`Block`] records, pre-allocated at startup; the
//! execution path never allocates. The main loop loads moves at the
//! write index; the executor consumes them at the run index. Buffer
//! states advance Empty → Prepped → Planned → Running, with the single
//! sanctioned Planned → Prepped downgrade used to force replans.
//!
//! The back-planner (lookahead) is not part of this crate: callers load
//! fully-described moves (length ceilings, exit velocity targets, jerk)
//! and may join co-linear moves into groups with [`PlannerQueue::append_to_group`].

use gantry_common::consts::{AXES, PLANNER_QUEUE_SIZE};
use gantry_common::float::near_zero;
use gantry_common::{AxisFlags, BufferState, ExecError, MoveState};

use crate::block::{Block, BlockIx, MoveType};

/// Parameters for loading one aline move.
#[derive(Debug, Clone, Copy)]
pub struct AlineRequest {
    /// Absolute target position [mm].
    pub target: [f64; AXES],
    /// Cruise velocity ceiling [mm/s].
    pub cruise_vmax: f64,
    /// Requested exit velocity [mm/s].
    pub exit_velocity: f64,
    /// Exit velocity ceiling [mm/s].
    pub exit_vmax: f64,
    /// Jerk ceiling [mm/s³].
    pub jerk: f64,
}

/// Fixed ring of queued moves plus run-side bookkeeping.
#[derive(Debug)]
pub struct PlannerQueue {
    blocks: Vec<Block>,
    /// Run index; the block the executor is consuming.
    run: BlockIx,
    /// Write index; where the next loaded move lands.
    write: BlockIx,
    /// Occupied slot count.
    queued: usize,
    /// Position the most recently loaded move ends at [mm].
    last_target: [f64; AXES],
    /// Time left in the running move [s], decremented per segment.
    pub run_time_remaining: f64,
    /// Total planned time across queued moves [s].
    pub queued_time: f64,
}

impl PlannerQueue {
    pub fn new() -> Self {
        Self::with_start_position([0.0; AXES])
    }

    /// A queue whose first move starts from `position`.
    pub fn with_start_position(position: [f64; AXES]) -> Self {
        let blocks = (0..PLANNER_QUEUE_SIZE)
            .map(|ix| Block::empty(ix, PLANNER_QUEUE_SIZE))
            .collect();
        Self {
            blocks,
            run: 0,
            write: 0,
            queued: 0,
            last_target: position,
            run_time_remaining: 0.0,
            queued_time: 0.0,
        }
    }

    // ── Access ──────────────────────────────────────────────────────

    #[inline]
    pub fn block(&self, ix: BlockIx) -> &Block {
        &self.blocks[ix as usize]
    }

    #[inline]
    pub fn block_mut(&mut self, ix: BlockIx) -> &mut Block {
        &mut self.blocks[ix as usize]
    }

    /// Position new moves are loaded from.
    #[inline]
    pub fn load_position(&self) -> [f64; AXES] {
        self.last_target
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queued
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queued == 0
    }

    // ── Run-side interface ──────────────────────────────────────────

    /// The block the executor should run, if any move is queued.
    #[inline]
    pub fn get_run_buffer(&self) -> Option<BlockIx> {
        (self.blocks[self.run as usize].buffer_state != BufferState::Empty).then_some(self.run)
    }

    /// Whether any move is queued at the run index.
    #[inline]
    pub fn has_runnable_buffer(&self) -> bool {
        self.get_run_buffer().is_some()
    }

    /// Release the run buffer and advance the run index.
    ///
    /// Returns true when the queue is now empty (cycle can end).
    pub fn free_run_buffer(&mut self) -> bool {
        let run = self.run as usize;
        debug_assert!(self.blocks[run].buffer_state != BufferState::Empty);
        self.blocks[run].reset();
        self.run = self.blocks[run].nx;
        self.queued = self.queued.saturating_sub(1);
        self.queued == 0
    }

    /// Force every queued block from `from` forward back to `Prepped`
    /// so the planner re-plans it. Groups are dissolved; after a
    /// feedhold each block re-ramps from standstill as its own group.
    pub fn replan_queue(&mut self, from: BlockIx) {
        let mut ix = from;
        loop {
            let block = &mut self.blocks[ix as usize];
            if block.buffer_state == BufferState::Empty {
                break;
            }
            block.buffer_state = BufferState::Prepped;
            block.plannable = true;
            block.move_state = MoveState::New;
            block.group_length = block.length;
            block.nx_group = block.nx;
            block.pv_group = block.pv;
            block.cruise_velocity = block.cruise_vmax;
            block.exit_velocity = block.exit_velocity.min(block.exit_vmax);
            ix = block.nx;
            if ix == from {
                break;
            }
        }
    }

    /// Refresh the queued-time pool. Called when a block is promoted to
    /// `Running` so reports see a consistent remaining-time figure.
    pub fn planner_time_accounting(&mut self) {
        self.queued_time = self
            .blocks
            .iter()
            .filter(|b| b.buffer_state != BufferState::Empty)
            .map(|b| b.move_time)
            .sum();
    }

    // ── Load-side interface (main-loop context) ─────────────────────

    /// Load one aline move at the write index.
    pub fn enqueue_aline(&mut self, req: &AlineRequest) -> Result<BlockIx, ExecError> {
        if self.queued == PLANNER_QUEUE_SIZE {
            return Err(ExecError::PlannerAssertion("planner queue full"));
        }

        let mut unit = [0.0; AXES];
        let mut length_sq = 0.0;
        for (axis, u) in unit.iter_mut().enumerate() {
            let d = req.target[axis] - self.last_target[axis];
            *u = d;
            length_sq += d * d;
        }
        let length = length_sq.sqrt();
        if near_zero(length) {
            return Err(ExecError::PlannerAssertion("zero length move"));
        }
        for u in unit.iter_mut() {
            *u /= length;
        }

        let ix = self.write;
        let block = &mut self.blocks[ix as usize];
        debug_assert!(block.buffer_state == BufferState::Empty);

        block.buffer_state = BufferState::Prepped;
        block.move_type = MoveType::Aline;
        block.move_state = MoveState::New;
        block.plannable = true;
        block.length = length;
        block.group_length = length;
        block.unit = unit;
        block.target = req.target;
        block.axis_flags = AxisFlags::from_unit(&unit);
        block.set_jerk(req.jerk);
        block.cruise_vmax = req.cruise_vmax;
        block.exit_vmax = req.exit_vmax;
        block.cruise_velocity = req.cruise_vmax;
        block.exit_velocity = req.exit_velocity.min(req.exit_vmax);
        block.move_time = length / req.cruise_vmax;
        block.nx_group = block.nx;
        block.pv_group = block.pv;

        self.write = block.nx;
        self.queued += 1;
        self.last_target = req.target;
        Ok(ix)
    }

    /// Load a non-motion move (dwell or command marker).
    pub fn enqueue_simple(&mut self, move_type: MoveType, duration: f64) -> Result<BlockIx, ExecError> {
        if self.queued == PLANNER_QUEUE_SIZE {
            return Err(ExecError::PlannerAssertion("planner queue full"));
        }
        debug_assert!(move_type != MoveType::Aline);

        let ix = self.write;
        let block = &mut self.blocks[ix as usize];
        block.buffer_state = BufferState::Prepped;
        block.move_type = move_type;
        block.move_state = MoveState::New;
        block.target = self.last_target;
        block.move_time = duration;

        self.write = block.nx;
        self.queued += 1;
        Ok(ix)
    }

    /// Back-planner stand-in: join `added` into the group headed by
    /// `first`. Extends the group length and the group chain; the
    /// caller is responsible for raising the first block's exit
    /// velocity if the join lifts it.
    pub fn append_to_group(&mut self, first: BlockIx, added: BlockIx) {
        let added_length = self.blocks[added as usize].length;
        let after_group = self.blocks[added as usize].nx;

        let first_block = &mut self.blocks[first as usize];
        first_block.group_length += added_length;
        first_block.nx_group = after_group;
        let group_length = first_block.group_length;

        let added_block = &mut self.blocks[added as usize];
        added_block.group_length = group_length;
        added_block.nx_group = after_group;
        added_block.pv_group = first;
    }

    // ── Diagnostics ─────────────────────────────────────────────────

    /// Number of blocks currently in the given state.
    pub fn count_in_state(&self, state: BufferState) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.buffer_state == state)
            .count()
    }
}

impl Default for PlannerQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(target: [f64; AXES]) -> AlineRequest {
        AlineRequest {
            target,
            cruise_vmax: 100.0,
            exit_velocity: 0.0,
            exit_vmax: 0.0,
            jerk: 1e6,
        }
    }

    #[test]
    fn enqueue_computes_geometry() {
        let mut q = PlannerQueue::new();
        let ix = q.enqueue_aline(&request([3.0, 4.0, 0.0, 0.0])).unwrap();
        let b = q.block(ix);
        assert!((b.length - 5.0).abs() < 1e-12);
        assert!((b.unit[0] - 0.6).abs() < 1e-12);
        assert!((b.unit[1] - 0.8).abs() < 1e-12);
        assert_eq!(b.buffer_state, BufferState::Prepped);
        assert!(b.is_last_of_group());
    }

    #[test]
    fn zero_length_move_rejected() {
        let mut q = PlannerQueue::new();
        q.enqueue_aline(&request([1.0, 0.0, 0.0, 0.0])).unwrap();
        let err = q.enqueue_aline(&request([1.0, 0.0, 0.0, 0.0])).unwrap_err();
        assert_eq!(err, ExecError::PlannerAssertion("zero length move"));
    }

    #[test]
    fn run_buffer_lifecycle() {
        let mut q = PlannerQueue::new();
        assert!(q.get_run_buffer().is_none());
        let a = q.enqueue_aline(&request([1.0, 0.0, 0.0, 0.0])).unwrap();
        let _b = q.enqueue_aline(&request([2.0, 0.0, 0.0, 0.0])).unwrap();
        assert_eq!(q.get_run_buffer(), Some(a));
        assert!(!q.free_run_buffer());
        assert_ne!(q.get_run_buffer(), Some(a));
        assert!(q.free_run_buffer());
        assert!(q.is_empty());
    }

    #[test]
    fn group_append_extends_length_and_links() {
        let mut q = PlannerQueue::new();
        let a = q.enqueue_aline(&request([10.0, 0.0, 0.0, 0.0])).unwrap();
        let b = q.enqueue_aline(&request([25.0, 0.0, 0.0, 0.0])).unwrap();
        q.append_to_group(a, b);
        assert!((q.block(a).group_length - 25.0).abs() < 1e-12);
        assert!(!q.block(a).is_last_of_group());
        assert_eq!(q.block(a).nx_group, q.block(b).nx);
        assert_eq!(q.block(b).pv_group, a);
    }

    #[test]
    fn replan_downgrades_and_dissolves_groups() {
        let mut q = PlannerQueue::new();
        let a = q.enqueue_aline(&request([10.0, 0.0, 0.0, 0.0])).unwrap();
        let b = q.enqueue_aline(&request([25.0, 0.0, 0.0, 0.0])).unwrap();
        q.append_to_group(a, b);
        q.block_mut(a).buffer_state = BufferState::Planned;
        q.replan_queue(a);
        assert_eq!(q.block(a).buffer_state, BufferState::Prepped);
        assert!(q.block(a).is_last_of_group());
        assert!((q.block(a).group_length - 10.0).abs() < 1e-12);
        assert_eq!(q.block(b).buffer_state, BufferState::Prepped);
    }

    #[test]
    fn at_most_one_running_block() {
        let mut q = PlannerQueue::new();
        let a = q.enqueue_aline(&request([1.0, 0.0, 0.0, 0.0])).unwrap();
        q.enqueue_aline(&request([2.0, 0.0, 0.0, 0.0])).unwrap();
        q.block_mut(a).buffer_state = BufferState::Running;
        assert_eq!(q.count_in_state(BufferState::Running), 1);
    }
}
