//! Executor entry points and the motion core facade.
//!
//! [`MotionCore`] owns the planner queue, the dual-buffered runtime and
//! the machine motion/hold state, and exposes the two interrupt-level
//! entry points:
//!
//! - [`MotionCore::exec_move`]: the execution interrupt. Promotes the
//!   run buffer, requests planning of the next block, and dispatches on
//!   the move type. Emits exactly one segment per call.
//! - [`MotionCore::plan_move`]: the (lower-priority) planning
//!   interrupt. See [`crate::plan`].
//!
//! Neither entry point blocks, allocates or loops; both are safe to
//! drive from a hard timer context or from a test harness in a loop.

pub mod aline;
pub mod section;
pub mod segment;

use gantry_common::consts::AXES;
use gantry_common::{BufferState, ExecError, ExecOutcome, HoldState, MotionState};

use crate::block::MoveType;
use crate::feedhold;
use crate::hal::MotionHal;
use crate::machine::Machine;
use crate::plan;
use crate::queue::PlannerQueue;
use crate::runtime::MotionRuntime;

/// The motion execution core.
#[derive(Debug, Default)]
pub struct MotionCore {
    pub queue: PlannerQueue,
    pub rt: MotionRuntime,
    pub machine: Machine,
}

impl MotionCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A core whose runtime and queue start at `position`.
    pub fn with_start_position(position: [f64; AXES]) -> Self {
        let mut core = Self {
            queue: PlannerQueue::with_start_position(position),
            ..Self::default()
        };
        core.rt.exec.position = position;
        core
    }

    /// Execution-interrupt entry: prep one segment for the steppers.
    pub fn exec_move(&mut self, hal: &mut dyn MotionHal) -> Result<ExecOutcome, ExecError> {
        let Some(run_ix) = self.queue.get_run_buffer() else {
            // Nothing queued; that is fine. A draining feedhold can
            // still be waiting on the steppers, though.
            if self.machine.hold_state == HoldState::Pending {
                feedhold::pending_idle_check(&mut self.machine, hal);
            }
            hal.prep_null();
            return Ok(ExecOutcome::Noop);
        };

        if self.queue.block(run_ix).move_type == MoveType::Aline {
            // First-time operations for a block that is not running yet.
            if self.queue.block(run_ix).buffer_state != BufferState::Running {
                if self.queue.block(run_ix).buffer_state < BufferState::Prepped {
                    hal.exception("exec_move: run buffer is not prepped");
                    hal.prep_null();
                    return Ok(ExecOutcome::Noop);
                }
                let nx = self.queue.block(run_ix).nx;
                if self.queue.block(nx).buffer_state < BufferState::Prepped
                    && self.queue.len() > 1
                {
                    hal.exception("exec_move: next buffer is empty");
                }

                if self.queue.block(run_ix).buffer_state == BufferState::Prepped {
                    if self.machine.motion_state == MotionState::Run {
                        // Running without a planned block is a pipeline
                        // ordering breach, not a recoverable state.
                        return Err(ExecError::Internal("running without a planned buffer"));
                    }
                    // Planning may already be happening at a lower
                    // interrupt; just ask for it and come back.
                    hal.request_plan();
                    return Ok(ExecOutcome::Noop);
                }

                // Must precede the time accounting.
                self.queue.block_mut(run_ix).buffer_state = BufferState::Running;
                self.queue.planner_time_accounting();
            }

            // Ask for forward planning of the next move. The planner
            // runs only after this function returns (and exec_aline has
            // advanced the plan slot).
            hal.request_plan();

            if self.machine.motion_state != MotionState::Run
                && self.machine.motion_state != MotionState::Hold
            {
                self.machine.set_motion_state(MotionState::Run);
            }
        }

        match self.queue.block(run_ix).move_type {
            MoveType::Aline => {
                aline::exec_aline(&mut self.queue, &mut self.rt, &mut self.machine, run_ix, hal)
            }
            MoveType::Dwell | MoveType::Command => self.exec_simple(hal),
        }
    }

    /// Non-motion moves complete immediately: the queue entry is the
    /// whole of their execution.
    fn exec_simple(&mut self, hal: &mut dyn MotionHal) -> Result<ExecOutcome, ExecError> {
        let queue_empty = self.queue.free_run_buffer();
        if queue_empty && self.machine.hold_state == HoldState::Off {
            hal.cycle_end();
            self.machine.set_motion_state(MotionState::Stop);
        }
        Ok(ExecOutcome::Done)
    }

    /// Planning-interrupt entry: plan at most one block.
    pub fn plan_move(&mut self, hal: &mut dyn MotionHal) -> Result<ExecOutcome, ExecError> {
        plan::plan_move(&mut self.queue, &mut self.rt.shared, &self.rt.exec, hal)
    }

    /// Request a feedhold. Takes effect at the next segment boundary.
    pub fn request_hold(&mut self) -> bool {
        self.machine.request_hold()
    }

    /// End a feedhold: resume queued motion or end the cycle.
    pub fn exit_hold(&mut self, hal: &mut dyn MotionHal) {
        feedhold::exit_hold(&self.queue, &mut self.machine, hal);
    }
}
