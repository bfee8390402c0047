//! The feedhold controller.
//!
//! Traps an executing move into a controlled deceleration that may span
//! several blocks, then parks the machine until the hold is exited.
//!
//! Cases handled (in rough sequence order):
//!
//!  1. Hold requested mid-block:
//!     (a) the deceleration fits in the running block's remainder;
//!     (b) it does not, and spans into following blocks;
//!     (c) it fits the remainder almost exactly.
//!  2. Hold request arriving together with a new block.
//!  3. The running block is already decelerating: continue it.
//!  4. A block decelerated to some velocity > 0: continue in the next.
//!  5. Decelerated to zero: rewind the block, replan the queue.
//!  6. Runtime work done: wait for the steppers to drain.
//!  7. Steppers stopped: hold; every call is a no-op.
//!  8./9. Hold exit with/without queued motion: [`exit_hold`].
//!
//! The deceleration itself is a synthetic tail-only move built from the
//! live segment velocity; the executor's ordinary tail runner executes
//! it. States that park the machine (5, 6, 7) are processed *before*
//! new-move setup so the dual-buffered runtime is never spuriously
//! swapped while holding.

use gantry_common::float::{near_eq, near_zero};
use gantry_common::{ExecError, ExecOutcome, HoldState, MotionState, MoveState, Section, SectionState};
use tracing::{debug, info};

use crate::block::BlockIx;
use crate::hal::{MotionHal, ReportKind};
use crate::machine::Machine;
use crate::plan::ramp;
use crate::queue::PlannerQueue;
use crate::runtime::MotionRuntime;

/// Handle the parked hold states (decel finished, draining, holding).
///
/// Returns `Some(outcome)` when the executor must return without
/// touching the move runtime; `None` when execution continues.
pub(crate) fn park(
    queue: &mut PlannerQueue,
    rt: &mut MotionRuntime,
    machine: &mut Machine,
    run_ix: BlockIx,
    hal: &mut dyn MotionHal,
) -> Result<Option<ExecOutcome>, ExecError> {
    match machine.hold_state {
        // Case 7: all motion has ceased. VERY important to exit as a
        // no-op so the steppers are never loaded again.
        HoldState::Hold => Ok(Some(ExecOutcome::Noop)),

        // Case 6: wait for the steppers to clear out.
        HoldState::Pending => {
            pending_idle_check(machine, hal);
            Ok(Some(ExecOutcome::Done))
        }

        // Case 5: decelerated to zero. Rewind the block to its
        // untravelled remainder and force the whole queue to replan
        // from standstill.
        HoldState::DecelEnd => {
            rt.exec.move_state = MoveState::Off;
            let remaining = rt.exec.remaining_length();
            if near_zero(remaining) {
                // The deceleration landed exactly on the move target;
                // there is nothing to rewind.
                queue.block_mut(run_ix).move_state = MoveState::Run;
                queue.free_run_buffer();
            } else {
                let bf = queue.block_mut(run_ix);
                bf.move_state = MoveState::New;
                bf.length = remaining;
            }
            // The hold invalidated all forward planning.
            rt.shared.r_group_mut().reset();
            rt.shared.p_group_mut().reset();
            rt.shared.r_mut().reset();
            rt.shared.p_mut().reset();
            if let Some(replan_from) = queue.get_run_buffer() {
                queue.replan_queue(replan_from);
            }
            machine.hold_state = HoldState::Pending;
            debug!(remaining, "feedhold deceleration complete, queue replanned");
            Ok(Some(ExecOutcome::Done))
        }

        _ => Ok(None),
    }
}

/// Case 6 → 7 edge: once the step generator has drained, the machine
/// is truly holding. Also reachable with an empty queue, when the
/// deceleration landed exactly on the last move's target.
pub(crate) fn pending_idle_check(machine: &mut Machine, hal: &mut dyn MotionHal) {
    if hal.runtime_is_idle() {
        machine.hold_state = HoldState::Hold;
        hal.zero_segment_velocity();
        hal.request_status_report(ReportKind::Immediate);
        hal.controller_ready();
        info!("feedhold reached");
    }
}

/// Cases 1–4: trap the running move into a deceleration.
///
/// Called after new-move setup while a hold is in progress. Builds a
/// tail-only move from the current state, decelerating as fast as the
/// remaining length allows. Case 3 (already decelerating) needs no
/// trap and just continues.
pub(crate) fn sync_hold(queue: &mut PlannerQueue, rt: &mut MotionRuntime, machine: &mut Machine) {
    let fresh_continue = machine.hold_state == HoldState::DecelContinue
        && rt.exec.move_state == MoveState::New;
    if machine.hold_state != HoldState::Sync && !fresh_continue {
        return;
    }

    let Some(run_ix) = queue.get_run_buffer() else {
        return;
    };

    if rt.exec.section == Section::Tail {
        // Already decelerating; just decide how the tail resolves.
        machine.hold_state = if near_zero(rt.shared.r().exit_velocity) {
            HoldState::DecelToZero
        } else {
            HoldState::DecelContinue
        };
        return;
    }

    // Cruise velocity := the segment velocity we are actually at. In a
    // running head the registers have not been applied for the
    // upcoming segment yet, so project one segment forward. (In a
    // fresh move the registers still belong to the previous section
    // and must not be applied.)
    let mut cruise = rt.exec.segment_velocity;
    if rt.exec.section == Section::Head
        && matches!(
            rt.exec.section_state,
            SectionState::FirstHalf | SectionState::SecondHalf
        )
    {
        cruise += rt.exec.fdiff.f5;
    }
    rt.shared.entry_velocity = cruise;

    rt.exec.section = Section::Tail;
    rt.exec.section_state = SectionState::New;
    rt.exec.jerk = queue.block(run_ix).jerk;

    let available_length = rt.exec.remaining_length();
    let braking_length = ramp::target_length(0.0, cruise, queue.block(run_ix));

    let r = rt.shared.r_mut();
    r.cruise_velocity = cruise;
    r.cruise_acceleration = 0.0;
    r.cruise_jerk = 0.0;
    r.exit_acceleration = 0.0;
    r.exit_jerk = 0.0;
    r.head_length = 0.0;
    r.body_length = 0.0;
    r.tail_length = braking_length;

    if near_eq(available_length, braking_length) {
        // Case 1c: the braking length is almost exactly the remainder.
        machine.hold_state = HoldState::DecelToZero;
        r.exit_velocity = 0.0;
        r.tail_length = available_length;
    } else if available_length < braking_length {
        // Case 1b: the deceleration spans into following blocks.
        machine.hold_state = HoldState::DecelContinue;
        r.tail_length = available_length;
        r.exit_velocity =
            cruise - ramp::target_velocity(0.0, r.tail_length, queue.block(run_ix));
    } else {
        // Case 1a: the deceleration fits in this block.
        machine.hold_state = HoldState::DecelToZero;
        r.exit_velocity = 0.0;
    }
    r.tail_time = r.tail_length * 2.0 / (r.exit_velocity + r.cruise_velocity);

    debug!(
        cruise,
        available_length,
        braking_length,
        state = ?machine.hold_state,
        "feedhold deceleration synthesised"
    );
}

/// Cases 8/9: end the hold. Resumes queued motion or stops the cycle.
pub(crate) fn exit_hold(queue: &PlannerQueue, machine: &mut Machine, hal: &mut dyn MotionHal) {
    machine.hold_state = HoldState::Off;
    if queue.has_runnable_buffer() {
        machine.set_motion_state(MotionState::Run);
        hal.request_exec();
        hal.request_status_report(ReportKind::Immediate);
    } else {
        machine.set_motion_state(MotionState::Stop);
    }
}
