//! The aline executor.
//!
//! Fires from the execution interrupt. Each call must execute and prep
//! *one and only one* segment: `Again` while segments remain, `Done` on
//! the move's last segment, `Noop` when the steppers must not be
//! loaded. Anything else is a fatal error that ends the move. Breaking
//! the one-segment contract introduces subtle, hard-to-diagnose timing
//! bugs downstream in the step loader.
//!
//! New-move setup swaps the dual-buffered runtime (run ← plan), merges
//! sections too short to slice into segments, and precomputes the
//! section-end waypoints used for drift correction. From that point on
//! the block's planned contents no longer affect execution; only the
//! runtime slots do.

use gantry_common::consts::{AXES, MIN_SEGMENT_TIME};
use gantry_common::float::{near_eq, near_zero};
use gantry_common::{
    ExecError, ExecOutcome, GroupState, HoldState, MotionState, MoveState, Section, SectionState,
};
use tracing::{debug, trace};

use crate::block::BlockIx;
use crate::feedhold;
use crate::hal::{MotionHal, ReportKind};
use crate::machine::Machine;
use crate::queue::PlannerQueue;
use crate::runtime::MotionRuntime;

use super::section;

/// Run one segment of the aline in the run buffer.
pub(crate) fn exec_aline(
    queue: &mut PlannerQueue,
    rt: &mut MotionRuntime,
    machine: &mut Machine,
    run_ix: BlockIx,
    hal: &mut dyn MotionHal,
) -> Result<ExecOutcome, ExecError> {
    if queue.block(run_ix).move_state == MoveState::Off {
        return Ok(ExecOutcome::Noop);
    }

    // Parked hold states (decel done, draining, holding) are handled
    // before new-move setup so the dual-buffered runtime is never
    // spuriously swapped while the machine stands still.
    if machine.motion_state == MotionState::Hold {
        if let Some(outcome) = feedhold::park(queue, rt, machine, run_ix, hal)? {
            return Ok(outcome);
        }
    }

    if rt.exec.move_state == MoveState::Off {
        setup_new_move(queue, rt, run_ix, hal)?;
    }

    // An in-progress hold traps the move into a synthetic tail-only
    // deceleration; the ordinary tail runner below executes it.
    if machine.motion_state == MotionState::Hold {
        feedhold::sync_hold(queue, rt, machine);
    }

    rt.exec.move_state = MoveState::Run;

    // From here on the block contents do not affect execution.
    let status = match rt.exec.section {
        Section::Head => section::run_head(queue, rt, machine, run_ix, hal)?,
        Section::Body => section::run_body(queue, rt, machine, run_ix, hal)?,
        Section::Tail => section::run_tail(queue, rt, machine, run_ix, hal)?,
    };

    // The head may have fallen through to the body and the body to the
    // tail, so age plannability only after dispatch: once in the tail,
    // or close to the end of the body, the block must not be replanned.
    if rt.exec.section == Section::Tail
        || (rt.exec.section == Section::Body && rt.exec.segment_count < 3)
    {
        queue.block_mut(run_ix).plannable = false;
    }

    // Feedhold: a deceleration-to-zero that just finished moves the
    // hold machine on and rewinds the block so its remainder can run
    // after the hold lifts.
    if machine.hold_state == HoldState::DecelToZero && status == ExecOutcome::Done {
        machine.hold_state = HoldState::DecelEnd;
        queue.block_mut(run_ix).move_state = MoveState::New;
    }

    if status == ExecOutcome::Again {
        hal.request_status_report(ReportKind::Timed);
    } else {
        finish_move(queue, rt, machine, run_ix, hal);
    }
    Ok(status)
}

/// Set up the runtime singleton for a fresh block.
fn setup_new_move(
    queue: &mut PlannerQueue,
    rt: &mut MotionRuntime,
    run_ix: BlockIx,
    hal: &mut dyn MotionHal,
) -> Result<(), ExecError> {
    // Too-short lines are removed upstream; alert if one slips through.
    if near_zero(queue.block(run_ix).length) {
        hal.exception("exec_aline: zero length move");
    }

    queue.block_mut(run_ix).move_state = MoveState::Run;
    rt.exec.move_state = MoveState::New;
    rt.exec.section = Section::Head;
    rt.exec.section_state = SectionState::New;
    rt.exec.jerk = queue.block(run_ix).jerk;

    // Group pointers move *before* the run/plan block swap.
    if rt.shared.r_group().group_state == GroupState::Off {
        rt.shared.group_entry_velocity = rt.shared.r_group().exit_velocity;
        rt.shared.advance_groups();
    } else {
        // Mid-group: bank the finished block's contribution so a
        // multi-block body can keep extending.
        let (head, body) = (rt.shared.r().head_length, rt.shared.r().body_length);
        let group = rt.shared.r_group_mut();
        group.completed_head_length += head;
        group.completed_body_length += body;
    }

    rt.shared.advance_blocks();
    rt.shared.p_mut().planned = false;

    maintain_group_links(queue, rt, run_ix);

    rt.exec.executed_body_length = 0.0;
    rt.exec.executed_body_time = 0.0;

    merge_short_sections(rt)?;

    let (unit, target, axis_flags, move_time) = {
        let bf = queue.block(run_ix);
        (bf.unit, bf.target, bf.axis_flags, bf.move_time)
    };
    rt.exec.unit = unit;
    rt.exec.target = target;
    rt.exec.axis_flags = axis_flags;

    // Waypoints anchor each section end to exact geometry.
    let r = *rt.shared.r();
    for axis in 0..AXES {
        let position = rt.exec.position[axis];
        let unit = rt.exec.unit[axis];
        rt.exec.waypoint[Section::Head as usize][axis] = position + unit * r.head_length;
        rt.exec.waypoint[Section::Body as usize][axis] =
            position + unit * (r.head_length + r.body_length);
        rt.exec.waypoint[Section::Tail as usize][axis] =
            position + unit * (r.head_length + r.body_length + r.tail_length);
    }

    queue.run_time_remaining = move_time;
    debug!(
        block = run_ix,
        head = r.head_length,
        body = r.body_length,
        tail = r.tail_length,
        "aline started"
    );
    Ok(())
}

/// Keep the group chain consistent as a block starts running.
fn maintain_group_links(queue: &mut PlannerQueue, rt: &mut MotionRuntime, run_ix: BlockIx) {
    let nx = queue.block(run_ix).nx;
    let nx_group = queue.block(run_ix).nx_group;

    if nx_group != nx {
        // Not the last block of the group: push the group bookkeeping
        // forward so the next block can carry it.
        let (plannable, group_length, cruise_vmax, cruise_velocity, exit_vmax, exit_velocity) = {
            let bf = queue.block(run_ix);
            (
                bf.plannable,
                bf.group_length,
                bf.cruise_vmax,
                bf.cruise_velocity,
                bf.exit_vmax,
                bf.exit_velocity,
            )
        };
        let jerk_differs = !near_eq(queue.block(nx).jerk, queue.block(run_ix).jerk);
        let jerk_source = queue.block(run_ix).clone();

        let next = queue.block_mut(nx);
        next.nx_group = nx_group;
        next.plannable = plannable;
        next.group_length = group_length;
        next.cruise_vmax = cruise_vmax;
        next.cruise_velocity = cruise_velocity;
        next.exit_vmax = exit_vmax;
        next.exit_velocity = exit_velocity;
        if jerk_differs {
            next.copy_jerk(&jerk_source);
        }
    }

    queue.block_mut(nx_group).pv_group = run_ix;
    let pv = queue.block(run_ix).pv;
    queue.block_mut(run_ix).pv_group = pv;
    queue.block_mut(pv).nx_group = run_ix;

    if rt.shared.r_group().first_block == pv {
        rt.shared.r_group_mut().first_block = run_ix;
    }
}

/// Fold sections that are too brief to slice into segments into their
/// neighbours, preserving total length and arrival velocity.
fn merge_short_sections(rt: &mut MotionRuntime) -> Result<(), ExecError> {
    let entry_velocity = rt.shared.entry_velocity;
    let r = rt.shared.r_mut();

    if !near_zero(r.head_length) && r.head_time < MIN_SEGMENT_TIME {
        r.body_time += r.head_length / r.cruise_velocity;
        r.head_time = 0.0;
        r.body_length += r.head_length;
        r.head_length = 0.0;
    }
    if !near_zero(r.tail_length) && r.tail_time < MIN_SEGMENT_TIME {
        r.body_time += r.tail_length / r.cruise_velocity;
        r.tail_time = 0.0;
        r.body_length += r.tail_length;
        r.tail_length = 0.0;
    }

    // With head and tail possibly folded in, the body may still be too
    // brief. Distribute it into whatever ramps remain. Saved for last --    // it is the expensive case.
    if !near_zero(r.body_length) && r.body_time < MIN_SEGMENT_TIME {
        if !near_zero(r.cruise_jerk) {
            // Partial head/tail remnant: the ramps cannot absorb body
            // length without bending the curve. Drop it; the encoders
            // catch the position back up.
            trace!(body = r.body_length, "dropping sub-minimum body of ramp remnant");
            r.body_length = 0.0;
            r.body_time = 0.0;
        } else if r.tail_length > 0.0 {
            if r.head_length > 0.0 {
                // Split the body across head and tail.
                let body_split = r.body_length / 2.0;
                r.body_length = 0.0;
                r.head_length += body_split;
                r.tail_length += body_split;
                // TODO: the linear-average time update below is an
                // approximation; the exact recompute needs the ramp
                // curves re-fit to the stretched lengths.
                r.head_time += (2.0 * body_split) / (entry_velocity + r.cruise_velocity);
                r.tail_time += (2.0 * body_split) / (r.cruise_velocity + r.exit_velocity);
                r.body_time = 0.0;
            } else {
                r.tail_length += r.body_length;
                r.tail_time += (2.0 * r.body_length) / (r.cruise_velocity + r.exit_velocity);
                r.body_length = 0.0;
                r.body_time = 0.0;
            }
        } else if r.head_length > 0.0 {
            r.head_length += r.body_length;
            r.head_time += (2.0 * r.body_length) / (entry_velocity + r.cruise_velocity);
            r.body_length = 0.0;
        } else {
            // All body, and still too short: nothing left to merge into.
            return Err(ExecError::MinimumTimeMove("unmergeable all-body move"));
        }
    }
    Ok(())
}

/// Move-end bookkeeping: reset the runtime, hand exit conditions to the
/// next move's entry, free the buffer and maybe end the cycle.
fn finish_move(
    queue: &mut PlannerQueue,
    rt: &mut MotionRuntime,
    machine: &mut Machine,
    run_ix: BlockIx,
    hal: &mut dyn MotionHal,
) {
    rt.exec.move_state = MoveState::Off;
    rt.exec.section_state = SectionState::Off;
    queue.run_time_remaining = 0.0;

    if rt.shared.r_group().group_state == GroupState::Done {
        rt.shared.r_group_mut().group_state = GroupState::Off;
    }

    rt.shared.entry_velocity = rt.shared.r().exit_velocity;
    rt.shared.entry_acceleration = rt.shared.r().exit_acceleration;
    rt.shared.entry_jerk = rt.shared.r().exit_jerk;

    // A block rewound by feedhold (move_state New) is not freed; it
    // runs again after the hold lifts.
    if queue.block(run_ix).move_state == MoveState::Run {
        let queue_empty = queue.free_run_buffer();
        if queue_empty && machine.hold_state == HoldState::Off {
            hal.cycle_end();
            machine.set_motion_state(MotionState::Stop);
        }
    }
    debug!(block = run_ix, "aline finished");
}
