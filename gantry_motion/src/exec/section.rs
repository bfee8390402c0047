//! Section runners: head, body, tail.
//!
//! Each runner owns the segment-count bookkeeping for its section,
//! falls through to the next section when its length is zero, and
//! handles the one-segment degenerate case (mean velocity, no forward
//! differences). The body is special: constant velocity, only the
//! second-half sub-state, and a remaining-length recheck on every
//! re-entry so multi-block bodies can extend under it.

use gantry_common::consts::{MIN_SEGMENT_TIME, NOM_SEGMENT_USEC, USEC_PER_SEC};
use gantry_common::float::near_zero;
use gantry_common::{ExecError, ExecOutcome, GroupState, Section, SectionState};
use tracing::warn;

use crate::block::BlockIx;
use crate::fdiff::ForwardDiffs;
use crate::hal::MotionHal;
use crate::machine::Machine;
use crate::queue::PlannerQueue;
use crate::runtime::MotionRuntime;

use super::segment::emit_segment;

/// Number of segments for a section of the given duration.
#[inline]
fn section_segments(section_time: f64) -> f64 {
    (section_time * USEC_PER_SEC / NOM_SEGMENT_USEC).ceil().max(1.0)
}

/// Acceleration ramp: entry → cruise.
pub(crate) fn run_head(
    queue: &mut PlannerQueue,
    rt: &mut MotionRuntime,
    machine: &Machine,
    run_ix: BlockIx,
    hal: &mut dyn MotionHal,
) -> Result<ExecOutcome, ExecError> {
    if rt.exec.section_state == SectionState::New {
        let r = *rt.shared.r();
        if near_zero(r.head_length) {
            rt.exec.section = Section::Body;
            return run_body(queue, rt, machine, run_ix, hal);
        }
        rt.exec.segments = section_segments(r.head_time);
        rt.exec.segment_time = r.head_time / rt.exec.segments;
        rt.exec.segment_count = rt.exec.segments as u32;

        if rt.exec.segment_count == 1 {
            // Single segment: average the velocities and skip straight
            // to the second half so last-segment detection still works.
            rt.exec.segment_velocity = (rt.shared.entry_velocity + r.cruise_velocity) / 2.0;
            rt.exec.fdiff.clear();
            rt.exec.section_state = SectionState::SecondHalf;
        } else {
            let (fdiff, first_velocity) = ForwardDiffs::init(
                rt.shared.entry_velocity,
                r.cruise_velocity,
                rt.shared.entry_acceleration,
                r.cruise_acceleration,
                rt.shared.entry_jerk,
                r.cruise_jerk,
                r.head_time,
                rt.exec.segments,
            );
            rt.exec.fdiff = fdiff;
            rt.exec.segment_velocity = first_velocity;
            rt.exec.section_state = SectionState::FirstHalf;
        }
        if rt.exec.segment_time < MIN_SEGMENT_TIME {
            // Exit without advancing position; the encoders absorb it.
            warn!(segment_time = rt.exec.segment_time, "head below minimum segment time, move discarded");
            return Ok(ExecOutcome::Done);
        }
        rt.exec.section = Section::Head;
    }

    // Forward differencing wants the first segment in the first half;
    // a one-segment section skips it.
    if rt.exec.section_state == SectionState::FirstHalf {
        if emit_segment(&mut rt.exec, machine, queue, hal)? == ExecOutcome::Done {
            rt.exec.section = Section::Body;
            rt.exec.section_state = SectionState::New;
        } else {
            rt.exec.section_state = SectionState::SecondHalf;
        }
        return Ok(ExecOutcome::Again);
    }

    if rt.exec.section_state == SectionState::SecondHalf {
        rt.exec.segment_velocity += rt.exec.fdiff.f5;
        if emit_segment(&mut rt.exec, machine, queue, hal)? == ExecOutcome::Done {
            let r = rt.shared.r();
            if near_zero(r.body_length) && near_zero(r.tail_length) {
                return Ok(ExecOutcome::Done); // head-only move
            }
            rt.exec.section = Section::Body;
            rt.exec.section_state = SectionState::New;
        } else {
            rt.exec.fdiff.advance();
        }
    }
    Ok(ExecOutcome::Again)
}

/// Cruise plateau.
///
/// Sliced into segments even though velocity is constant, so feedholds
/// can land mid-line with segment latency.
pub(crate) fn run_body(
    queue: &mut PlannerQueue,
    rt: &mut MotionRuntime,
    machine: &Machine,
    run_ix: BlockIx,
    hal: &mut dyn MotionHal,
) -> Result<ExecOutcome, ExecError> {
    if rt.exec.segment_velocity < 0.0 {
        return Err(ExecError::Internal("negative segment velocity"));
    }

    if rt.exec.section_state == SectionState::New {
        let r = *rt.shared.r();
        let remaining_body_length = r.body_length - rt.exec.executed_body_length;
        if near_zero(remaining_body_length) {
            rt.exec.section = Section::Tail;
            return run_tail(queue, rt, machine, run_ix, hal);
        }

        // Rebuild the body and tail waypoints from where we stand now:
        // the body (and the tail behind it) may have grown since setup,
        // either mid-run or while a previous batch of body segments was
        // executing.
        for axis in 0..rt.exec.position.len() {
            rt.exec.waypoint[Section::Body as usize][axis] =
                rt.exec.position[axis] + rt.exec.unit[axis] * remaining_body_length;
            rt.exec.waypoint[Section::Tail as usize][axis] = rt.exec.position[axis]
                + rt.exec.unit[axis] * (remaining_body_length + r.tail_length);
        }

        let body_time = r.body_time - rt.exec.executed_body_time;
        rt.exec.segments = section_segments(body_time);
        rt.exec.segment_time = body_time / rt.exec.segments;
        rt.exec.segment_velocity = r.cruise_velocity;
        rt.exec.segment_count = rt.exec.segments as u32;
        if rt.exec.segment_time < MIN_SEGMENT_TIME {
            warn!(segment_time = rt.exec.segment_time, "body below minimum segment time, move discarded");
            return Ok(ExecOutcome::Done);
        }

        rt.exec.executed_body_length = r.body_length;
        rt.exec.executed_body_time = r.body_time;

        rt.exec.section = Section::Body;
        rt.exec.section_state = SectionState::SecondHalf;
    }

    if rt.exec.section_state == SectionState::SecondHalf
        && emit_segment(&mut rt.exec, machine, queue, hal)? == ExecOutcome::Done
    {
        // Re-enter the body: if it extended meanwhile there is more to
        // run, otherwise the new-state path falls through to the tail.
        rt.exec.section_state = SectionState::New;
    }
    Ok(ExecOutcome::Again)
}

/// Deceleration ramp: cruise → exit.
pub(crate) fn run_tail(
    queue: &mut PlannerQueue,
    rt: &mut MotionRuntime,
    machine: &Machine,
    run_ix: BlockIx,
    hal: &mut dyn MotionHal,
) -> Result<ExecOutcome, ExecError> {
    if rt.exec.section_state == SectionState::New {
        // Once the tail starts nothing upstream may replan this block.
        queue.block_mut(run_ix).plannable = false;

        // Release the running group slot for reuse unless it is still
        // handing out tail length to later blocks.
        if rt.shared.r_group().group_state == GroupState::Done {
            rt.shared.r_group_mut().group_state = GroupState::Off;
        }

        let r = *rt.shared.r();
        if near_zero(r.tail_length) {
            return Ok(ExecOutcome::Done); // ends the move
        }
        rt.exec.segments = section_segments(r.tail_time);
        rt.exec.segment_time = r.tail_time / rt.exec.segments;
        rt.exec.segment_count = rt.exec.segments as u32;

        if rt.exec.segment_count == 1 {
            rt.exec.segment_velocity = (r.cruise_velocity + r.exit_velocity) / 2.0;
            rt.exec.fdiff.clear();
            rt.exec.section_state = SectionState::SecondHalf;
        } else {
            let (fdiff, first_velocity) = ForwardDiffs::init(
                r.cruise_velocity,
                r.exit_velocity,
                r.cruise_acceleration,
                r.exit_acceleration,
                r.cruise_jerk,
                r.exit_jerk,
                r.tail_time,
                rt.exec.segments,
            );
            rt.exec.fdiff = fdiff;
            rt.exec.segment_velocity = first_velocity;
            rt.exec.section_state = SectionState::FirstHalf;
        }
        if rt.exec.segment_time < MIN_SEGMENT_TIME {
            warn!(segment_time = rt.exec.segment_time, "tail below minimum segment time, move discarded");
            return Ok(ExecOutcome::Done);
        }
        rt.exec.section = Section::Tail;
    }

    if rt.exec.section_state == SectionState::FirstHalf {
        return if emit_segment(&mut rt.exec, machine, queue, hal)? == ExecOutcome::Done {
            // Only one segment was in this section after all.
            rt.exec.section_state = SectionState::SecondHalf;
            Ok(ExecOutcome::Done) // completes the move
        } else {
            rt.exec.section_state = SectionState::SecondHalf;
            Ok(ExecOutcome::Again)
        };
    }

    if rt.exec.section_state == SectionState::SecondHalf {
        rt.exec.segment_velocity += rt.exec.fdiff.f5;
        if emit_segment(&mut rt.exec, machine, queue, hal)? == ExecOutcome::Done {
            return Ok(ExecOutcome::Done); // completes the move
        }
        rt.exec.fdiff.advance();
    }
    Ok(ExecOutcome::Again)
}
