//! The segment emitter.
//!
//! Converts one `segment_time` slice of the running section into a
//! stepper prep call: target position, step pipeline shift, following
//! error, inverse kinematics, travel steps.
//!
//! ## Step pipeline alignment
//!
//! `commanded_steps` are `target_steps` delayed by two segments, which
//! lines them up in time with the encoder samples so the following
//! error is a statement of relative position:
//!
//! ```text
//!   Encoder  Commanded  Following error
//!      100         90     +10   encoder ahead of commanded
//!      -90       -100     +10   encoder ahead of commanded
//!       90        100     -10   encoder behind commanded
//!     -100        -90     -10   encoder behind commanded
//! ```

use gantry_common::consts::{AXES, MOTORS};
use gantry_common::{ExecError, ExecOutcome, MotionState, SectionState};

use crate::hal::MotionHal;
use crate::machine::Machine;
use crate::queue::PlannerQueue;
use crate::runtime::ExecRuntime;

/// Emit exactly one segment of the current section.
///
/// Returns `Done` when this was the section's last segment, `Again`
/// otherwise.
pub(crate) fn emit_segment(
    exec: &mut ExecRuntime,
    machine: &Machine,
    queue: &mut PlannerQueue,
    hal: &mut dyn MotionHal,
) -> Result<ExecOutcome, ExecError> {
    exec.segment_count -= 1;

    // The final segment of a section lands exactly on the section
    // waypoint instead of the integrated position, cancelling
    // accumulated float error. Not while going into a hold; the hold
    // path owns the target then.
    if exec.segment_count == 0
        && exec.section_state == SectionState::SecondHalf
        && machine.motion_state != MotionState::Hold
    {
        exec.segment_target = exec.waypoint[exec.section as usize];
    } else {
        let segment_length = exec.segment_velocity * exec.segment_time;
        for axis in 0..AXES {
            exec.segment_target[axis] = exec.position[axis] + exec.unit[axis] * segment_length;
        }
    }

    // Bucket-brigade the step pipeline, then sample the encoders
    // against the (two-segment delayed) commanded position.
    for m in 0..MOTORS {
        exec.commanded_steps[m] = exec.position_steps[m];
        exec.position_steps[m] = exec.target_steps[m];
        exec.encoder_steps[m] = hal.read_encoder(m);
        exec.following_error[m] = exec.encoder_steps[m] - exec.commanded_steps[m];
    }

    // Direct step subtraction only works for Cartesian-like kinematics;
    // other geometries transform travel behind the HAL.
    hal.inverse_kinematics(&exec.segment_target, &mut exec.target_steps);
    let mut travel_steps = [0.0; MOTORS];
    for m in 0..MOTORS {
        travel_steps[m] = exec.target_steps[m] - exec.position_steps[m];
    }

    // The current segment's time is missing until it is loaded; that is
    // fine for reporting purposes.
    queue.run_time_remaining = (queue.run_time_remaining - exec.segment_time).max(0.0);

    hal.prep_line(&travel_steps, &exec.following_error, exec.segment_time)?;
    exec.position = exec.segment_target;

    if exec.segment_count == 0 {
        Ok(ExecOutcome::Done)
    } else {
        Ok(ExecOutcome::Again)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::SimHal;
    use gantry_common::Section;

    fn runtime_for_segments(count: u32) -> ExecRuntime {
        let mut exec = ExecRuntime::new();
        exec.section = Section::Body;
        exec.section_state = SectionState::SecondHalf;
        exec.segment_count = count;
        exec.segment_time = 0.005;
        exec.segment_velocity = 100.0;
        exec.unit = [1.0, 0.0, 0.0, 0.0];
        exec.waypoint[Section::Body as usize] = [10.0, 0.0, 0.0, 0.0];
        exec
    }

    #[test]
    fn segment_count_decrements_by_exactly_one() {
        let mut exec = runtime_for_segments(3);
        let mut hal = SimHal::new(100.0);
        let mut queue = PlannerQueue::new();
        let machine = Machine::new();

        let out = emit_segment(&mut exec, &machine, &mut queue, &mut hal).unwrap();
        assert_eq!(out, ExecOutcome::Again);
        assert_eq!(exec.segment_count, 2);
        assert_eq!(hal.segments.len(), 1);
    }

    #[test]
    fn integrated_target_advances_by_velocity_times_time() {
        let mut exec = runtime_for_segments(5);
        let mut hal = SimHal::new(100.0);
        let mut queue = PlannerQueue::new();
        let machine = Machine::new();

        emit_segment(&mut exec, &machine, &mut queue, &mut hal).unwrap();
        assert!((exec.position[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn last_segment_snaps_to_waypoint() {
        let mut exec = runtime_for_segments(1);
        // Drift the position slightly; the waypoint must win.
        exec.position = [9.4999, 0.0, 0.0, 0.0];
        let mut hal = SimHal::new(100.0);
        let mut queue = PlannerQueue::new();
        let machine = Machine::new();

        let out = emit_segment(&mut exec, &machine, &mut queue, &mut hal).unwrap();
        assert_eq!(out, ExecOutcome::Done);
        assert_eq!(exec.position, [10.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn run_time_remaining_clamps_at_zero() {
        let mut exec = runtime_for_segments(2);
        let mut hal = SimHal::new(100.0);
        let mut queue = PlannerQueue::new();
        queue.run_time_remaining = 0.003;
        let machine = Machine::new();

        emit_segment(&mut exec, &machine, &mut queue, &mut hal).unwrap();
        assert_eq!(queue.run_time_remaining, 0.0);
    }
}
