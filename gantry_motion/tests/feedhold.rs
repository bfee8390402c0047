//! Feedhold scenarios: mid-body holds, in-tail holds, multi-block
//! deceleration continuation, and resume.

use gantry_common::{ExecOutcome, HoldState, MotionState, Section};
use gantry_motion::hal::sim::SimHal;
use gantry_motion::{AlineRequest, MotionCore};

const STEPS_PER_MM: f64 = 80.0;

fn aline(target_x: f64, cruise: f64, exit: f64, exit_vmax: f64) -> AlineRequest {
    AlineRequest {
        target: [target_x, 0.0, 0.0, 0.0],
        cruise_vmax: cruise,
        exit_velocity: exit,
        exit_vmax,
        jerk: 1e6,
    }
}

fn step(core: &mut MotionCore, hal: &mut SimHal) -> ExecOutcome {
    let outcome = core.exec_move(hal).expect("executor fault");
    if hal.take_plan_request() {
        while core.plan_move(hal).expect("planner fault") != ExecOutcome::Noop {}
    }
    outcome
}

/// Drive until the machine parks in `Hold` (draining the step queue
/// once the runtime work is done).
fn drive_to_hold(core: &mut MotionCore, hal: &mut SimHal, max_rounds: usize) {
    for _ in 0..max_rounds {
        if core.machine.hold_state == HoldState::Pending {
            hal.drain();
        }
        step(core, hal);
        if core.machine.hold_state == HoldState::Hold {
            return;
        }
    }
    panic!("hold not reached in {max_rounds} rounds");
}

fn run_to_completion(core: &mut MotionCore, hal: &mut SimHal, max_rounds: usize) {
    for _ in 0..max_rounds {
        let outcome = step(core, hal);
        if outcome == ExecOutcome::Noop && core.queue.is_empty() {
            return;
        }
    }
    panic!("pipeline did not drain in {max_rounds} rounds");
}

#[test]
fn hold_mid_body_decelerates_within_the_block() {
    let mut core = MotionCore::new();
    let mut hal = SimHal::new(STEPS_PER_MM);
    core.queue
        .enqueue_aline(&aline(50.0, 200.0, 0.0, 0.0))
        .unwrap();

    // Run until 10mm in (well inside the body).
    for _ in 0..10_000 {
        step(&mut core, &mut hal);
        if core.rt.exec.position[0] >= 10.0 {
            break;
        }
    }
    assert!(core.rt.exec.position[0] >= 10.0);
    assert_eq!(core.rt.exec.section, Section::Body);
    assert!(core.request_hold());

    drive_to_hold(&mut core, &mut hal, 10_000);

    // Braking from 200 mm/s under 1e6 jerk takes ≈2.8mm; far less
    // than the 40mm remaining, so one block resolves the hold.
    let position = core.rt.exec.position[0];
    assert!(position < 50.0, "hold must stop before the move target");
    assert!(position > 10.0, "deceleration still advances");
    assert!(hal.velocity_zeroed);
    assert!(hal.controller_released);
    assert!(hal.immediate_reports >= 1);

    // The rewound block's length is the untravelled remainder.
    let run_ix = core.queue.get_run_buffer().expect("block still queued");
    let remainder = core.queue.block(run_ix).length;
    assert!(
        (remainder - (50.0 - position)).abs() < 1e-6,
        "rewound length {remainder} vs remaining {}",
        50.0 - position
    );
}

#[test]
fn resume_after_hold_reaches_the_original_target() {
    let mut core = MotionCore::new();
    let mut hal = SimHal::new(STEPS_PER_MM);
    core.queue
        .enqueue_aline(&aline(50.0, 200.0, 0.0, 0.0))
        .unwrap();

    for _ in 0..10_000 {
        step(&mut core, &mut hal);
        if core.rt.exec.position[0] >= 10.0 {
            break;
        }
    }
    assert!(core.request_hold());
    drive_to_hold(&mut core, &mut hal, 10_000);

    core.exit_hold(&mut hal);
    assert_eq!(core.machine.motion_state, MotionState::Run);
    assert!(hal.take_exec_request());

    run_to_completion(&mut core, &mut hal, 10_000);
    hal.drain();
    assert!((core.rt.exec.position[0] - 50.0).abs() < 1e-9);
    assert!((hal.motor_position(0) - 50.0).abs() < 1e-6);
    assert_eq!(core.machine.motion_state, MotionState::Stop);
}

#[test]
fn hold_in_tail_continues_the_planned_deceleration() {
    let mut core = MotionCore::new();
    let mut hal = SimHal::new(STEPS_PER_MM);
    core.queue
        .enqueue_aline(&aline(10.0, 100.0, 0.0, 0.0))
        .unwrap();

    // Run until the tail is executing.
    for _ in 0..10_000 {
        step(&mut core, &mut hal);
        if core.rt.exec.section == Section::Tail && core.rt.exec.position[0] > 9.0 {
            break;
        }
    }
    assert_eq!(core.rt.exec.section, Section::Tail);
    assert!(core.request_hold());

    drive_to_hold(&mut core, &mut hal, 10_000);

    // The tail already decelerated to zero at the move target; nothing
    // was rewound and the queue is empty.
    assert!((core.rt.exec.position[0] - 10.0).abs() < 1e-9);
    assert!(core.queue.is_empty());

    core.exit_hold(&mut hal);
    assert_eq!(core.machine.motion_state, MotionState::Stop);
}

#[test]
fn hold_spanning_multiple_blocks() {
    let mut core = MotionCore::new();
    let mut hal = SimHal::new(STEPS_PER_MM);
    // A short, fast block whose remainder cannot absorb the braking
    // length, followed by a long one that can.
    core.queue
        .enqueue_aline(&aline(2.0, 200.0, 200.0, 200.0))
        .unwrap();
    core.queue
        .enqueue_aline(&aline(32.0, 200.0, 0.0, 0.0))
        .unwrap();

    // Hold late in the first block.
    for _ in 0..10_000 {
        step(&mut core, &mut hal);
        if core.rt.exec.position[0] >= 1.1 {
            break;
        }
    }
    assert!(core.request_hold());

    // The deceleration spans into the second block.
    let mut saw_continue = false;
    for _ in 0..10_000 {
        if core.machine.hold_state == HoldState::DecelContinue {
            saw_continue = true;
        }
        if core.machine.hold_state == HoldState::Pending {
            hal.drain();
        }
        step(&mut core, &mut hal);
        if core.machine.hold_state == HoldState::Hold {
            break;
        }
    }
    assert_eq!(core.machine.hold_state, HoldState::Hold);
    assert!(saw_continue, "deceleration should have continued across blocks");
    let held_at = core.rt.exec.position[0];
    assert!(held_at > 1.1 && held_at < 10.0, "held at {held_at}");

    // No segment ever reverses while braking.
    for segment in &hal.segments {
        assert!(segment.travel_steps[0] >= -1e-9);
    }

    core.exit_hold(&mut hal);
    run_to_completion(&mut core, &mut hal, 20_000);
    hal.drain();
    assert!((core.rt.exec.position[0] - 32.0).abs() < 1e-9);
    assert!((hal.motor_position(0) - 32.0).abs() < 1e-6);
}

#[test]
fn hold_request_rejected_when_stopped() {
    let mut core = MotionCore::new();
    assert!(!core.request_hold());
    assert_eq!(core.machine.hold_state, HoldState::Off);
}
