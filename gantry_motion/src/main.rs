//! # Gantry Motion demo binary
//!
//! Loads and validates the machine configuration, then streams a small
//! simulated move program through the full plan/exec pipeline against
//! the simulation HAL and reports segment statistics.
//!
//! Useful as a smoke test of the whole pipeline and as a worked example
//! of how a host drives the core: one exec pass per "interrupt", then
//! planner passes until the latched plan request drains.

use std::path::Path;
use std::process;

use gantry_common::config::load_config;
use gantry_common::consts::MOTORS;
use gantry_common::ExecOutcome;
use gantry_motion::hal::sim::SimHal;
use gantry_motion::{AlineRequest, MotionCore};
use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/machine.toml".to_string());

    let config = match load_config(Path::new(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            error!("FATAL: {e}");
            process::exit(1);
        }
    };
    info!(
        path = %config_path,
        axes = config.axis.len(),
        "configuration loaded"
    );

    let mut core = MotionCore::new();
    let mut hal = SimHal::new(config.axis[0].steps_per_unit);

    // A small program: rapid out, two co-linear feed moves, return.
    let jerk = config.min_jerk();
    let feed = config.axis[0].max_velocity.min(120.0);
    let program = [
        AlineRequest {
            target: [20.0, 0.0, 0.0, 0.0],
            cruise_vmax: config.axis[0].max_velocity,
            exit_velocity: 0.0,
            exit_vmax: feed,
            jerk,
        },
        AlineRequest {
            target: [20.0, 15.0, 0.0, 0.0],
            cruise_vmax: feed,
            exit_velocity: 0.0,
            exit_vmax: feed,
            jerk,
        },
        AlineRequest {
            target: [20.0, 30.0, 0.0, 0.0],
            cruise_vmax: feed,
            exit_velocity: 0.0,
            exit_vmax: 0.0,
            jerk,
        },
        AlineRequest {
            target: [0.0, 0.0, 0.0, 0.0],
            cruise_vmax: config.axis[0].max_velocity,
            exit_velocity: 0.0,
            exit_vmax: 0.0,
            jerk,
        },
    ];
    for request in &program {
        if let Err(e) = core.queue.enqueue_aline(request) {
            error!("enqueue failed: {e}");
            process::exit(1);
        }
    }

    // Drive the pipeline the way the interrupts would.
    let mut exec_calls = 0u64;
    loop {
        exec_calls += 1;
        if exec_calls > 1_000_000 {
            error!("pipeline failed to drain");
            process::exit(1);
        }
        let outcome = match core.exec_move(&mut hal) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("executor fault: {e}");
                process::exit(1);
            }
        };
        if hal.take_plan_request() {
            loop {
                match core.plan_move(&mut hal) {
                    Ok(ExecOutcome::Noop) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        error!("planner fault: {e}");
                        process::exit(1);
                    }
                }
            }
        }
        if outcome == ExecOutcome::Noop && core.queue.is_empty() {
            break;
        }
    }
    hal.drain();

    let mut max_following_error = 0.0_f64;
    for segment in &hal.segments {
        for m in 0..MOTORS {
            max_following_error = max_following_error.max(segment.following_error[m].abs());
        }
    }
    info!(
        segments = hal.segments.len(),
        exec_calls,
        prepped_time_s = hal.prepped_time(),
        max_following_error,
        "program complete"
    );
    for (m, axis) in config.axis.iter().enumerate() {
        info!(
            axis = %axis.name,
            position_mm = hal.motor_position(m),
            "final motor position"
        );
    }
}
