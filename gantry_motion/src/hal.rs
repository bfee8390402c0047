//! The hardware boundary of the execution core.
//!
//! One trait covers every collaborator the executor and planner call
//! out to: stepper prep, inverse kinematics, encoder sampling, and the
//! reporting/lifecycle hooks. Hardware backends and the simulation
//! driver plug in behind it.
//!
//! ## Timing contract
//!
//! Every method is called from the execution or planning interrupt
//! analogue and must be non-blocking: no allocation, no locks, no I/O
//! beyond latching a request flag.

pub mod sim;

use gantry_common::consts::{AXES, MOTORS};
use gantry_common::ExecError;

/// Status report urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// Batched on the reporting interval.
    Timed,
    /// Flush as soon as the reporter runs.
    Immediate,
}

/// Collaborator interface consumed by the execution core.
pub trait MotionHal {
    /// Hand one prepared segment to the step generator.
    fn prep_line(
        &mut self,
        travel_steps: &[f64; MOTORS],
        following_error: &[f64; MOTORS],
        segment_time: f64,
    ) -> Result<(), ExecError>;

    /// Tell the step generator there is nothing to load.
    fn prep_null(&mut self);

    /// Latch a request to run the planner pass.
    fn request_plan(&mut self);

    /// Latch a request to run the executor pass.
    fn request_exec(&mut self);

    /// Whether the step generator has drained all prepared segments.
    fn runtime_is_idle(&self) -> bool;

    /// Zero the velocity shown in status reports (hold reached).
    fn zero_segment_velocity(&mut self);

    /// Map an axis-space target to motor steps.
    fn inverse_kinematics(&self, target: &[f64; AXES], steps: &mut [f64; MOTORS]);

    /// Sample one motor's encoder [steps].
    fn read_encoder(&self, motor: usize) -> f64;

    /// Ask the reporter for a status report.
    fn request_status_report(&mut self, kind: ReportKind);

    /// Report a non-fatal exception.
    fn exception(&mut self, msg: &str);

    /// The planner queue emptied; the machining cycle is over.
    fn cycle_end(&mut self);

    /// Release the host controller's input pause (hold reached).
    fn controller_ready(&mut self);
}
