//! Simulation HAL driver.
//!
//! Cartesian kinematics, perfect motors and a one-segment execution
//! delay line: the most recently prepared segment is still "executing",
//! and the encoders report the position behind it. That matches the
//! real pipeline's alignment. At the moment a segment is being
//! prepared, `commanded_steps` is the target of two segments ago and
//! the machine has just finished executing exactly that segment, so
//! the following-error computation is exercised honestly and reads
//! zero when nothing slips.
//!
//! Every prepared segment is recorded for test inspection.

use std::collections::VecDeque;

use gantry_common::consts::{AXES, MOTORS};
use gantry_common::ExecError;
use tracing::trace;

use super::{MotionHal, ReportKind};

/// Segments in flight between prep and simulated execution.
const EXEC_DELAY: usize = 1;

/// One recorded stepper-prep call.
#[derive(Debug, Clone, Copy)]
pub struct SimSegment {
    pub travel_steps: [f64; MOTORS],
    pub following_error: [f64; MOTORS],
    pub segment_time: f64,
}

/// Simulation driver state.
#[derive(Debug)]
pub struct SimHal {
    /// Uniform step scaling [steps/mm].
    steps_per_unit: f64,
    /// Executed motor positions [steps].
    motor_steps: [f64; MOTORS],
    /// Segments prepped but not yet "executed".
    in_flight: VecDeque<[f64; MOTORS]>,
    /// All prepared segments, in order.
    pub segments: Vec<SimSegment>,
    /// Reported exceptions, in order.
    pub exceptions: Vec<String>,
    plan_requested: bool,
    exec_requested: bool,
    pub null_preps: usize,
    pub timed_reports: usize,
    pub immediate_reports: usize,
    pub cycle_ends: usize,
    pub velocity_zeroed: bool,
    pub controller_released: bool,
}

impl SimHal {
    pub fn new(steps_per_unit: f64) -> Self {
        Self {
            steps_per_unit,
            motor_steps: [0.0; MOTORS],
            in_flight: VecDeque::with_capacity(EXEC_DELAY + 1),
            segments: Vec::new(),
            exceptions: Vec::new(),
            plan_requested: false,
            exec_requested: false,
            null_preps: 0,
            timed_reports: 0,
            immediate_reports: 0,
            cycle_ends: 0,
            velocity_zeroed: false,
            controller_released: false,
        }
    }

    /// Consume a pending plan request, if one was latched.
    pub fn take_plan_request(&mut self) -> bool {
        std::mem::take(&mut self.plan_requested)
    }

    /// Consume a pending exec request, if one was latched.
    pub fn take_exec_request(&mut self) -> bool {
        std::mem::take(&mut self.exec_requested)
    }

    /// Execute all in-flight segments (the DDA finishing its queue).
    pub fn drain(&mut self) {
        while let Some(travel) = self.in_flight.pop_front() {
            for m in 0..MOTORS {
                self.motor_steps[m] += travel[m];
            }
        }
    }

    /// Executed position of one motor, converted back to [mm].
    pub fn motor_position(&self, motor: usize) -> f64 {
        self.motor_steps[motor] / self.steps_per_unit
    }

    /// Total distance prepped along one motor, in [mm]: includes
    /// segments still in flight.
    pub fn prepped_distance(&self, motor: usize) -> f64 {
        self.segments
            .iter()
            .map(|s| s.travel_steps[motor])
            .sum::<f64>()
            / self.steps_per_unit
    }

    /// Total prepped time across all segments [s].
    pub fn prepped_time(&self) -> f64 {
        self.segments.iter().map(|s| s.segment_time).sum()
    }
}

impl MotionHal for SimHal {
    fn prep_line(
        &mut self,
        travel_steps: &[f64; MOTORS],
        following_error: &[f64; MOTORS],
        segment_time: f64,
    ) -> Result<(), ExecError> {
        if segment_time <= 0.0 {
            return Err(ExecError::PrepFailed("non-positive segment time"));
        }
        trace!(segment_time, "prep_line");
        self.segments.push(SimSegment {
            travel_steps: *travel_steps,
            following_error: *following_error,
            segment_time,
        });
        self.in_flight.push_back(*travel_steps);
        while self.in_flight.len() > EXEC_DELAY {
            let travel = self.in_flight.pop_front().unwrap();
            for m in 0..MOTORS {
                self.motor_steps[m] += travel[m];
            }
        }
        Ok(())
    }

    fn prep_null(&mut self) {
        self.null_preps += 1;
    }

    fn request_plan(&mut self) {
        self.plan_requested = true;
    }

    fn request_exec(&mut self) {
        self.exec_requested = true;
    }

    fn runtime_is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    fn zero_segment_velocity(&mut self) {
        self.velocity_zeroed = true;
    }

    fn inverse_kinematics(&self, target: &[f64; AXES], steps: &mut [f64; MOTORS]) {
        // Cartesian: motor m mirrors axis m.
        for m in 0..MOTORS {
            steps[m] = target[m] * self.steps_per_unit;
        }
    }

    fn read_encoder(&self, motor: usize) -> f64 {
        self.motor_steps[motor]
    }

    fn request_status_report(&mut self, kind: ReportKind) {
        match kind {
            ReportKind::Timed => self.timed_reports += 1,
            ReportKind::Immediate => self.immediate_reports += 1,
        }
    }

    fn exception(&mut self, msg: &str) {
        self.exceptions.push(msg.to_string());
    }

    fn cycle_end(&mut self) {
        self.cycle_ends += 1;
    }

    fn controller_ready(&mut self) {
        self.controller_released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_lags_prep_by_one_segment() {
        let mut hal = SimHal::new(100.0);
        let travel = [10.0, 0.0, 0.0, 0.0];
        let err = [0.0; MOTORS];

        hal.prep_line(&travel, &err, 0.005).unwrap();
        assert_eq!(hal.read_encoder(0), 0.0);

        hal.prep_line(&travel, &err, 0.005).unwrap();
        assert_eq!(hal.read_encoder(0), 10.0);

        hal.prep_line(&travel, &err, 0.005).unwrap();
        assert_eq!(hal.read_encoder(0), 20.0);

        hal.drain();
        assert_eq!(hal.read_encoder(0), 30.0);
        assert!(hal.runtime_is_idle());
    }

    #[test]
    fn kinematics_are_cartesian() {
        let hal = SimHal::new(80.0);
        let mut steps = [0.0; MOTORS];
        hal.inverse_kinematics(&[1.0, 2.0, 3.0, 4.0], &mut steps);
        assert_eq!(steps, [80.0, 160.0, 240.0, 320.0]);
    }

    #[test]
    fn rejects_bad_segment_time() {
        let mut hal = SimHal::new(80.0);
        let z = [0.0; MOTORS];
        assert!(hal.prep_line(&z, &z, 0.0).is_err());
    }

    #[test]
    fn request_flags_latch_and_clear() {
        let mut hal = SimHal::new(80.0);
        hal.request_plan();
        assert!(hal.take_plan_request());
        assert!(!hal.take_plan_request());
    }
}
