//! Machine-level motion and hold state.
//!
//! The slice of the canonical machine the execution core owns: the
//! motion state (Stop/Run/Hold) and the feedhold state machine's
//! current phase. Everything else about the machine (alarms, homing,
//! cycle bookkeeping) stays behind the HAL hooks.

use gantry_common::{HoldState, MotionState};
use tracing::{debug, info};

/// Motion/hold state owner.
#[derive(Debug, Default)]
pub struct Machine {
    pub motion_state: MotionState,
    pub hold_state: HoldState,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition the motion state, logging the edge.
    pub fn set_motion_state(&mut self, state: MotionState) {
        if self.motion_state != state {
            debug!(from = ?self.motion_state, to = ?state, "motion state");
            self.motion_state = state;
        }
    }

    /// Request a feedhold. Only effective while running with no hold
    /// already in progress; returns whether the request was accepted.
    pub fn request_hold(&mut self) -> bool {
        if self.motion_state != MotionState::Run || self.hold_state != HoldState::Off {
            return false;
        }
        info!("feedhold requested");
        self.hold_state = HoldState::Sync;
        self.motion_state = MotionState::Hold;
        true
    }

    /// Whether a hold is in any phase of progress.
    #[inline]
    pub fn holding(&self) -> bool {
        self.hold_state != HoldState::Off
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_only_accepted_while_running() {
        let mut m = Machine::new();
        assert!(!m.request_hold());

        m.set_motion_state(MotionState::Run);
        assert!(m.request_hold());
        assert_eq!(m.hold_state, HoldState::Sync);
        assert_eq!(m.motion_state, MotionState::Hold);

        // Second request while holding is ignored.
        assert!(!m.request_hold());
    }
}
