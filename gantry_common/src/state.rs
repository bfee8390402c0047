//! Lifecycle state machines for the motion pipeline.
//!
//! Buffer lifecycle: Empty → Prepped → Planned → Running → Empty, with a
//! single sanctioned downgrade (Planned → Prepped, forcing a replan of a
//! block that has not started running).
//!
//! Group lifecycle: Off → Ramped → Head → Body → Tail → Done → Off. A
//! group spans one or more queued blocks sharing a single
//! head/body/tail velocity ramp.
//!
//! Feedhold lifecycle: Off → Sync → DecelToZero/DecelContinue →
//! DecelEnd → Pending → Hold → Off.

/// Lifecycle of one planner queue entry.
///
/// Monotonically advancing except for the explicit Planned → Prepped
/// downgrade the planner uses to force a replan. At most one entry is
/// `Running` and at most one is `Planned` at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum BufferState {
    /// Slot is free.
    #[default]
    Empty,
    /// Loaded by the main loop, not yet forward-planned.
    Prepped,
    /// Forward-planned into a runtime slot; ready to run.
    Planned,
    /// Currently being executed.
    Running,
}

/// Lifecycle of a ramp group while it is planned and dispersed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupState {
    /// Slot is free, or the group has fully executed.
    #[default]
    Off,
    /// Ramps computed; head/body/tail not yet dispersed onto blocks.
    Ramped,
    /// Dispersing head length onto blocks.
    Head,
    /// Dispersing body length onto blocks.
    Body,
    /// Dispersing tail length onto blocks.
    Tail,
    /// Fully dispersed; kept around in case the body extends.
    Done,
}

impl GroupState {
    /// Whether dispersal has started (state is past `Ramped`).
    #[inline]
    pub const fn dispersing(&self) -> bool {
        matches!(self, Self::Head | Self::Body | Self::Tail)
    }
}

/// Move-level state, tracked on both the block and the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveState {
    /// No move active.
    #[default]
    Off,
    /// Move set up, first segment not yet emitted.
    New,
    /// Move is emitting segments.
    Run,
}

/// The three sections of a trapezoid profile. The discriminants index
/// the waypoint table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Section {
    /// Acceleration ramp (entry → cruise).
    #[default]
    Head = 0,
    /// Constant-velocity plateau.
    Body = 1,
    /// Deceleration ramp (cruise → exit).
    Tail = 2,
}

/// Per-section execution sub-state.
///
/// Forward differencing emits the first segment of a section in
/// `FirstHalf`; every later segment advances the difference registers in
/// `SecondHalf`. The body uses only `SecondHalf` so last-segment
/// detection works without ramp math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SectionState {
    /// No section active.
    #[default]
    Off,
    /// Section needs initialisation on next entry.
    New,
    /// First segment of the section (concave part of the ramp).
    FirstHalf,
    /// Remaining segments (convex part of the ramp).
    SecondHalf,
}

/// Machine-level motion state (the subset the execution core owns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionState {
    /// No motion; queue may be empty or cycle not started.
    #[default]
    Stop,
    /// Executing queued moves.
    Run,
    /// Feedhold in progress or holding.
    Hold,
}

/// Feedhold controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HoldState {
    /// No hold requested.
    #[default]
    Off,
    /// Hold requested; executor has not yet synthesised the deceleration.
    Sync,
    /// Decelerating, but the braking length spans into following blocks.
    DecelContinue,
    /// Decelerating to zero velocity within the current block.
    DecelToZero,
    /// Deceleration finished; runtime reset and queue replan pending.
    DecelEnd,
    /// Waiting for the step generator to drain.
    Pending,
    /// Machine is holding; no motion until the hold is exited.
    Hold,
}

impl HoldState {
    /// Whether a deceleration is actively being executed.
    #[inline]
    pub const fn decelerating(&self) -> bool {
        matches!(self, Self::DecelContinue | Self::DecelToZero)
    }
}
