//! Executor and planner status codes.
//!
//! Recoverable outcomes are plain enum values; the caller uses them to
//! decide whether to reload the steppers. Invariant breaches are typed
//! errors that the caller escalates to the machine panic path; the
//! execution core never spins or traps in place.

use thiserror::Error;

/// Outcome of one executor or planner invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The move (or plan pass) is done. For the executor this ends the
    /// move and frees the run buffer.
    Done,
    /// More segments remain; call again.
    Again,
    /// Nothing happened; do not load the steppers.
    Noop,
}

/// Fatal conditions raised by the execution core.
///
/// Every variant corresponds to a state the pipeline cannot recover
/// from in place. The caller must halt motion and alarm the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExecError {
    /// A section length went negative during planning or extension.
    #[error("negative section length in {0}")]
    NegativeLength(&'static str),

    /// A move demands a segment shorter than the hard floor and cannot
    /// be merged away.
    #[error("minimum-time move: {0}")]
    MinimumTimeMove(&'static str),

    /// Planner-side invariant breach.
    #[error("planner assertion: {0}")]
    PlannerAssertion(&'static str),

    /// Executor-side invariant breach.
    #[error("executor internal error: {0}")]
    Internal(&'static str),

    /// A group extension arrived after its tail already started running.
    #[error("group extension into a running tail")]
    ExtensionIntoTail,

    /// A group extension would shrink the body into already-executed
    /// territory.
    #[error("group extension into executed body")]
    ExtensionIntoExecutedBody,

    /// The step generator rejected a prepared segment.
    #[error("stepper prep failed: {0}")]
    PrepFailed(&'static str),
}
