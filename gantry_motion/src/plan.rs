//! The group-aware forward planner.
//!
//! Runs at a lower interrupt level than the executor, whenever the
//! executor latches a plan request. One pass plans at most one block:
//! it selects the working group (running vs. planning), detects group
//! extensions and exit-velocity upgrades, ramps fresh groups, and
//! disperses ramp sections onto the next unplanned block.
//!
//! ## Group selection
//!
//! ```text
//!   Group    State   Extended  Use
//!   -------  ------  --------  -------
//!   running  Off     --        planning
//!   running  Done    no        planning
//!   running  Done    yes       running
//!   running  other   --        running
//! ```
//!
//! ## Concurrency contract
//!
//! The planner never touches the executor's in-flight section state: it
//! takes the executor runtime read-only and writes only the plan-side
//! runtime slots, the run block slot during a sanctioned extension of
//! the running group, and buffer-state downgrades on blocks that have
//! not started running.

pub mod ramp;

use gantry_common::consts::EPSILON;
use gantry_common::float::{near_ge, near_ne};
use gantry_common::{BufferState, ExecError, ExecOutcome, GroupState, Section};
use tracing::{debug, trace};

use crate::block::MoveType;
use crate::hal::MotionHal;
use crate::queue::PlannerQueue;
use crate::runtime::{ExecRuntime, SharedRuntime, Slot};

/// Lookahead slack when walking blocks past locked head/body length.
const LOCK_LENGTH_SLACK: f64 = 1e-4;

/// One planner pass. Returns `Done` when something was planned, `Noop`
/// when there was nothing to do.
pub fn plan_move(
    queue: &mut PlannerQueue,
    shared: &mut SharedRuntime,
    exec: &ExecRuntime,
    hal: &mut dyn MotionHal,
) -> Result<ExecOutcome, ExecError> {
    let Some(run_ix) = queue.get_run_buffer() else {
        hal.prep_null();
        return Ok(ExecOutcome::Noop);
    };

    if queue.block(run_ix).move_type != MoveType::Aline {
        queue.block_mut(run_ix).buffer_state = BufferState::Planned;
        return Ok(ExecOutcome::Done);
    }

    // ── Group selection with extension detection ──
    let mut group_extended = false;
    let mut velocity_changed = false;

    if shared.r_group().group_state != GroupState::Off {
        detect_group_changes(
            queue,
            shared,
            exec,
            Slot::Run,
            &mut group_extended,
            &mut velocity_changed,
        )?;
    }

    let group_sel = if group_extended
        || velocity_changed
        || (shared.r_group().group_state != GroupState::Off
            && shared.r_group().group_state != GroupState::Done)
    {
        Slot::Run
    } else {
        if shared.p_group().group_state != GroupState::Off {
            detect_group_changes(
                queue,
                shared,
                exec,
                Slot::Plan,
                &mut group_extended,
                &mut velocity_changed,
            )?;
        }
        Slot::Plan
    };

    // ── Block and entry-condition selection ──
    //
    //   Extended  run buffer state  Group     Use block  Use slot  Entry from
    //   --------  ----------------  --------  ---------  --------  -------------
    //   --        below Running     --        run        plan      entry snapshot
    //   no        Running           --        run.nx     plan      r exit
    //   yes       Running           running   run        run       entry snapshot
    //   yes       Running           planning  run.nx     plan      r exit
    let mut bf_ix = run_ix;
    let mut block_sel = Slot::Plan;
    let mut entry_velocity = shared.entry_velocity;
    let mut entry_acceleration = shared.entry_acceleration;
    let mut entry_jerk = shared.entry_jerk;

    if queue.block(run_ix).buffer_state == BufferState::Running {
        if (group_extended || velocity_changed) && group_sel == Slot::Run {
            block_sel = Slot::Run;
        } else if group_sel == Slot::Plan && shared.p_group().group_state == GroupState::Done {
            // Everything plannable is planned.
            return Ok(ExecOutcome::Noop);
        } else {
            bf_ix = queue.block(run_ix).nx;
            if queue.block(bf_ix).move_type != MoveType::Aline {
                queue.block_mut(bf_ix).buffer_state = BufferState::Planned;
                return Ok(ExecOutcome::Done);
            }
            entry_velocity = shared.r().exit_velocity;
            entry_acceleration = shared.r().exit_acceleration;
            entry_jerk = shared.r().exit_jerk;
        }
    }

    if queue.block(bf_ix).buffer_state < BufferState::Prepped {
        return Ok(ExecOutcome::Noop);
    }

    // ── Ramp a fresh group ──
    if queue.block(bf_ix).buffer_state == BufferState::Prepped
        && shared.group_slot(group_sel).group_state == GroupState::Off
    {
        {
            let group = shared.group_slot_mut(group_sel);
            ramp::calculate_ramps(queue.block(bf_ix), group, entry_velocity)?;
            group.completed_head_length = 0.0;
            group.completed_body_length = 0.0;
            group.first_block = bf_ix;
            group.length_into_section = 0.0;
            group.t_into_section = 0.0;
            group.group_state = GroupState::Ramped;
        }
        let group = shared.group_slot_mut(group_sel);
        group.length = queue.block(bf_ix).group_length;
        debug!(block = bf_ix, length = group.length, "group ramped");
    }

    // ── Advance the group's first block past locked-in length ──
    //
    // Back-planning only reads the first block of a group. Walk past
    // blocks that are pure head/body (their length is already locked)
    // and pin the ramp's velocities onto the block that owns the tail,
    // so a late exit-velocity upgrade lands where it can still matter.
    if shared.group_slot(group_sel).group_state == GroupState::Ramped {
        let group = shared.group_slot(group_sel);
        let mut lock_length_left = (group.head_length - group.completed_head_length)
            + (group.body_length - group.completed_body_length);
        let (cruise, exit, group_length) =
            (group.cruise_velocity, group.exit_velocity, group.length);

        let mut lookahead = bf_ix;
        while queue.block(lookahead).length + LOCK_LENGTH_SLACK < lock_length_left {
            lock_length_left -= queue.block(lookahead).length;
            lookahead = queue.block(lookahead).nx;
        }

        let after_group = queue.block(bf_ix).nx_group;
        queue.block_mut(after_group).pv_group = lookahead;
        shared.group_slot_mut(group_sel).first_block = lookahead;
        queue.block_mut(lookahead).nx_group = after_group;

        // Lock the entry: back-planning may only raise it, and forward
        // planning is already done with it.
        let lookahead_pv = queue.block(lookahead).pv;
        queue.block_mut(lookahead_pv).exit_vmax = 0.0;
        queue.block_mut(lookahead_pv).exit_velocity = 0.0;

        let tail_block = queue.block_mut(lookahead);
        tail_block.cruise_vmax = cruise;
        tail_block.exit_vmax = cruise;
        tail_block.exit_velocity = exit;
        tail_block.cruise_velocity = cruise;
        tail_block.group_length = group_length;

        // Rebuild the dispersal cursor. Everything already executed
        // (the completed counters) plus blocks whose plans survived the
        // re-ramp (their lengths sit entirely inside the locked
        // head/body region) is consumed; dispersal resumes after it.
        // At most one such planned block can exist.
        let mut consumed = {
            let group = shared.group_slot(group_sel);
            group.completed_head_length + group.completed_body_length
        };
        let mut ix = bf_ix;
        while queue.block(ix).buffer_state == BufferState::Planned && ix != after_group {
            consumed += queue.block(ix).length;
            ix = queue.block(ix).nx;
        }

        let group = shared.group_slot_mut(group_sel);
        if consumed <= group.head_length + EPSILON {
            group.group_state = GroupState::Head;
            group.length_into_section = consumed.min(group.head_length);
        } else {
            group.group_state = GroupState::Body;
            group.length_into_section =
                (consumed - group.head_length).min(group.body_length);
        }
        group.t_into_section = 0.0;
    }

    // ── Disperse onto this block ──
    if shared.group_slot(group_sel).group_state.dispersing()
        && queue.block(bf_ix).buffer_state != BufferState::Planned
    {
        {
            let group = shared.group_slot(group_sel);
            if group.head_length < -EPSILON
                || group.body_length < -EPSILON
                || group.tail_length < -EPSILON
            {
                return Err(ExecError::NegativeLength("group before dispersal"));
            }
        }

        let status = {
            let (group, block) = shared.group_and_block_mut(group_sel, block_sel);
            ramp::calculate_block(
                queue.block(bf_ix),
                group,
                block,
                entry_velocity,
                entry_acceleration,
                entry_jerk,
            )?
        };

        let block = shared.block_slot(block_sel);
        if queue.block(bf_ix).buffer_state != BufferState::Empty
            && block.exit_velocity > block.cruise_velocity + EPSILON
        {
            return Err(ExecError::PlannerAssertion("exit above cruise after dispersal"));
        }
        if block.head_length < 1e-3 && block.body_length < 1e-3 && block.tail_length < 1e-3 {
            return Err(ExecError::PlannerAssertion("dispersal produced an empty block"));
        }
        let move_time = block.head_time + block.body_time + block.tail_time;

        match block_sel {
            Slot::Run => shared.r_mut().planned = true,
            Slot::Plan => shared.p_mut().planned = true,
        }
        if status == ExecOutcome::Done {
            shared.group_slot_mut(group_sel).group_state = GroupState::Done;
        }

        let bf = queue.block_mut(bf_ix);
        bf.move_time = move_time;
        // The running block replans in place; only not-yet-running
        // blocks move to Planned.
        if bf.buffer_state < BufferState::Running {
            bf.buffer_state = BufferState::Planned;
        }
        trace!(block = bf_ix, ?group_sel, ?block_sel, "block planned");
        return Ok(ExecOutcome::Done);
    }

    Ok(ExecOutcome::Noop)
}

/// Compare a group's planned length and exit velocity against its first
/// block and, if the back-planner moved them, attempt the extension.
fn detect_group_changes(
    queue: &mut PlannerQueue,
    shared: &mut SharedRuntime,
    exec: &ExecRuntime,
    group_sel: Slot,
    group_extended: &mut bool,
    velocity_changed: &mut bool,
) -> Result<(), ExecError> {
    let first = shared.group_slot(group_sel).first_block;

    if !near_ge(
        shared.group_slot(group_sel).length,
        queue.block(first).group_length,
    ) {
        *group_extended = true;
    }

    // The back-planner may be interrupted by the executor mid-update,
    // leaving exit_velocity above the ceilings the executor set.
    // Correct that before comparing.
    let first_block = queue.block_mut(first);
    if first_block.exit_velocity > first_block.exit_vmax {
        first_block.exit_velocity = first_block.exit_vmax;
    }

    if !near_ge(
        shared.group_slot(group_sel).exit_velocity,
        queue.block(first).exit_velocity,
    ) {
        *velocity_changed = true;
    }

    attempt_extension(queue, shared, exec, group_sel, group_extended, velocity_changed)
}

/// Try to apply a group extension or exit-velocity upgrade.
///
/// On failure the flags are cleared (or an error raised for the cases
/// the pipeline cannot recover from: extending a group whose tail is
/// already running, or shrinking a body into executed territory).
fn attempt_extension(
    queue: &mut PlannerQueue,
    shared: &mut SharedRuntime,
    exec: &ExecRuntime,
    group_sel: Slot,
    group_extended: &mut bool,
    velocity_changed: &mut bool,
) -> Result<(), ExecError> {
    if !*group_extended && !*velocity_changed {
        return Ok(());
    }

    let first = shared.group_slot(group_sel).first_block;
    let running_group = group_sel == Slot::Run;

    if running_group && exec.section == Section::Tail {
        if *group_extended {
            // The tail is already being executed; there is no length
            // left to redistribute. The move would need to be split.
            return Err(ExecError::ExtensionIntoTail);
        }
        // Play the tail out as planned.
        *velocity_changed = false;
        return Ok(());
    }

    let group = shared.group_slot(group_sel);
    if near_ne(queue.block(first).exit_velocity, group.cruise_velocity) {
        // The group will keep (or grow) a tail. Watch for the
        // inversion case: a smaller velocity change can demand a
        // *longer* deceleration. Quintics are weird.
        let tail_length =
            ramp::target_length(queue.block(first).exit_velocity, group.cruise_velocity, queue.block(first));

        if *group_extended
            && (group.length - group.tail_length)
                <= (queue.block(first).group_length - tail_length)
            && running_group
            && exec.section == Section::Body
        {
            // The new tail would eat into body length the executor has
            // already handed out.
            return Err(ExecError::ExtensionIntoExecutedBody);
        }

        if *group_extended || group_sel == Slot::Plan || tail_length < group.tail_length {
            let new_length = queue.block(first).group_length;
            let new_exit = queue.block(first).exit_velocity;
            let group = shared.group_slot_mut(group_sel);
            if *group_extended {
                group.length = new_length;
            }
            group.exit_velocity = new_exit;
            group.tail_length = tail_length;
            group.body_length = group.length - (group.tail_length + group.head_length);
            group.body_time = group.body_length / group.cruise_velocity;
            group.tail_time =
                (group.tail_length * 2.0) / (group.exit_velocity + group.cruise_velocity);
        } else {
            // Inversion zone: accepting the upgrade would lengthen the
            // tail and shorten the body. Revert the exit velocity so we
            // stop coming back in here.
            let old_exit = group.exit_velocity;
            queue.block_mut(first).exit_velocity = old_exit;
            *velocity_changed = false;
            debug!(block = first, "exit velocity upgrade reverted (inversion zone)");
        }
    } else {
        // Exit matches cruise: the group cruises to its end.
        let new_length = queue.block(first).group_length;
        let group = shared.group_slot_mut(group_sel);
        if *group_extended {
            group.length = new_length;
        }
        group.exit_velocity = group.cruise_velocity;
        group.body_length = group.length - group.head_length;
        group.body_time = group.body_length / group.cruise_velocity;
        group.tail_length = 0.0;
        group.tail_time = 0.0;
    }

    if *group_extended || *velocity_changed {
        {
            let group = shared.group_slot_mut(group_sel);
            group.group_state = GroupState::Ramped;
            group.length_into_section = 0.0;
            group.t_into_section = 0.0;

            if group.head_length < -EPSILON
                || group.body_length < -EPSILON
                || group.tail_length < -EPSILON
            {
                return Err(ExecError::NegativeLength("group extension"));
            }
            group.body_length = group.body_length.max(0.0);
        }

        // Running blocks replan implicitly; a Planned first block must
        // drop back to Prepped, and so must the block after it.
        if queue.block(first).buffer_state == BufferState::Planned {
            queue.block_mut(first).buffer_state = BufferState::Prepped;
        }
        let first_nx = queue.block(first).nx;
        if queue.block(first_nx).buffer_state == BufferState::Planned {
            queue.block_mut(first_nx).buffer_state = BufferState::Prepped;
            if running_group {
                // That block was the planning group's work; force the
                // planning group to start over.
                shared.p_group_mut().group_state = GroupState::Off;
            }
        }
        debug!(?group_sel, extended = *group_extended, "group re-ramped");
    }

    Ok(())
}
