//! Ramp mathematics: jerk-limited velocity ramps and their dispersal
//! onto blocks.
//!
//! A head or tail is a quintic S-curve with zero boundary acceleration
//! and jerk. For those curves two closed forms hold exactly:
//!
//! ```text
//!   length(v_0 → v_1) = (v_0 + v_1) · √(|v_1 − v_0| / j)
//!   time(v_0 → v_1)   = 2 · √(|v_1 − v_0| / j)
//! ```
//!
//! Inverting the length relation for the reachable velocity leads to the
//! cubic `j·s³ + 2·v_0·s − L = 0` in `s = √(Δv/j)`, solved in closed
//! form (Cardano; the cubic has one real root for `v_0, L ≥ 0`).
//!
//! Inverting it for a *deceleration* target is the quintic "inversion
//! zone": braking length is not monotone in the exit velocity (maximum
//! at `v_exit = v_entry/3`), which is why extension planning guards
//! against accepting a longer tail for a smaller velocity change.

use gantry_common::consts::EPSILON;
use gantry_common::float::{near_ge, near_zero};
use gantry_common::{ExecError, ExecOutcome, GroupState};
use tracing::trace;

use crate::block::Block;
use crate::quintic::QuinticVelocity;
use crate::runtime::{BlockRuntime, GroupRuntime};

/// Distance needed to change velocity `v_0 → v_1` under the block's
/// jerk [mm].
#[inline]
pub fn target_length(v_0: f64, v_1: f64, bf: &Block) -> f64 {
    (v_0 + v_1) * ((v_1 - v_0).abs() * bf.recip_jerk).sqrt()
}

/// Duration of the `v_0 → v_1` ramp [s].
#[inline]
pub fn ramp_time(v_0: f64, v_1: f64, bf: &Block) -> f64 {
    4.0 * (v_1 - v_0).abs().sqrt() * bf.q_recip_2_sqrt_j
}

/// Velocity reachable from `v_0` over `length` under the block's jerk
/// [mm/s]. Closed-form root of `j·s³ + 2·v_0·s − L = 0`, `v = v_0 + j·s²`.
pub fn target_velocity(v_0: f64, length: f64, bf: &Block) -> f64 {
    if length <= EPSILON {
        return v_0;
    }
    // Depressed cubic s³ + p·s + q = 0 with p = 2·v_0/j ≥ 0, q = −L/j.
    let p = 2.0 * v_0 * bf.recip_jerk;
    let half_q = 0.5 * length * bf.recip_jerk;
    // Discriminant q²/4 + p³/27; positive for p ≥ 0, so one real root.
    let disc = 0.25 * length * length / bf.jerk_sq + p * p * p / 27.0;
    let root = disc.sqrt();
    let s = (half_q + root).cbrt() + (half_q - root).cbrt();
    v_0 + bf.jerk * s * s
}

/// Exit velocity after braking from `v_entry` over `length` [mm/s].
///
/// Solves `length = (v_x + v_entry)·√((v_entry − v_x)/j)` for the
/// physical (small-Δv) branch. Past the inversion point
/// (`v_x = v_entry/3`) no longer braking distance exists on this
/// branch; the result clamps there.
pub fn braking_exit_velocity(v_entry: f64, length: f64, bf: &Block) -> f64 {
    if length <= EPSILON {
        return v_entry;
    }
    // j·s³ − 2·v_entry·s + L = 0, smallest positive root.
    // Branch maximum at s* = √(2·v_entry/(3j)).
    let s_max = (2.0 * v_entry * bf.recip_jerk / 3.0).sqrt();
    let l_max = 2.0 * v_entry * s_max - bf.jerk * s_max * s_max * s_max;
    if length >= l_max {
        return v_entry / 3.0;
    }
    let mut s = length / (2.0 * v_entry).max(EPSILON);
    for _ in 0..32 {
        let f = bf.jerk * s * s * s - 2.0 * v_entry * s + length;
        let df = 3.0 * bf.jerk * s * s - 2.0 * v_entry;
        if df.abs() < EPSILON {
            break;
        }
        let next = (s - f / df).clamp(0.0, s_max);
        if (next - s).abs() < 1e-15 {
            s = next;
            break;
        }
        s = next;
    }
    (v_entry - bf.jerk * s * s).max(0.0)
}

// ─── Group ramping ──────────────────────────────────────────────────

/// Compute head/body/tail lengths and times for a group.
///
/// `bf` is the first block of the group; the ramp covers the block's
/// full `group_length`. Entry velocity comes from the runtime snapshot;
/// the requested exit velocity is clamped to its ceiling. Writes the
/// group's lengths, times and boundary velocities; the caller manages
/// group state and dispersal cursors.
pub fn calculate_ramps(
    bf: &Block,
    group: &mut GroupRuntime,
    entry_velocity: f64,
) -> Result<(), ExecError> {
    let length = bf.group_length;
    if length < EPSILON {
        return Err(ExecError::PlannerAssertion("zero length group"));
    }

    let entry = entry_velocity;
    let mut exit = bf.exit_velocity.min(bf.exit_vmax);
    let mut cruise = bf.cruise_vmax.max(entry).max(exit);

    let mut head = target_length(entry, cruise, bf);
    let mut tail = target_length(exit, cruise, bf);
    let body;

    if head + tail <= length {
        // Full trapezoid: the requested cruise is reachable.
        body = length - head - tail;
    } else {
        body = 0.0;
        if exit > entry && target_length(entry, exit, bf) >= length - EPSILON {
            // The exit cannot be reached within the group; accelerate
            // the whole way and let the exit land where it lands.
            cruise = target_velocity(entry, length, bf).min(exit);
            exit = cruise;
            head = length;
            tail = 0.0;
        } else if exit < entry && target_length(exit, entry, bf) >= length - EPSILON {
            // The exit cannot be braked to within the group.
            cruise = entry;
            exit = braking_exit_velocity(entry, length, bf);
            head = 0.0;
            tail = length;
        } else {
            // Degraded trapezoid: find the peak velocity whose head and
            // tail exactly fill the group. The combined ramp length is
            // monotone in the peak, so bisection converges.
            let mut lo = entry.max(exit);
            let mut hi = cruise;
            for _ in 0..48 {
                let mid = 0.5 * (lo + hi);
                let need = target_length(entry, mid, bf) + target_length(exit, mid, bf);
                if need > length {
                    hi = mid;
                } else {
                    lo = mid;
                }
            }
            cruise = 0.5 * (lo + hi);
            head = target_length(entry, cruise, bf);
            tail = (length - head).max(0.0);
        }
    }

    let body = if body < 0.0 && body > -EPSILON { 0.0 } else { body };
    if head < -EPSILON || body < -EPSILON || tail < -EPSILON {
        return Err(ExecError::NegativeLength("ramp calculation"));
    }

    group.entry_velocity = entry;
    group.cruise_velocity = cruise;
    group.exit_velocity = exit;
    group.cruise_acceleration = 0.0;
    group.cruise_jerk = 0.0;
    group.exit_acceleration = 0.0;
    group.exit_jerk = 0.0;
    group.head_length = head.max(0.0);
    group.body_length = body.max(0.0);
    group.tail_length = tail.max(0.0);
    group.head_time = if near_zero(head) { 0.0 } else { ramp_time(entry, cruise, bf) };
    group.body_time = if near_zero(body) { 0.0 } else { body / cruise };
    group.tail_time = if near_zero(tail) { 0.0 } else { ramp_time(cruise, exit, bf) };

    trace!(
        head = group.head_length,
        body = group.body_length,
        tail = group.tail_length,
        cruise,
        exit,
        "group ramped"
    );
    Ok(())
}

// ─── Dispersal ──────────────────────────────────────────────────────

/// Map the group's remaining head/body/tail onto one block's runtime.
///
/// Cuts the group's section curves at the block boundary and carries
/// the boundary velocity/acceleration/jerk into the block runtime, so a
/// ramp split across blocks reproduces the single-block curve exactly.
/// Partial heads and tails leave a non-zero `cruise_jerk`/`exit_jerk`
/// on the block, which is the marker the executor and the
/// short-section merge logic key on.
///
/// Returns `Done` when the group is fully dispersed, `Again` when more
/// blocks remain.
pub fn calculate_block(
    bf: &Block,
    group: &mut GroupRuntime,
    block: &mut BlockRuntime,
    entry_velocity: f64,
    entry_acceleration: f64,
    entry_jerk: f64,
) -> Result<ExecOutcome, ExecError> {
    debug_assert!(group.group_state.dispersing());
    trace!(
        entry_velocity,
        entry_acceleration,
        entry_jerk,
        block_length = bf.length,
        "dispersing block"
    );

    let planned = block.planned;
    *block = BlockRuntime::default();
    block.planned = planned;
    block.cruise_velocity = group.cruise_velocity;
    block.exit_velocity = group.cruise_velocity;

    let mut remaining = bf.length;
    // Boundary tracker: velocity/acceleration/jerk at the end of the
    // last section fragment assigned to this block.
    let mut boundary = (entry_velocity, 0.0_f64, 0.0_f64);

    // ── Head ──
    if group.group_state == GroupState::Head {
        let total = group.head_length;
        let consumed = group.length_into_section;
        let left = total - consumed;
        if left > EPSILON && remaining > EPSILON {
            let curve = QuinticVelocity::from_boundary(
                group.entry_velocity,
                group.cruise_velocity,
                0.0,
                group.cruise_acceleration,
                0.0,
                group.cruise_jerk,
                group.head_time,
            );
            let t_0 = if consumed <= EPSILON {
                0.0
            } else {
                curve.time_at_distance(consumed)
            };
            let take = remaining.min(left);
            block.head_length = take;
            if near_ge(consumed + take, total) {
                block.head_time = group.head_time - t_0;
                block.cruise_velocity = group.cruise_velocity;
                block.cruise_acceleration = 0.0;
                block.cruise_jerk = 0.0;
                group.group_state = GroupState::Body;
                group.length_into_section = 0.0;
                group.t_into_section = 0.0;
            } else {
                let t_1 = curve.time_at_distance(consumed + take);
                block.head_time = t_1 - t_0;
                block.cruise_velocity = curve.velocity(t_1);
                block.cruise_acceleration = curve.acceleration(t_1);
                block.cruise_jerk = curve.jerk(t_1);
                group.length_into_section = consumed + take;
                group.t_into_section = t_1;
            }
            remaining -= take;
            boundary = (
                block.cruise_velocity,
                block.cruise_acceleration,
                block.cruise_jerk,
            );
        } else if left <= EPSILON {
            group.group_state = GroupState::Body;
            group.length_into_section = 0.0;
            group.t_into_section = 0.0;
        }
    }

    // ── Body ──
    if group.group_state == GroupState::Body {
        let total = group.body_length;
        let consumed = group.length_into_section;
        let left = total - consumed;
        if left > EPSILON && remaining > EPSILON {
            let take = remaining.min(left);
            block.body_length = take;
            block.body_time = take / group.cruise_velocity;
            block.cruise_velocity = group.cruise_velocity;
            if near_ge(consumed + take, total) {
                group.group_state = GroupState::Tail;
                group.length_into_section = 0.0;
                group.t_into_section = 0.0;
            } else {
                group.length_into_section = consumed + take;
            }
            remaining -= take;
            boundary = (group.cruise_velocity, 0.0, 0.0);
        } else if left <= EPSILON {
            group.group_state = GroupState::Tail;
            group.length_into_section = 0.0;
            group.t_into_section = 0.0;
        }
    }

    // ── Tail ──
    let mut tail_complete = group.group_state == GroupState::Tail && group.tail_length <= EPSILON;
    if group.group_state == GroupState::Tail && group.tail_length > EPSILON && remaining > EPSILON {
        let total = group.tail_length;
        let consumed = group.length_into_section;
        let left = total - consumed;
        let curve = QuinticVelocity::from_boundary(
            group.cruise_velocity,
            group.exit_velocity,
            0.0,
            group.exit_acceleration,
            0.0,
            group.exit_jerk,
            group.tail_time,
        );
        let t_0 = if consumed <= EPSILON {
            0.0
        } else {
            curve.time_at_distance(consumed)
        };
        if block.head_length <= EPSILON && block.body_length <= EPSILON {
            // Pure tail remnant: the block's "cruise" is wherever the
            // curve stands at its start.
            if consumed <= EPSILON {
                block.cruise_velocity = group.cruise_velocity;
                block.cruise_acceleration = 0.0;
                block.cruise_jerk = 0.0;
            } else {
                block.cruise_velocity = curve.velocity(t_0);
                block.cruise_acceleration = curve.acceleration(t_0);
                block.cruise_jerk = curve.jerk(t_0);
            }
        }
        let take = remaining.min(left);
        block.tail_length = take;
        if near_ge(consumed + take, total) {
            block.tail_time = group.tail_time - t_0;
            boundary = (group.exit_velocity, 0.0, 0.0);
            group.length_into_section = total;
            group.t_into_section = group.tail_time;
            tail_complete = true;
        } else {
            let t_1 = curve.time_at_distance(consumed + take);
            block.tail_time = t_1 - t_0;
            boundary = (curve.velocity(t_1), curve.acceleration(t_1), curve.jerk(t_1));
            group.length_into_section = consumed + take;
            group.t_into_section = t_1;
        }
        remaining -= take;
    }

    if remaining > 1e-3 {
        return Err(ExecError::PlannerAssertion("block extends past its group"));
    }

    block.exit_velocity = boundary.0;
    block.exit_acceleration = boundary.1;
    block.exit_jerk = boundary.2;

    if block.exit_velocity > block.cruise_velocity + EPSILON
        || entry_velocity > block.cruise_velocity + EPSILON
    {
        return Err(ExecError::PlannerAssertion("velocity ordering violated"));
    }

    Ok(if tail_complete {
        ExecOutcome::Done
    } else {
        ExecOutcome::Again
    })
}
