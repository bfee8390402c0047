//! Quintic Bézier velocity curves.
//!
//! Every head and tail section runs a fifth-degree polynomial velocity
//! profile ("linear pop"): velocity is 1st, acceleration 2nd, jerk 3rd,
//! snap 4th, crackle 5th and pop the 6th derivative of position. The
//! curve is pinned by velocity, acceleration and jerk at both ends:
//!
//! ```text
//!   P_0 = v_0
//!   P_1 = v_0 + (T/5)  a_0
//!   P_2 = v_0 + (2T/5) a_0 + (T²/20) j_0
//!   P_3 = v_1 − (2T/5) a_1 + (T²/20) j_1
//!   P_4 = v_1 − (T/5)  a_1
//!   P_5 = v_1
//! ```
//!
//! Expanded from the Bernstein basis to the power basis
//! `V(τ) = Aτ⁵ + Bτ⁴ + Cτ³ + Dτ² + Eτ + F` over normalised `τ ∈ [0, 1]`:
//!
//! ```text
//!   A =  5( P_1 − P_4 + 2(P_3 − P_2) ) + P_5 − P_0
//!   B =  5( P_0 + P_4 − 4(P_3 + P_1) + 6 P_2 )
//!   C = 10( P_3 − P_0 + 3(P_1 − P_2) )
//!   D = 10( P_0 + P_2 − 2 P_1 )
//!   E =  5( P_1 − P_0 )
//!   F =     P_0
//! ```
//!
//! A degree-5 polynomial restricted to a sub-interval is the unique
//! quintic through the boundary velocity/acceleration/jerk at the cut
//! points. Block dispersal leans on this: cutting a group's section
//! curve at a block boundary and carrying the boundary conditions into
//! the next block reproduces the original curve exactly.

use gantry_common::consts::EPSILON;

/// One section's velocity curve in power-basis form.
#[derive(Debug, Clone, Copy)]
pub struct QuinticVelocity {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
    /// Section duration [s].
    t_total: f64,
}

impl QuinticVelocity {
    /// Build the curve from boundary conditions over `t_total` seconds.
    pub fn from_boundary(
        v_0: f64,
        v_1: f64,
        a_0: f64,
        a_1: f64,
        j_0: f64,
        j_1: f64,
        t_total: f64,
    ) -> Self {
        let fifth_t = t_total * 0.2;
        let two_fifths_t = t_total * 0.4;
        let twentieth_t_2 = t_total * t_total * 0.05;

        let p_0 = v_0;
        let p_1 = v_0 + fifth_t * a_0;
        let p_2 = v_0 + two_fifths_t * a_0 + twentieth_t_2 * j_0;
        let p_3 = v_1 - two_fifths_t * a_1 + twentieth_t_2 * j_1;
        let p_4 = v_1 - fifth_t * a_1;
        let p_5 = v_1;

        Self {
            a: 5.0 * (p_1 - p_4 + 2.0 * (p_3 - p_2)) + p_5 - p_0,
            b: 5.0 * (p_0 + p_4 - 4.0 * (p_3 + p_1) + 6.0 * p_2),
            c: 10.0 * (p_3 - p_0 + 3.0 * (p_1 - p_2)),
            d: 10.0 * (p_0 + p_2 - 2.0 * p_1),
            e: 5.0 * (p_1 - p_0),
            f: p_0,
            t_total,
        }
    }

    /// Power-basis coefficients `(A, B, C, D, E, F)` over normalised τ.
    #[inline]
    pub fn coefficients(&self) -> (f64, f64, f64, f64, f64, f64) {
        (self.a, self.b, self.c, self.d, self.e, self.f)
    }

    /// Section duration [s].
    #[inline]
    pub fn duration(&self) -> f64 {
        self.t_total
    }

    /// Velocity at normalised τ ∈ [0, 1].
    #[inline]
    pub fn velocity_norm(&self, tau: f64) -> f64 {
        ((((self.a * tau + self.b) * tau + self.c) * tau + self.d) * tau + self.e) * tau + self.f
    }

    /// Velocity at `t` seconds into the section.
    #[inline]
    pub fn velocity(&self, t: f64) -> f64 {
        self.velocity_norm(t / self.t_total)
    }

    /// Acceleration [mm/s²] at `t` seconds into the section.
    #[inline]
    pub fn acceleration(&self, t: f64) -> f64 {
        let tau = t / self.t_total;
        let dv_dtau =
            (((5.0 * self.a * tau + 4.0 * self.b) * tau + 3.0 * self.c) * tau + 2.0 * self.d) * tau
                + self.e;
        dv_dtau / self.t_total
    }

    /// Jerk [mm/s³] at `t` seconds into the section.
    #[inline]
    pub fn jerk(&self, t: f64) -> f64 {
        let tau = t / self.t_total;
        let d2v_dtau2 =
            ((20.0 * self.a * tau + 12.0 * self.b) * tau + 6.0 * self.c) * tau + 2.0 * self.d;
        d2v_dtau2 / (self.t_total * self.t_total)
    }

    /// Distance travelled [mm] from section start to `t` seconds in.
    pub fn distance(&self, t: f64) -> f64 {
        let tau = t / self.t_total;
        let integral = (((((self.a / 6.0 * tau + self.b / 5.0) * tau + self.c / 4.0) * tau
            + self.d / 3.0)
            * tau
            + self.e / 2.0)
            * tau
            + self.f)
            * tau;
        integral * self.t_total
    }

    /// Total distance covered by the whole section [mm].
    #[inline]
    pub fn total_distance(&self) -> f64 {
        self.distance(self.t_total)
    }

    /// Invert the distance integral: time `t` at which `distance(t) == s`.
    ///
    /// Newton iteration guarded by a shrinking bisection bracket; the
    /// curve's velocity is non-negative over a valid section, so the
    /// distance integral is monotone and the root is unique.
    pub fn time_at_distance(&self, s: f64) -> f64 {
        let total = self.total_distance();
        if s <= EPSILON {
            return 0.0;
        }
        if s >= total - EPSILON {
            return self.t_total;
        }

        let mut lo = 0.0_f64;
        let mut hi = self.t_total;
        let mut t = self.t_total * (s / total);
        let tol = EPSILON * total.max(1.0);

        for _ in 0..64 {
            let err = self.distance(t) - s;
            if err.abs() < tol {
                return t;
            }
            if err > 0.0 {
                hi = t;
            } else {
                lo = t;
            }
            let v = self.velocity(t);
            let newton = if v > EPSILON { t - err / v } else { f64::NAN };
            t = if newton.is_finite() && newton > lo && newton < hi {
                newton
            } else {
                0.5 * (lo + hi)
            };
        }
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_ramp() -> QuinticVelocity {
        QuinticVelocity::from_boundary(0.0, 100.0, 0.0, 0.0, 0.0, 0.0, 0.1)
    }

    #[test]
    fn endpoints_match_boundary_velocities() {
        let q = simple_ramp();
        assert!((q.velocity_norm(0.0) - 0.0).abs() < 1e-9);
        assert!((q.velocity_norm(1.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn zero_boundary_acceleration_and_jerk() {
        let q = simple_ramp();
        assert!(q.acceleration(0.0).abs() < 1e-6);
        assert!(q.acceleration(0.1).abs() < 1e-6);
        assert!(q.jerk(0.0).abs() < 1e-4);
        assert!(q.jerk(0.1).abs() < 1e-4);
    }

    #[test]
    fn total_distance_is_mean_velocity_times_time() {
        // The curve is symmetric for zero boundary accel/jerk, so the
        // distance equals (v0 + v1)/2 · T.
        let q = simple_ramp();
        assert!((q.total_distance() - 50.0 * 0.1).abs() < 1e-9);
    }

    #[test]
    fn distance_inversion_round_trips() {
        let q = simple_ramp();
        for frac in [0.1, 0.25, 0.5, 0.75, 0.9] {
            let s = q.total_distance() * frac;
            let t = q.time_at_distance(s);
            assert!(
                (q.distance(t) - s).abs() < 1e-8,
                "frac {frac}: distance({t}) = {} != {s}",
                q.distance(t)
            );
        }
    }

    #[test]
    fn restriction_matches_original_curve() {
        // Cut the curve at an arbitrary point and rebuild a quintic from
        // the boundary conditions of the remainder. Both must agree.
        let q = QuinticVelocity::from_boundary(10.0, 200.0, 0.0, 0.0, 0.0, 0.0, 0.2);
        let t_cut = 0.07;
        let rest = QuinticVelocity::from_boundary(
            q.velocity(t_cut),
            200.0,
            q.acceleration(t_cut),
            0.0,
            q.jerk(t_cut),
            0.0,
            0.2 - t_cut,
        );
        for frac in [0.0, 0.3, 0.6, 1.0] {
            let t = frac * (0.2 - t_cut);
            assert!(
                (rest.velocity(t) - q.velocity(t_cut + t)).abs() < 1e-6,
                "restriction diverged at t = {t}"
            );
        }
        assert!((rest.total_distance() - (q.total_distance() - q.distance(t_cut))).abs() < 1e-7);
    }

    #[test]
    fn nonzero_boundary_acceleration_is_honoured() {
        let q = QuinticVelocity::from_boundary(50.0, 120.0, 400.0, 0.0, 0.0, 0.0, 0.05);
        assert!((q.acceleration(0.0) - 400.0).abs() < 1e-5);
        assert!(q.acceleration(0.05).abs() < 1e-5);
        assert!((q.velocity(0.0) - 50.0).abs() < 1e-9);
        assert!((q.velocity(0.05) - 120.0).abs() < 1e-9);
    }
}
