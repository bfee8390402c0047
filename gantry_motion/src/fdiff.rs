//! Forward-difference evaluation of the quintic velocity curve.
//!
//! Re-evaluating a fifth-degree polynomial every segment is too
//! expensive for the execution interrupt. Instead the section runner
//! ticks five difference registers:
//!
//! ```text
//!   v   += F_5
//!   F_5 += F_4
//!   F_4 += F_3
//!   F_3 += F_2
//!   F_2 += F_1
//! ```
//!
//! With step `h = 1/segments`, the registers are seeded so the first
//! emitted velocity is `V(h/2)`: each segment then carries the curve's
//! velocity at its midpoint, which is what makes Σ v·Δt track the
//! section length:
//!
//! ```text
//!   F_5 = (121/16) A h⁵ +  5 B h⁴ + (13/4) C h³ + 2 D h² + E h
//!   F_4 =  (165/2) A h⁵ + 29 B h⁴ +     9  C h³ + 2 D h²
//!   F_3 =      255 A h⁵ + 48 B h⁴ +     6  C h³
//!   F_2 =      300 A h⁵ + 24 B h⁴
//!   F_1 =      120 A h⁵
//! ```

use crate::quintic::QuinticVelocity;

/// The five forward-difference registers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardDiffs {
    pub f1: f64,
    pub f2: f64,
    pub f3: f64,
    pub f4: f64,
    pub f5: f64,
}

impl ForwardDiffs {
    /// Seed the registers for a section running `v_0 → v_1` over
    /// `t_total` seconds in `segments` steps, honouring boundary
    /// accelerations and jerks.
    ///
    /// Returns the registers and the first segment velocity `V(h/2)`.
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        v_0: f64,
        v_1: f64,
        a_0: f64,
        a_1: f64,
        j_0: f64,
        j_1: f64,
        t_total: f64,
        segments: f64,
    ) -> (Self, f64) {
        let q = QuinticVelocity::from_boundary(v_0, v_1, a_0, a_1, j_0, j_1, t_total);
        let (a, b, c, d, e, _f) = q.coefficients();

        let h = 1.0 / segments;
        let h_2 = h * h;
        let h_3 = h_2 * h;
        let h_4 = h_3 * h;
        let h_5 = h_4 * h;

        let ah_5 = a * h_5;
        let bh_4 = b * h_4;
        let ch_3 = c * h_3;
        let dh_2 = d * h_2;
        let eh = e * h;

        const C121_16: f64 = 7.5625; // 121/16
        const C13_4: f64 = 3.25; // 13/4
        const C165_2: f64 = 82.5; // 165/2

        let diffs = Self {
            f5: C121_16 * ah_5 + 5.0 * bh_4 + C13_4 * ch_3 + 2.0 * dh_2 + eh,
            f4: C165_2 * ah_5 + 29.0 * bh_4 + 9.0 * ch_3 + 2.0 * dh_2,
            f3: 255.0 * ah_5 + 48.0 * bh_4 + 6.0 * ch_3,
            f2: 300.0 * ah_5 + 24.0 * bh_4,
            f1: 120.0 * ah_5,
        };

        (diffs, q.velocity_norm(0.5 * h))
    }

    /// Advance the registers after a second-half segment completes.
    #[inline]
    pub fn advance(&mut self) {
        self.f5 += self.f4;
        self.f4 += self.f3;
        self.f3 += self.f2;
        self.f2 += self.f1;
    }

    /// Clear all registers. Used on the degenerate single-segment path
    /// so the mean velocity is never adjusted.
    #[inline]
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Iterating the registers must reproduce the curve's midpoint
    /// velocities exactly (up to float noise).
    #[test]
    fn iteration_matches_direct_evaluation() {
        let (v_0, v_1, t) = (10.0, 250.0, 0.08);
        let segments = 16.0;
        let q = QuinticVelocity::from_boundary(v_0, v_1, 0.0, 0.0, 0.0, 0.0, t);
        let (mut fd, mut v) = ForwardDiffs::init(v_0, v_1, 0.0, 0.0, 0.0, 0.0, t, segments);

        let h = 1.0 / segments;
        for step in 0..segments as usize {
            let tau = (step as f64 + 0.5) * h;
            let direct = q.velocity_norm(tau);
            assert!(
                (v - direct).abs() < 1e-9 * v_1,
                "segment {step}: forward diff {v} != direct {direct}"
            );
            v += fd.f5;
            fd.advance();
        }
    }

    /// The last emitted velocity is `V(1 − h/2)`, which converges on
    /// `v_1` because the curve is flat at its end.
    #[test]
    fn final_velocity_approaches_target() {
        let (v_0, v_1, t) = (0.0, 100.0, 0.1);
        let segments = 20.0;
        let (mut fd, mut v) = ForwardDiffs::init(v_0, v_1, 0.0, 0.0, 0.0, 0.0, t, segments);
        for _ in 1..segments as usize {
            v += fd.f5;
            fd.advance();
        }
        assert!(
            (v - v_1).abs() < 0.1,
            "final forward-diff velocity {v} too far from {v_1}"
        );
    }

    /// With zero boundary accelerations and jerks the control points
    /// collapse and the power-basis coefficients reduce to the cubic
    /// form `A = −6v_0 + 6v_1`, `B = 15v_0 − 15v_1`, `C = −10v_0 + 10v_1`,
    /// `D = E = 0`. The seeded registers must match that form.
    #[test]
    fn simplified_control_points_match_cubic_form() {
        let (v_0, v_1, t) = (5.0, 80.0, 0.05);
        let segments = 8.0;
        let (fd, v_first) = ForwardDiffs::init(v_0, v_1, 0.0, 0.0, 0.0, 0.0, t, segments);

        let a = -6.0 * v_0 + 6.0 * v_1;
        let b = 15.0 * v_0 - 15.0 * v_1;
        let c = -10.0 * v_0 + 10.0 * v_1;
        let h: f64 = 1.0 / segments;
        let ah_5 = a * h.powi(5);
        let bh_4 = b * h.powi(4);
        let ch_3 = c * h.powi(3);

        assert!((fd.f5 - (7.5625 * ah_5 + 5.0 * bh_4 + 3.25 * ch_3)).abs() < 1e-9);
        assert!((fd.f4 - (82.5 * ah_5 + 29.0 * bh_4 + 9.0 * ch_3)).abs() < 1e-9);
        assert!((fd.f3 - (255.0 * ah_5 + 48.0 * bh_4 + 6.0 * ch_3)).abs() < 1e-9);
        assert!((fd.f2 - (300.0 * ah_5 + 24.0 * bh_4)).abs() < 1e-9);
        assert!((fd.f1 - 120.0 * ah_5).abs() < 1e-9);

        let half_h = 0.5 * h;
        let expect = a * half_h.powi(5) + b * half_h.powi(4) + c * half_h.powi(3) + v_0;
        assert!((v_first - expect).abs() < 1e-9);
    }

    /// The midpoint rule makes the Riemann sum of segment velocities an
    /// excellent estimate of the section distance.
    #[test]
    fn velocity_sum_tracks_distance() {
        let (v_0, v_1, t) = (20.0, 180.0, 0.12);
        let segments = 24.0;
        let q = QuinticVelocity::from_boundary(v_0, v_1, 0.0, 0.0, 0.0, 0.0, t);
        let (mut fd, mut v) = ForwardDiffs::init(v_0, v_1, 0.0, 0.0, 0.0, 0.0, t, segments);
        let dt = t / segments;

        let mut travelled = 0.0;
        for _ in 0..segments as usize {
            travelled += v * dt;
            v += fd.f5;
            fd.advance();
        }
        assert!(
            (travelled - q.total_distance()).abs() < 1e-6,
            "sum {travelled} != integral {}",
            q.total_distance()
        );
    }
}
