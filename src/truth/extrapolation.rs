//! Trajectory swimming through a sampled magnetic field
//!
//! A charged particle is stepped toward a target depth (detector `z`). At
//! every step the field is sampled at the current position and the particle
//! follows the exact trajectory for that local field over one step: a helix
//! around the field axis, or a straight line when the particle is neutral or
//! the field vanishes.
//!
//! ```text
//!   depth ─────────────────────────────────────────────►
//!   start ●──5──●──5──●──5──●──5──●─.5─●─.5─●─.5─● target
//!                               │
//!                    80% of the way covered: step / 10
//! ```
//!
//! The last step is shortened so the particle lands exactly on the target
//! depth. Swimming stops without a result when the particle turns away from
//! the target.
//!
//! All stepping happens in the tracking frame (see [`crate::geometry`]),
//! where depth is `x` and the field axis is `z`.

use crate::field::FieldMap;
use crate::geometry::Vector3;
use serde::{Deserialize, Serialize};

/// Default step length (mm)
pub const DEFAULT_STEP_SIZE: f64 = 5.0;

/// Fraction of the initial distance after which the step is refined
pub const REFINEMENT_TRIGGER: f64 = 0.80;

/// Step length divisor applied once when the trigger is reached
pub const REFINEMENT_FACTOR: f64 = 10.0;

/// Curvature constant: radius [mm] = pT [GeV/c] / (q · B [T] · FIELD_CONVERSION)
pub const FIELD_CONVERSION: f64 = 2.99792458e-4;

const LANDING_ITERATIONS: usize = 200;
const LANDING_TOLERANCE: f64 = 1e-13;

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtrapolationConfig {
    /// Initial step length (mm)
    pub step_size: f64,
    /// Upper bound on steps for a single swim
    pub max_steps: usize,
}

impl Default for ExtrapolationConfig {
    fn default() -> Self {
        Self {
            step_size: DEFAULT_STEP_SIZE,
            max_steps: 100_000,
        }
    }
}

impl ExtrapolationConfig {
    /// One-millimetre steps, for generating reference trajectories
    pub fn fine() -> Self {
        Self {
            step_size: 1.0,
            ..Default::default()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOCAL TRAJECTORY
// ═══════════════════════════════════════════════════════════════════════════════

/// Exact trajectory in a locally uniform field, parametrised by path length.
///
/// Coordinates are tracking-frame; the field is along `z`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalTrajectory {
    Helix {
        origin: Vector3,
        /// Signed radius of curvature in the x-y plane
        radius: f64,
        /// Azimuth of the momentum at the origin
        phi: f64,
        /// Dip angle of the momentum at the origin
        lambda: f64,
        center_x: f64,
        center_y: f64,
    },
    Line {
        origin: Vector3,
        direction: Vector3,
    },
}

impl LocalTrajectory {
    /// Trajectory through `origin` with `momentum`, `charge` and field `b`
    /// (Tesla, along tracking `z`). `None` for a zero momentum.
    pub fn new(momentum: Vector3, origin: Vector3, charge: f64, b: f64) -> Option<Self> {
        let direction = momentum.unit()?;
        let phi = momentum.y.atan2(momentum.x);
        let lambda = momentum.z.atan2(momentum.rxy());
        let curvature = charge * b * FIELD_CONVERSION;

        if curvature == 0.0 || momentum.rxy() == 0.0 {
            return Some(LocalTrajectory::Line { origin, direction });
        }

        let radius = momentum.rxy() / curvature;
        Some(LocalTrajectory::Helix {
            origin,
            radius,
            phi,
            lambda,
            center_x: origin.x + radius * phi.sin(),
            center_y: origin.y - radius * phi.cos(),
        })
    }

    pub fn is_helix(&self) -> bool {
        matches!(self, LocalTrajectory::Helix { .. })
    }

    /// Position after travelling `s` along the trajectory
    pub fn point_at(&self, s: f64) -> Vector3 {
        match *self {
            LocalTrajectory::Helix {
                origin,
                radius,
                phi,
                lambda,
                center_x,
                center_y,
            } => {
                let angle = phi - s * lambda.cos() / radius;
                Vector3::new(
                    center_x - radius * angle.sin(),
                    center_y + radius * angle.cos(),
                    origin.z + s * lambda.sin(),
                )
            }
            LocalTrajectory::Line { origin, direction } => origin + direction * s,
        }
    }

    /// Unit tangent after travelling `s`
    pub fn tangent_at(&self, s: f64) -> Vector3 {
        match *self {
            LocalTrajectory::Helix {
                radius,
                phi,
                lambda,
                ..
            } => {
                let angle = phi - s * lambda.cos() / radius;
                let (sin_l, cos_l) = lambda.sin_cos();
                Vector3::new(angle.cos() * cos_l, angle.sin() * cos_l, sin_l)
            }
            LocalTrajectory::Line { direction, .. } => direction,
        }
    }

    /// Path length in `[0, max]` at which `x` first reaches `target_x`.
    ///
    /// The caller guarantees `x(0)` is short of the target and `x(max)` has
    /// reached or passed it.
    pub fn path_to_depth(&self, target_x: f64, max: f64) -> f64 {
        if let LocalTrajectory::Line { origin, direction } = *self {
            if direction.x != 0.0 {
                return ((target_x - origin.x) / direction.x).clamp(0.0, max);
            }
        }

        let start = self.point_at(0.0).x;
        let sense = if target_x >= start { 1.0 } else { -1.0 };
        let (mut lo, mut hi) = (0.0, max);
        for _ in 0..LANDING_ITERATIONS {
            if hi - lo <= LANDING_TOLERANCE {
                break;
            }
            let mid = 0.5 * (lo + hi);
            if sense * (self.point_at(mid).x - target_x) >= 0.0 {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        hi
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXTRAPOLATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Position and momentum reached by a swim (detector frame)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwimResult {
    pub position: Vector3,
    pub momentum: Vector3,
    /// Total path length travelled (mm)
    pub path_length: f64,
    pub steps: usize,
}

/// Swims particles between depths through a [`FieldMap`]. Holds no state
/// between calls.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryExtrapolator {
    config: ExtrapolationConfig,
}

impl TrajectoryExtrapolator {
    pub fn new(config: ExtrapolationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtrapolationConfig {
        &self.config
    }

    /// Swim from `position` with `momentum` until the depth `target_depth` is
    /// reached, moving in the direction of `momentum`.
    ///
    /// The signed field is used as sampled: the bend follows `charge · B` at
    /// every step, so maps of either polarity need no sign correction.
    ///
    /// Returns `None` for non-finite or zero inputs, when the momentum points
    /// away from the target (at the start or after the particle curls), or
    /// when the step budget runs out.
    pub fn swim<F: FieldMap + ?Sized>(
        &self,
        position: Vector3,
        momentum: Vector3,
        charge: f64,
        target_depth: f64,
        field: &F,
    ) -> Option<SwimResult> {
        if !position.is_finite() || !momentum.is_finite() || !target_depth.is_finite() {
            return None;
        }
        let p = momentum.magnitude();
        if p == 0.0 {
            return None;
        }

        let mut pos = position.to_tracking();
        let mut mom = momentum.to_tracking();
        let direction = if target_depth >= pos.x { 1.0 } else { -1.0 };
        let initial = (target_depth - pos.x).abs();

        let mut step = self.config.step_size;
        let mut refined = false;
        let mut steps = 0usize;
        let mut path_length = 0.0;

        while direction * (target_depth - pos.x) > 0.0 {
            if steps >= self.config.max_steps {
                log::debug!(
                    "Swim to depth {:.3} gave up after {} steps at {}",
                    target_depth,
                    steps,
                    pos.to_detector()
                );
                return None;
            }
            if mom.x * direction <= 0.0 {
                log::debug!(
                    "Swim to depth {:.3} moving away from target at {}",
                    target_depth,
                    pos.to_detector()
                );
                return None;
            }

            let b = field.field(pos.to_detector()).y;
            let trajectory = LocalTrajectory::new(mom, pos, charge, b)?;

            let mut s = step;
            let reaches = direction * (trajectory.point_at(s).x - target_depth) >= 0.0;
            if reaches {
                s = trajectory.path_to_depth(target_depth, s);
            }

            pos = trajectory.point_at(s);
            mom = trajectory.tangent_at(s) * p;
            if reaches {
                pos.x = target_depth;
            }
            path_length += s;
            steps += 1;

            let covered = initial - (target_depth - pos.x).abs();
            if !refined && covered >= REFINEMENT_TRIGGER * initial {
                step /= REFINEMENT_FACTOR;
                refined = true;
            }
        }

        Some(SwimResult {
            position: pos.to_detector(),
            momentum: mom.to_detector(),
            path_length,
            steps,
        })
    }

    /// Swim a particle backward along its flight path, from a later point to
    /// an earlier depth.
    ///
    /// The returned momentum points along the original direction of flight.
    pub fn extrapolate_back<F: FieldMap + ?Sized>(
        &self,
        end_position: Vector3,
        end_momentum: Vector3,
        charge: f64,
        target_depth: f64,
        field: &F,
    ) -> Option<SwimResult> {
        // Retracing a path in reverse is the same as flying it with opposite charge
        let reversed = self.swim(end_position, -end_momentum, -charge, target_depth, field)?;
        Some(SwimResult {
            momentum: -reversed.momentum,
            ..reversed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::UniformField;
    use approx::assert_abs_diff_eq;

    fn extrapolator() -> TrajectoryExtrapolator {
        TrajectoryExtrapolator::default()
    }

    /// Analytic x at depth `z` for a particle starting at the origin along +z
    /// with momentum `p` in a field `b` along +y.
    fn arc_x(p: f64, q: f64, b: f64, z: f64) -> f64 {
        let r = p / (q * b * FIELD_CONVERSION);
        -r + r.signum() * (r * r - z * z).sqrt()
    }

    #[test]
    fn test_straight_line_in_zero_field() {
        let start = Vector3::new(1.0, -2.0, 100.0);
        let momentum = Vector3::new(0.05, 0.02, 1.2);
        let result = extrapolator()
            .swim(start, momentum, -1.0, 700.0, &UniformField::zero())
            .unwrap();

        let t = (700.0 - start.z) / momentum.z;
        assert_abs_diff_eq!(result.position.z, 700.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.position.x, start.x + momentum.x * t, epsilon = 1e-9);
        assert_abs_diff_eq!(result.position.y, start.y + momentum.y * t, epsilon = 1e-9);
        assert_abs_diff_eq!(result.momentum.x, momentum.x, epsilon = 1e-12);
        assert_abs_diff_eq!(result.momentum.z, momentum.z, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_field_arc() {
        let field = UniformField::dipole(1.0);
        let result = extrapolator()
            .swim(Vector3::ZERO, Vector3::new(0.0, 0.0, 1.0), 1.0, 500.0, &field)
            .unwrap();

        assert_abs_diff_eq!(result.position.z, 500.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.position.x, arc_x(1.0, 1.0, 1.0, 500.0), epsilon = 1e-6);
        assert_abs_diff_eq!(result.position.y, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.momentum.magnitude(), 1.0, epsilon = 1e-12);
        // bends toward -x for positive charge in +y field
        assert!(result.position.x < -30.0);
    }

    #[test]
    fn test_negative_field_mirrors_bend() {
        let field = UniformField::dipole(-1.0);
        let result = extrapolator()
            .swim(Vector3::ZERO, Vector3::new(0.0, 0.0, 1.0), 1.0, 500.0, &field)
            .unwrap();
        assert_abs_diff_eq!(result.position.x, -arc_x(1.0, 1.0, 1.0, 500.0), epsilon = 1e-6);
    }

    #[test]
    fn test_round_trip_in_uniform_field() {
        let field = UniformField::dipole(-0.5);
        let start = Vector3::new(3.0, 1.5, 50.0);
        let momentum = Vector3::new(0.08, -0.03, 1.1);
        let ex = extrapolator();

        let forward = ex.swim(start, momentum, -1.0, 850.0, &field).unwrap();
        let back = ex
            .extrapolate_back(forward.position, forward.momentum, -1.0, start.z, &field)
            .unwrap();

        assert_abs_diff_eq!(back.position.x, start.x, epsilon = 1e-6);
        assert_abs_diff_eq!(back.position.y, start.y, epsilon = 1e-6);
        assert_abs_diff_eq!(back.position.z, start.z, epsilon = 1e-12);
        assert_abs_diff_eq!(back.momentum.x, momentum.x, epsilon = 1e-6);
        assert_abs_diff_eq!(back.momentum.y, momentum.y, epsilon = 1e-6);
        assert_abs_diff_eq!(back.momentum.z, momentum.z, epsilon = 1e-6);
    }

    #[test]
    fn test_wrong_direction_gives_no_result() {
        let field = UniformField::dipole(0.5);
        let ex = extrapolator();
        // pointing downstream, target upstream
        assert!(ex
            .swim(Vector3::new(0.0, 0.0, 500.0), Vector3::new(0.0, 0.0, 1.0), 1.0, 100.0, &field)
            .is_none());
        // momentum along the field axis never advances in depth
        assert!(ex
            .swim(Vector3::ZERO, Vector3::new(0.0, 1.0, 0.0), 1.0, 100.0, &field)
            .is_none());
    }

    #[test]
    fn test_looping_particle_gives_no_result() {
        // radius ≈ 67 mm, can never reach 500 mm
        let field = UniformField::dipole(1.0);
        let result = extrapolator().swim(
            Vector3::ZERO,
            Vector3::new(0.0, 0.0, 0.02),
            1.0,
            500.0,
            &field,
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_inputs() {
        let field = UniformField::zero();
        let ex = extrapolator();
        assert!(ex.swim(Vector3::ZERO, Vector3::ZERO, 1.0, 10.0, &field).is_none());
        assert!(ex
            .swim(Vector3::new(f64::NAN, 0.0, 0.0), Vector3::new(0.0, 0.0, 1.0), 1.0, 10.0, &field)
            .is_none());
    }

    #[test]
    fn test_step_refinement_schedule() {
        // 17 steps of 5 mm cover 85 ≥ 0.8 × 103, then 36 steps of 0.5 mm
        let result = extrapolator()
            .swim(Vector3::ZERO, Vector3::new(0.0, 0.0, 1.0), 0.0, 103.0, &UniformField::zero())
            .unwrap();
        assert_eq!(result.steps, 53);
        assert_abs_diff_eq!(result.path_length, 103.0, epsilon = 1e-9);
    }

    #[test]
    fn test_already_at_target() {
        let result = extrapolator()
            .swim(
                Vector3::new(0.0, 0.0, 42.0),
                Vector3::new(0.0, 0.0, 1.0),
                1.0,
                42.0,
                &UniformField::dipole(1.0),
            )
            .unwrap();
        assert_eq!(result.steps, 0);
        assert_eq!(result.position.z, 42.0);
    }

    #[test]
    fn test_field_beyond_path_is_ignored() {
        let field = |p: Vector3| Vector3::new(0.0, if p.z > 1000.0 { 2.0 } else { 0.0 }, 0.0);
        let momentum = Vector3::new(0.1, 0.0, 1.0);
        let result = extrapolator()
            .swim(Vector3::ZERO, momentum, 1.0, 400.0, &field)
            .unwrap();
        assert_abs_diff_eq!(result.position.x, 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_backward_extrapolation_matches_arc() {
        let field = UniformField::dipole(1.0);
        let ex = extrapolator();
        let forward = ex
            .swim(Vector3::ZERO, Vector3::new(0.0, 0.0, 1.0), 1.0, 500.0, &field)
            .unwrap();
        let back = ex
            .extrapolate_back(forward.position, forward.momentum, 1.0, 0.0, &field)
            .unwrap();

        assert_abs_diff_eq!(back.position.x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(back.momentum.z, 1.0, epsilon = 1e-9);
        assert!(back.momentum.z > 0.0);
    }

    #[test]
    fn test_bend_depends_on_charge_times_field() {
        let ex = extrapolator();
        let start = Vector3::new(2.0, -1.0, 100.0);
        let momentum = Vector3::new(0.02, 0.01, 0.9);
        let flipped = ex
            .swim(start, momentum, -1.0, 800.0, &UniformField::dipole(-0.8))
            .unwrap();
        let direct = ex
            .swim(start, momentum, 1.0, 800.0, &UniformField::dipole(0.8))
            .unwrap();
        let opposite = ex
            .swim(start, momentum, 1.0, 800.0, &UniformField::dipole(-0.8))
            .unwrap();

        assert_abs_diff_eq!(flipped.position.x, direct.position.x, epsilon = 1e-9);
        assert_abs_diff_eq!(flipped.position.y, direct.position.y, epsilon = 1e-9);
        // a negative map bends the same particle the other way
        assert!((opposite.position.x - direct.position.x).abs() > 10.0);
    }

    #[test]
    fn test_round_trip_across_field_reversal() {
        // polarity changes sign at z = 300
        let field = |p: Vector3| Vector3::new(0.0, if p.z > 300.0 { -0.5 } else { 0.5 }, 0.0);
        let start = Vector3::new(0.0, 0.0, 100.0);
        let momentum = Vector3::new(0.01, 0.0, 1.0);
        let ex = extrapolator();

        let forward = ex.swim(start, momentum, 1.0, 500.0, &field).unwrap();
        let reference = ex.swim(start, momentum, 1.0, 500.0, &UniformField::dipole(0.5)).unwrap();
        assert!((forward.position.x - reference.position.x).abs() > 1.0);

        let back = ex
            .extrapolate_back(forward.position, forward.momentum, 1.0, start.z, &field)
            .unwrap();
        assert_abs_diff_eq!(back.position.x, start.x, epsilon = 0.5);
        assert_abs_diff_eq!(back.position.y, start.y, epsilon = 1e-9);
        assert_abs_diff_eq!(back.momentum.z, momentum.z, epsilon = 1e-3);
    }

    #[test]
    fn test_helix_tangent_is_unit() {
        let traj = LocalTrajectory::new(
            Vector3::new(1.0, 0.3, 0.2),
            Vector3::ZERO,
            -1.0,
            0.7,
        )
        .unwrap();
        assert!(traj.is_helix());
        for s in [0.0, 10.0, 250.0] {
            assert_abs_diff_eq!(traj.tangent_at(s).magnitude(), 1.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(traj.point_at(0.0).distance(&Vector3::ZERO), 0.0, epsilon = 1e-9);
    }
}
