//! Cartesian vectors and the two coordinate frames used by the tracker
//!
//! The detector frame has `z` along the beam (the depth axis along which
//! sensor layers are stacked) and `y` along the dipole field. The tracking
//! frame is a cyclic relabelling of it:
//!
//! ```text
//! tracking (x, y, z) = detector (z, x, y)
//! ```
//!
//! so that the depth axis becomes tracking `x` and the field axis becomes
//! tracking `z`, the axis a helix winds around.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// A three-component Cartesian vector (position in mm, momentum in GeV/c).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn from_array(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    #[inline]
    pub fn dot(&self, other: &Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn magnitude(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Length of the projection onto the x-y plane
    #[inline]
    pub fn rxy(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Unit vector along `self`, or `None` for the zero vector
    pub fn unit(&self) -> Option<Vector3> {
        let mag = self.magnitude();
        if mag > 0.0 {
            Some(*self * (1.0 / mag))
        } else {
            None
        }
    }

    pub fn distance(&self, other: &Vector3) -> f64 {
        (*self - *other).magnitude()
    }

    /// Detector frame → tracking frame
    #[inline]
    pub fn to_tracking(self) -> Vector3 {
        Vector3::new(self.z, self.x, self.y)
    }

    /// Tracking frame → detector frame
    #[inline]
    pub fn to_detector(self) -> Vector3 {
        Vector3::new(self.y, self.z, self.x)
    }

    /// Rotate about the detector `y` (field) axis by `angle` radians.
    pub fn rotate_about_y(&self, angle: f64) -> Vector3 {
        if angle == 0.0 {
            return *self;
        }
        let (sin, cos) = angle.sin_cos();
        Vector3::new(
            self.x * cos + self.z * sin,
            self.y,
            -self.x * sin + self.z * cos,
        )
    }

    /// Slope in the horizontal (x-z) view: `x / z`
    #[inline]
    pub fn slope_x(&self) -> f64 {
        self.x / self.z
    }

    /// Slope in the vertical (y-z) view: `y / z`
    #[inline]
    pub fn slope_y(&self) -> f64 {
        self.y / self.z
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vector3 {
    type Output = Vector3;
    fn add(self, other: Vector3) -> Vector3 {
        Vector3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl AddAssign for Vector3 {
    fn add_assign(&mut self, other: Vector3) {
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
    }
}

impl Sub for Vector3 {
    type Output = Vector3;
    fn sub(self, other: Vector3) -> Vector3 {
        Vector3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Vector3;
    fn mul(self, s: f64) -> Vector3 {
        Vector3::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Neg for Vector3 {
    type Output = Vector3;
    fn neg(self) -> Vector3 {
        Vector3::new(-self.x, -self.y, -self.z)
    }
}

impl std::fmt::Display for Vector3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.4}, {:.4}, {:.4})", self.x, self.y, self.z)
    }
}

/// Difference of projected slopes between two momenta in the two views.
///
/// Returns `[Δ(x/z), Δ(y/z)]` as `after - before`.
pub fn slope_deltas(before: &Vector3, after: &Vector3) -> [f64; 2] {
    [
        after.slope_x() - before.slope_x(),
        after.slope_y() - before.slope_y(),
    ]
}
