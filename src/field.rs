//! Magnetic field sampling
//!
//! The analysis never builds a field map itself; it only samples one through
//! [`FieldMap`]. Positions and returned field vectors are in the detector
//! frame (mm, Tesla).

use crate::geometry::Vector3;
use serde::{Deserialize, Serialize};

/// A sampled, position-dependent magnetic field.
pub trait FieldMap {
    /// Field vector at `position` (detector frame).
    fn field(&self, position: Vector3) -> Vector3;
}

impl<F> FieldMap for F
where
    F: Fn(Vector3) -> Vector3,
{
    fn field(&self, position: Vector3) -> Vector3 {
        self(position)
    }
}

/// The same field vector everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformField {
    pub value: Vector3,
}

impl UniformField {
    pub fn new(value: Vector3) -> Self {
        Self { value }
    }

    /// Dipole field of strength `b` Tesla along detector `y`
    pub fn dipole(b: f64) -> Self {
        Self::new(Vector3::new(0.0, b, 0.0))
    }

    pub fn zero() -> Self {
        Self::new(Vector3::ZERO)
    }
}

impl FieldMap for UniformField {
    fn field(&self, _position: Vector3) -> Vector3 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_field_ignores_position() {
        let f = UniformField::dipole(-0.5);
        assert_eq!(f.field(Vector3::ZERO).y, -0.5);
        assert_eq!(f.field(Vector3::new(10.0, 3.0, 900.0)).y, -0.5);
    }

    #[test]
    fn test_closure_field() {
        let f = |p: Vector3| Vector3::new(0.0, if p.z > 100.0 { 1.0 } else { 0.0 }, 0.0);
        assert_eq!(f.field(Vector3::new(0.0, 0.0, 50.0)).y, 0.0);
        assert_eq!(f.field(Vector3::new(0.0, 0.0, 150.0)).y, 1.0);
    }
}
