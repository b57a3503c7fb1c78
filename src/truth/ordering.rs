//! Trajectory ordering of a particle's active and inactive truth hits
//!
//! Active hits arrive already in traversal order. Inactive (passive material)
//! hits are woven in: before each active hit, every not-yet-used inactive hit
//! whose derived layer is below that active hit's layer is emitted, in input
//! order. Whatever is left over after the last active hit goes at the end.
//!
//! ```text
//! active:    A1        A2   A3        A4
//! inactive:       I1             I3
//! ordered:   A1   I1   A2   A3   I3   A4
//! ```

use crate::truth::hits::{SensorGeometry, TruthHit};
use serde::{Deserialize, Serialize};

/// Sensitive or passive material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HitKind {
    Active,
    Inactive,
}

impl HitKind {
    pub fn name(&self) -> &'static str {
        match self {
            HitKind::Active => "active",
            HitKind::Inactive => "inactive",
        }
    }
}

/// A truth hit placed on the particle's trajectory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderedHit<'a> {
    pub hit: &'a TruthHit,
    pub kind: HitKind,
    pub layer: u32,
}

impl OrderedHit<'_> {
    pub fn depth(&self) -> f64 {
        self.hit.position.z
    }
}

/// Merges active and inactive truth hits into one trajectory-ordered sequence
#[derive(Debug, Clone, Copy)]
pub struct HitOrderer<'a> {
    geometry: &'a SensorGeometry,
    sensor_suffix: &'a str,
}

impl<'a> HitOrderer<'a> {
    pub fn new(geometry: &'a SensorGeometry, sensor_suffix: &'a str) -> Self {
        Self {
            geometry,
            sensor_suffix,
        }
    }

    /// Layer of an inactive hit, looked up through the sensor its volume encloses.
    pub fn inactive_layer(&self, hit: &TruthHit) -> Option<u32> {
        let layer = self
            .geometry
            .layer_of_volume(&hit.volume, self.sensor_suffix);
        if layer.is_none() {
            log::warn!(
                "Inactive truth hit {} in volume '{}' does not correspond to a sensor",
                hit.id,
                hit.volume
            );
        }
        layer
    }

    /// Order `active` and `inactive` hits along the trajectory.
    ///
    /// Inactive hits whose layer cannot be resolved are left out.
    pub fn order<'h>(
        &self,
        active: &[&'h TruthHit],
        inactive: &[&'h TruthHit],
    ) -> Vec<OrderedHit<'h>> {
        let mut pending: Vec<OrderedHit<'h>> = inactive
            .iter()
            .filter_map(|&hit| {
                self.inactive_layer(hit).map(|layer| OrderedHit {
                    hit,
                    kind: HitKind::Inactive,
                    layer,
                })
            })
            .collect();
        let mut ordered = Vec::with_capacity(active.len() + pending.len());

        for &hit in active {
            let (before, rest): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|p| p.layer < hit.layer);
            ordered.extend(before);
            pending = rest;

            ordered.push(OrderedHit {
                hit,
                kind: HitKind::Active,
                layer: hit.layer,
            });
        }

        ordered.extend(pending);
        ordered
    }
}
