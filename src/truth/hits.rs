//! Truth hits, raw readouts, reconstructed tracks and the event container

use crate::geometry::Vector3;
use crate::truth::calorimeter::CalorimeterHit;
use crate::truth::particles::{ParticleId, ParticleTable};
use crate::truth::relations::RelationPair;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Index of a truth hit within its collection (active or inactive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TruthHitId(pub usize);

impl std::fmt::Display for TruthHitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Opaque identity of one raw detector readout
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReadoutId(pub u64);

impl std::fmt::Display for ReadoutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Identity of a composite hit, shared between tracks that use it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompositeHitId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRUTH HITS
// ═══════════════════════════════════════════════════════════════════════════════

/// A simulated energy deposition of one particle in the tracker.
///
/// Active hits sit in sensitive silicon and carry their sensor layer directly.
/// Inactive hits sit in passive material; their layer is derived from the
/// `volume` name via [`SensorGeometry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruthHit {
    pub id: TruthHitId,
    /// Position (detector frame, mm)
    pub position: Vector3,
    /// Momentum at the hit (detector frame, GeV/c)
    pub momentum: Vector3,
    /// Sensor layer reported by the simulation
    pub layer: u32,
    /// Name of the geometry volume containing the hit
    pub volume: String,
    /// Whether the hit is in sensitive material
    pub active: bool,
    /// Owning particle. `None` only in corrupted input and rejected on use.
    pub particle: Option<ParticleId>,
}

impl TruthHit {
    pub fn active(
        id: TruthHitId,
        particle: ParticleId,
        layer: u32,
        position: Vector3,
        momentum: Vector3,
    ) -> Self {
        Self {
            id,
            position,
            momentum,
            layer,
            volume: format!("module_L{}", layer),
            active: true,
            particle: Some(particle),
        }
    }

    pub fn inactive(
        id: TruthHitId,
        particle: ParticleId,
        volume: impl Into<String>,
        position: Vector3,
        momentum: Vector3,
    ) -> Self {
        Self {
            id,
            position,
            momentum,
            layer: 0,
            volume: volume.into(),
            active: false,
            particle: Some(particle),
        }
    }

    /// Depth coordinate (detector `z`)
    pub fn depth(&self) -> f64 {
        self.position.z
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// READOUTS, COMPOSITE HITS, TRACKS
// ═══════════════════════════════════════════════════════════════════════════════

/// One digitised detector channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawReadout {
    pub id: ReadoutId,
    /// Packed channel identifier
    pub channel: u64,
    /// Sensor layer of the channel
    pub layer: u32,
}

/// One measurement point on a track built from one or more readouts
/// (typically an axial/stereo strip pair).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeHit {
    pub id: CompositeHitId,
    pub position: Vector3,
    pub readouts: Vec<RawReadout>,
}

impl CompositeHit {
    /// Layer of the first readout, used to label the whole hit
    pub fn layer(&self) -> Option<u32> {
        self.readouts.first().map(|r| r.layer)
    }
}

/// Fitted helix parameters of a reconstructed track
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackParameters {
    pub d0: f64,
    pub phi0: f64,
    /// Signed curvature
    pub omega: f64,
    pub z0: f64,
    pub tan_lambda: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedTrack {
    pub id: TrackId,
    /// Composite hits in traversal order
    pub hits: Vec<CompositeHit>,
    pub parameters: TrackParameters,
    /// Charge sign (+1 / -1)
    pub charge: i32,
}

impl ReconstructedTrack {
    /// Track lies in the top half of the detector
    pub fn is_top(&self) -> bool {
        self.parameters.tan_lambda > 0.0
    }

    pub fn shares_hit(&self, hit: CompositeHitId) -> bool {
        self.hits.iter().any(|h| h.id == hit)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SENSOR GEOMETRY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub name: String,
    pub layer: u32,
}

/// Name → layer lookup for the tracker sensors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorGeometry {
    pub sensors: Vec<Sensor>,
}

impl SensorGeometry {
    pub fn new(sensors: Vec<Sensor>) -> Self {
        Self { sensors }
    }

    /// Layer of the sensor named `"{volume}{suffix}"`.
    ///
    /// Passive volumes carry no layer of their own; the sensor they enclose
    /// shares their name plus a fixed suffix.
    pub fn layer_of_volume(&self, volume: &str, suffix: &str) -> Option<u32> {
        self.sensors
            .iter()
            .find(|s| {
                s.name.len() == volume.len() + suffix.len()
                    && s.name.starts_with(volume)
                    && s.name.ends_with(suffix)
            })
            .map(|s| s.layer)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT
// ═══════════════════════════════════════════════════════════════════════════════

/// All truth and reconstruction inputs of one event.
///
/// Optional collections may be absent from an event; their absence is not an
/// error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TruthEvent {
    pub number: u64,
    pub particles: ParticleTable,
    /// Active tracker hits, indexed by [`TruthHitId`]
    pub tracker_hits: Vec<TruthHit>,
    pub inactive_hits: Option<Vec<TruthHit>>,
    pub calorimeter_hits: Option<Vec<CalorimeterHit>>,
    /// Readout → active truth hit relations
    pub relations: Option<Vec<RelationPair>>,
    pub tracks: Vec<ReconstructedTrack>,
}

impl TruthEvent {
    pub fn track(&self, id: TrackId) -> Option<&ReconstructedTrack> {
        self.tracks.iter().find(|t| t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_of_volume_requires_exact_suffix() {
        let geometry = SensorGeometry::new(vec![
            Sensor {
                name: "module_L1t_halfmodule_axial_sensor0".into(),
                layer: 1,
            },
            Sensor {
                name: "module_L1t_halfmodule_stereo_sensor0".into(),
                layer: 2,
            },
        ]);

        assert_eq!(
            geometry.layer_of_volume("module_L1t_halfmodule_stereo", "_sensor0"),
            Some(2)
        );
        assert_eq!(geometry.layer_of_volume("module_L1t_halfmodule", "_sensor0"), None);
        assert_eq!(geometry.layer_of_volume("module_L9", "_sensor0"), None);
    }

    #[test]
    fn test_composite_hit_layer() {
        let hit = CompositeHit {
            id: CompositeHitId(0),
            position: Vector3::ZERO,
            readouts: vec![
                RawReadout {
                    id: ReadoutId(10),
                    channel: 0,
                    layer: 3,
                },
                RawReadout {
                    id: ReadoutId(11),
                    channel: 1,
                    layer: 4,
                },
            ],
        };
        assert_eq!(hit.layer(), Some(3));
    }

    #[test]
    fn test_track_half() {
        let mut track = ReconstructedTrack {
            id: TrackId(0),
            hits: Vec::new(),
            parameters: TrackParameters::default(),
            charge: -1,
        };
        assert!(!track.is_top());
        track.parameters.tan_lambda = 0.02;
        assert!(track.is_top());
    }
}
