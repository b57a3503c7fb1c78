//! # Detector Truth Analysis
//!
//! Attributes reconstructed tracks to the simulated particles that produced
//! them and rebuilds layer-by-layer truth kinematics by swimming each matched
//! particle backward between consecutive truth hits.
//!
//! ## Architecture Overview
//!
//! ```text
//!                          DETECTOR TRUTH ANALYZER
//!     ┌────────────────────────────────────────────────────────────────┐
//!     │                                                                │
//!     │   TruthEvent ──► EventTruthIndex (built once per event)        │
//!     │                   • readout → truth hit relations              │
//!     │                   • particle → active / inactive hits          │
//!     │                   • particle → calorimeter hits                │
//!     │                        │                                       │
//!     │   Track ──────────────►│                                       │
//!     │                        ▼                                       │
//!     │              ┌──────────────────┐                              │
//!     │              │ TrackTruthMatcher│──► NoMatch (done)            │
//!     │              └────────┬─────────┘                              │
//!     │                       │ Matched                                │
//!     │                       ▼                                        │
//!     │              ┌──────────────────┐     ┌─────────────────────┐  │
//!     │              │   HitOrderer     │────►│TrajectoryExtrapolator│ │
//!     │              └──────────────────┘     └──────────┬──────────┘  │
//!     │                                                  │             │
//!     │                          residuals, scattering ◄─┘             │
//!     │                                  │                             │
//!     │                                  ▼                             │
//!     │                           LayersComputed                       │
//!     └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every analysis call is independent; nothing is cached between events.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use track_truth::truth::{DetectorTruthAnalyzer, TruthConfig};
//! use track_truth::field::UniformField;
//!
//! let analyzer = DetectorTruthAnalyzer::new(
//!     TruthConfig::default(),
//!     UniformField::dipole(-0.5),
//!     geometry,
//! )?;
//! let truth = analyzer.analyze_event(&event)?;
//! for track in &truth.tracks {
//!     println!("{}", track.summary());
//! }
//! ```

// Sub-modules
pub mod calorimeter;
pub mod extrapolation;
pub mod hits;
pub mod matching;
pub mod ordering;
pub mod particles;
pub mod relations;

// Re-exports
pub use calorimeter::{
    CalorimeterContribution, CalorimeterHit, CalorimeterHitTruth, CalorimeterTruth, CellIndex,
};
pub use extrapolation::{
    ExtrapolationConfig, LocalTrajectory, SwimResult, TrajectoryExtrapolator, DEFAULT_STEP_SIZE,
    FIELD_CONVERSION, REFINEMENT_FACTOR, REFINEMENT_TRIGGER,
};
pub use hits::{
    CompositeHit, CompositeHitId, RawReadout, ReadoutId, ReconstructedTrack, Sensor,
    SensorGeometry, TrackId, TrackParameters, TruthEvent, TruthHit, TruthHitId,
};
pub use matching::{AttributionResult, TrackTruthMatcher, VOTES_PER_COMPOSITE_HIT};
pub use ordering::{HitKind, HitOrderer, OrderedHit};
pub use particles::{ParticleId, ParticleRecord, ParticleTable, SimParticle, Vertex};
pub use relations::{ReadoutTruthTable, RelationMode, RelationPair, RelationTable};

use crate::error::TruthError;
use crate::field::FieldMap;
use crate::geometry::{slope_deltas, Vector3};
use crate::TruthResult;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

// ═══════════════════════════════════════════════════════════════════════════════
// TRUTH CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for the detector truth analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruthConfig {
    /// Swimming parameters
    pub extrapolation: ExtrapolationConfig,
    /// Rotation (radians, about the field axis) applied to momenta before
    /// projected slopes are taken
    pub beam_axis_rotation: f64,
    /// Name suffix joining a passive volume to the sensor it encloses
    pub inactive_sensor_suffix: String,
    /// Build per-layer residuals and scattering angles
    pub compute_layer_truth: bool,
    /// Summarise the matched particle's calorimeter deposits
    pub compute_calorimeter: bool,
    /// Find other tracks sharing hits with the analysed one
    pub track_sharing: bool,
}

impl Default for TruthConfig {
    fn default() -> Self {
        Self {
            extrapolation: ExtrapolationConfig::default(),
            beam_axis_rotation: 0.0,
            inactive_sensor_suffix: "_sensor0".to_string(),
            compute_layer_truth: true,
            compute_calorimeter: true,
            track_sharing: true,
        }
    }
}

impl TruthConfig {
    /// Attribution only (fast)
    pub fn minimal() -> Self {
        Self {
            compute_layer_truth: false,
            compute_calorimeter: false,
            track_sharing: false,
            ..Default::default()
        }
    }

    /// Everything, with fine extrapolation steps (slower)
    pub fn comprehensive() -> Self {
        Self {
            extrapolation: ExtrapolationConfig::fine(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> TruthResult<()> {
        let step = self.extrapolation.step_size;
        if !(step.is_finite() && step > 0.0) {
            return Err(TruthError::InvalidConfig(format!(
                "step_size must be positive, got {}",
                step
            )));
        }
        if self.extrapolation.max_steps == 0 {
            return Err(TruthError::InvalidConfig(
                "max_steps must be at least 1".to_string(),
            ));
        }
        if !self.beam_axis_rotation.is_finite() {
            return Err(TruthError::InvalidConfig(
                "beam_axis_rotation must be finite".to_string(),
            ));
        }
        if self.inactive_sensor_suffix.is_empty() {
            return Err(TruthError::InvalidConfig(
                "inactive_sensor_suffix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Load and validate a configuration saved as JSON
    pub fn from_json_file(path: impl AsRef<Path>) -> TruthResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self =
            serde_json::from_str(&text).map_err(|e| TruthError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> TruthResult<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| TruthError::Serialization(e.to_string()))?;
        std::fs::write(path.as_ref(), text)?;
        log::debug!("Saved truth config to {:?}", path.as_ref());
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT INDEX
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-event lookup tables, built once and shared by every track of the event.
#[derive(Debug)]
pub struct EventTruthIndex<'e> {
    event: &'e TruthEvent,
    relations: ReadoutTruthTable,
    active: HashMap<ParticleId, Vec<&'e TruthHit>>,
    inactive: HashMap<ParticleId, Vec<&'e TruthHit>>,
    calorimeter: HashMap<ParticleId, Vec<&'e CalorimeterHit>>,
}

impl<'e> EventTruthIndex<'e> {
    /// Index `event`, rejecting hits without a known owning particle.
    ///
    /// Absent optional collections leave the corresponding lookups empty.
    pub fn build(event: &'e TruthEvent) -> TruthResult<Self> {
        for (index, hit) in event.tracker_hits.iter().enumerate() {
            if hit.id.0 != index {
                return Err(TruthError::TruthHitIndexMismatch { hit: hit.id, index });
            }
        }

        let relations = event
            .relations
            .as_deref()
            .map(ReadoutTruthTable::from_pairs)
            .unwrap_or_else(|| ReadoutTruthTable::new(RelationMode::ManyToMany));

        let active = Self::group_by_particle(&event.particles, &event.tracker_hits)?;
        let inactive = match &event.inactive_hits {
            Some(hits) => Self::group_by_particle(&event.particles, hits)?,
            None => HashMap::new(),
        };
        let calorimeter = match &event.calorimeter_hits {
            Some(hits) => {
                let map = calorimeter::hits_by_particle(hits)?;
                if let Some(&unknown) = map.keys().find(|&&p| !event.particles.contains(p)) {
                    return Err(TruthError::UnknownParticle(unknown));
                }
                map
            }
            None => HashMap::new(),
        };

        Ok(Self {
            event,
            relations,
            active,
            inactive,
            calorimeter,
        })
    }

    fn group_by_particle(
        particles: &ParticleTable,
        hits: &'e [TruthHit],
    ) -> TruthResult<HashMap<ParticleId, Vec<&'e TruthHit>>> {
        let mut map: HashMap<ParticleId, Vec<&'e TruthHit>> = HashMap::new();
        for hit in hits {
            let particle = hit
                .particle
                .ok_or(TruthError::OrphanTruthHit { hit: hit.id })?;
            if !particles.contains(particle) {
                return Err(TruthError::UnknownParticle(particle));
            }
            map.entry(particle).or_default().push(hit);
        }
        Ok(map)
    }

    pub fn event(&self) -> &'e TruthEvent {
        self.event
    }

    pub fn relations(&self) -> &ReadoutTruthTable {
        &self.relations
    }

    pub fn matcher(&self) -> TrackTruthMatcher<'_> {
        TrackTruthMatcher::new(&self.relations, &self.event.tracker_hits)
    }

    /// Active truth hits of `particle`, in input order
    pub fn active_hits(&self, particle: ParticleId) -> &[&'e TruthHit] {
        self.active.get(&particle).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Inactive truth hits of `particle`, in input order
    pub fn inactive_hits(&self, particle: ParticleId) -> &[&'e TruthHit] {
        self.inactive.get(&particle).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn calorimeter_hits(&self, particle: ParticleId) -> &[&'e CalorimeterHit] {
        self.calorimeter
            .get(&particle)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRACK TRUTH
// ═══════════════════════════════════════════════════════════════════════════════

/// How far the analysis of one track got
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TruthStage {
    /// No hit resolved to any particle
    NoMatch,
    /// Attributed; layer truth not requested
    Matched,
    LayersComputed,
}

/// Truth kinematics at one layer crossing of the matched particle.
///
/// Produced by swimming the particle back from its next hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerTruthRecord {
    pub layer: u32,
    pub kind: HitKind,
    /// Truth position at this layer
    pub position: Vector3,
    /// Truth momentum at this layer
    pub momentum: Vector3,
    /// Layer of the hit the swim started from
    pub from_layer: u32,
    pub extrapolated_position: Vector3,
    /// Flight-direction momentum arriving from the next hit
    pub extrapolated_momentum: Vector3,
    /// `actual - extrapolated` in detector (x, y)
    pub residual: [f64; 2],
    /// Change of projected slope (x/z, y/z) across the layer
    pub scatter: [f64; 2],
}

/// Per-layer records keyed by layer, separately for sensitive and passive material
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerTruth {
    pub active: BTreeMap<u32, LayerTruthRecord>,
    pub inactive: BTreeMap<u32, LayerTruthRecord>,
}

impl LayerTruth {
    pub fn get(&self, kind: HitKind, layer: u32) -> Option<&LayerTruthRecord> {
        match kind {
            HitKind::Active => self.active.get(&layer),
            HitKind::Inactive => self.inactive.get(&layer),
        }
    }

    pub fn len(&self) -> usize {
        self.active.len() + self.inactive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.inactive.is_empty()
    }

    fn insert(&mut self, record: LayerTruthRecord) {
        let map = match record.kind {
            HitKind::Active => &mut self.active,
            HitKind::Inactive => &mut self.inactive,
        };
        map.entry(record.layer).or_insert(record);
    }
}

/// Everything known about one track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackTruth {
    pub track: TrackId,
    pub stage: TruthStage,
    pub attribution: AttributionResult,
    /// Root ancestor of the matched particle
    pub primary: Option<ParticleId>,
    pub layers: LayerTruth,
    pub calorimeter: Option<CalorimeterTruth>,
    /// Per layer, other tracks sharing a composite hit with this one
    pub shared_tracks: BTreeMap<u32, BTreeSet<TrackId>>,
}

impl TrackTruth {
    pub fn matched(&self) -> Option<ParticleId> {
        self.attribution.matched
    }

    pub fn purity(&self) -> f64 {
        self.attribution.purity
    }

    /// Total number of other tracks sharing at least one hit
    pub fn n_shared_tracks(&self) -> usize {
        self.shared_tracks
            .values()
            .flatten()
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn summary(&self) -> String {
        let matched = match self.attribution.matched {
            Some(p) => p.to_string(),
            None => "none".to_string(),
        };
        let mut s = format!(
            "Track {} [{:?}]\n\
             ├─ Matched: {} (primary {})\n\
             ├─ Purity: {:.3} ({}/{} hits, {} bad)\n\
             ├─ Half: {}\n\
             ├─ Layers: {} active, {} inactive",
            self.track,
            self.stage,
            matched,
            self.primary
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.attribution.purity,
            self.attribution.matched_hits,
            self.attribution.total_hits,
            self.attribution.bad_hits,
            if self.attribution.is_top { "top" } else { "bottom" },
            self.layers.active.len(),
            self.layers.inactive.len(),
        );
        if let Some(cal) = &self.calorimeter {
            s.push_str(&format!(
                "\n├─ Calorimeter: {} hits, {:.3} GeV contributed",
                cal.n_hits(),
                cal.contributed_energy()
            ));
        }
        s.push_str(&format!("\n└─ Shared with: {} tracks", self.n_shared_tracks()));
        s
    }
}

/// Truth of every track in one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTruth {
    pub number: u64,
    pub tracks: Vec<TrackTruth>,
}

impl EventTruth {
    pub fn n_matched(&self) -> usize {
        self.tracks.iter().filter(|t| t.matched().is_some()).count()
    }

    /// Mean purity over all tracks (0 for an event without tracks)
    pub fn mean_purity(&self) -> f64 {
        if self.tracks.is_empty() {
            return 0.0;
        }
        self.tracks.iter().map(TrackTruth::purity).sum::<f64>() / self.tracks.len() as f64
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DETECTOR TRUTH ANALYZER
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-track truth facade composing matching, hit ordering and extrapolation.
///
/// Holds only configuration and the external collaborators (field map and
/// sensor geometry); every call works on its own event data.
#[derive(Debug)]
pub struct DetectorTruthAnalyzer<F: FieldMap> {
    config: TruthConfig,
    field: F,
    geometry: SensorGeometry,
    extrapolator: TrajectoryExtrapolator,
}

impl<F: FieldMap> DetectorTruthAnalyzer<F> {
    pub fn new(config: TruthConfig, field: F, geometry: SensorGeometry) -> TruthResult<Self> {
        config.validate()?;
        Ok(Self {
            extrapolator: TrajectoryExtrapolator::new(config.extrapolation.clone()),
            config,
            field,
            geometry,
        })
    }

    pub fn config(&self) -> &TruthConfig {
        &self.config
    }

    pub fn geometry(&self) -> &SensorGeometry {
        &self.geometry
    }

    pub fn extrapolator(&self) -> &TrajectoryExtrapolator {
        &self.extrapolator
    }

    /// Attribute `track` and, when matched, build its truth diagnostics.
    pub fn analyze_track(
        &self,
        index: &EventTruthIndex<'_>,
        track: &ReconstructedTrack,
    ) -> TruthResult<TrackTruth> {
        let matcher = index.matcher();
        let mut attribution = matcher.match_track(track)?;
        let shared_tracks = if self.config.track_sharing {
            self.shared_tracks(index.event(), track)
        } else {
            BTreeMap::new()
        };

        let Some(particle) = attribution.matched else {
            return Ok(TrackTruth {
                track: track.id,
                stage: TruthStage::NoMatch,
                attribution,
                primary: None,
                layers: LayerTruth::default(),
                calorimeter: None,
                shared_tracks,
            });
        };

        let record = index.event().particles.get(particle)?;
        let primary = index.event().particles.primary(particle)?;

        let on_track = matcher.related_truth_hits(track);
        attribution.unmatched_truth_hits = index
            .active_hits(particle)
            .iter()
            .map(|h| h.id)
            .filter(|id| !on_track.contains(id))
            .collect();

        let (stage, layers) = if self.config.compute_layer_truth {
            let orderer = HitOrderer::new(&self.geometry, &self.config.inactive_sensor_suffix);
            let ordered = orderer.order(index.active_hits(particle), index.inactive_hits(particle));
            (
                TruthStage::LayersComputed,
                self.compute_layer_truth(&ordered, record.charge),
            )
        } else {
            (TruthStage::Matched, LayerTruth::default())
        };

        let calorimeter = if self.config.compute_calorimeter {
            let hits = index.calorimeter_hits(particle);
            (!hits.is_empty()).then(|| CalorimeterTruth::summarize(particle, hits))
        } else {
            None
        };

        Ok(TrackTruth {
            track: track.id,
            stage,
            attribution,
            primary: Some(primary),
            layers,
            calorimeter,
            shared_tracks,
        })
    }

    /// Residuals and scattering angles for consecutive pairs of `ordered`.
    ///
    /// A hit repeating the previous hit's layer and kind is skipped. Pairs
    /// whose extrapolation fails produce no record.
    pub fn compute_layer_truth(&self, ordered: &[OrderedHit<'_>], charge: f64) -> LayerTruth {
        let mut truth = LayerTruth::default();
        let mut prev: Option<&OrderedHit<'_>> = None;

        for hit in ordered {
            if let Some(earlier) = prev {
                if earlier.layer == hit.layer && earlier.kind == hit.kind {
                    continue;
                }
                match self.layer_record(earlier, hit, charge) {
                    Some(record) => truth.insert(record),
                    None => log::debug!(
                        "No extrapolation from {} layer {} back to {} layer {}",
                        hit.kind.name(),
                        hit.layer,
                        earlier.kind.name(),
                        earlier.layer
                    ),
                }
            }
            prev = Some(hit);
        }

        truth
    }

    fn layer_record(
        &self,
        earlier: &OrderedHit<'_>,
        later: &OrderedHit<'_>,
        charge: f64,
    ) -> Option<LayerTruthRecord> {
        let swim = self.extrapolator.extrapolate_back(
            later.hit.position,
            later.hit.momentum,
            charge,
            earlier.depth(),
            &self.field,
        )?;

        let actual = earlier.hit;
        let rotation = self.config.beam_axis_rotation;
        let scatter = slope_deltas(
            &swim.momentum.rotate_about_y(rotation),
            &actual.momentum.rotate_about_y(rotation),
        );

        Some(LayerTruthRecord {
            layer: earlier.layer,
            kind: earlier.kind,
            position: actual.position,
            momentum: actual.momentum,
            from_layer: later.layer,
            extrapolated_position: swim.position,
            extrapolated_momentum: swim.momentum,
            residual: [
                actual.position.x - swim.position.x,
                actual.position.y - swim.position.y,
            ],
            scatter,
        })
    }

    fn shared_tracks(
        &self,
        event: &TruthEvent,
        track: &ReconstructedTrack,
    ) -> BTreeMap<u32, BTreeSet<TrackId>> {
        let mut shared: BTreeMap<u32, BTreeSet<TrackId>> = BTreeMap::new();
        for hit in &track.hits {
            let Some(layer) = hit.layer() else {
                continue;
            };
            for other in &event.tracks {
                if other.id != track.id && other.shares_hit(hit.id) {
                    shared.entry(layer).or_default().insert(other.id);
                }
            }
        }
        shared
    }

    /// Analyse every track of `event`
    pub fn analyze_event(&self, event: &TruthEvent) -> TruthResult<EventTruth> {
        let index = EventTruthIndex::build(event)?;
        let tracks = event
            .tracks
            .iter()
            .map(|track| self.analyze_track(&index, track))
            .collect::<TruthResult<Vec<_>>>()?;

        let truth = EventTruth {
            number: event.number,
            tracks,
        };
        log::info!(
            "Event {}: {} tracks, {} matched, mean purity {:.3}",
            truth.number,
            truth.tracks.len(),
            truth.n_matched(),
            truth.mean_purity()
        );
        Ok(truth)
    }

    /// Analyse independent events in parallel, one result per event in input order.
    pub fn analyze_events(&self, events: &[TruthEvent]) -> Vec<TruthResult<EventTruth>>
    where
        F: Sync,
    {
        events
            .par_iter()
            .map(|event| self.analyze_event(event))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::UniformField;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_config_presets_validate() {
        assert!(TruthConfig::default().validate().is_ok());
        assert!(TruthConfig::minimal().validate().is_ok());
        assert!(TruthConfig::comprehensive().validate().is_ok());
        assert!(!TruthConfig::minimal().compute_layer_truth);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let mut config = TruthConfig::default();
        config.extrapolation.step_size = 0.0;
        assert!(matches!(config.validate(), Err(TruthError::InvalidConfig(_))));

        let mut config = TruthConfig::default();
        config.extrapolation.max_steps = 0;
        assert!(config.validate().is_err());

        let mut config = TruthConfig::default();
        config.inactive_sensor_suffix.clear();
        assert!(config.validate().is_err());

        assert!(DetectorTruthAnalyzer::new(config, UniformField::zero(), SensorGeometry::default())
            .is_err());
    }

    fn straight_hits() -> Vec<TruthHit> {
        // straight line along +z with dx/dz = 0.1
        [(1, 100.0), (2, 200.0), (3, 300.0)]
            .iter()
            .map(|&(layer, z)| {
                TruthHit::active(
                    TruthHitId(layer as usize),
                    ParticleId(0),
                    layer,
                    Vector3::new(0.1 * z, 0.0, z),
                    Vector3::new(0.1, 0.0, 1.0),
                )
            })
            .collect()
    }

    #[test]
    fn test_layer_truth_in_zero_field() {
        let analyzer = DetectorTruthAnalyzer::new(
            TruthConfig::default(),
            UniformField::zero(),
            SensorGeometry::default(),
        )
        .unwrap();
        let hits = straight_hits();
        let ordered: Vec<OrderedHit> = hits
            .iter()
            .map(|hit| OrderedHit {
                hit,
                kind: HitKind::Active,
                layer: hit.layer,
            })
            .collect();

        let truth = analyzer.compute_layer_truth(&ordered, -1.0);
        // last hit has nothing after it
        assert_eq!(truth.active.len(), 2);
        assert!(truth.inactive.is_empty());

        let record = truth.get(HitKind::Active, 1).unwrap();
        assert_eq!(record.from_layer, 2);
        assert_abs_diff_eq!(record.residual[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(record.residual[1], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(record.scatter[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(record.extrapolated_position.z, 100.0, epsilon = 1e-12);
    }

    #[test]
    fn test_repeated_layer_skipped() {
        let analyzer = DetectorTruthAnalyzer::new(
            TruthConfig::default(),
            UniformField::zero(),
            SensorGeometry::default(),
        )
        .unwrap();
        let mut hits = straight_hits();
        let mut twin = hits[0].clone();
        twin.id = TruthHitId(9);
        twin.position = Vector3::new(10.5, 0.0, 105.0);
        hits.insert(1, twin);

        let ordered: Vec<OrderedHit> = hits
            .iter()
            .map(|hit| OrderedHit {
                hit,
                kind: HitKind::Active,
                layer: hit.layer,
            })
            .collect();
        let truth = analyzer.compute_layer_truth(&ordered, 1.0);

        // layer 1 is paired with layer 2, never with its own twin
        assert_eq!(truth.get(HitKind::Active, 1).unwrap().from_layer, 2);
        assert_eq!(truth.active.len(), 2);
    }

    #[test]
    fn test_failed_extrapolation_omits_layer() {
        let analyzer = DetectorTruthAnalyzer::new(
            TruthConfig::default(),
            UniformField::zero(),
            SensorGeometry::default(),
        )
        .unwrap();
        let mut hits = straight_hits();
        // a backward-pointing momentum cannot be swum back to layer 1
        hits[1].momentum = Vector3::new(0.0, 0.0, -1.0);
        let ordered: Vec<OrderedHit> = hits
            .iter()
            .map(|hit| OrderedHit {
                hit,
                kind: HitKind::Active,
                layer: hit.layer,
            })
            .collect();

        let truth = analyzer.compute_layer_truth(&ordered, 1.0);
        assert!(truth.get(HitKind::Active, 1).is_none());
        assert!(truth.get(HitKind::Active, 2).is_some());
    }

    #[test]
    fn test_event_index_rejects_orphans() {
        let mut event = TruthEvent {
            particles: ParticleTable::from_sim(vec![SimParticle::new(
                11,
                -1.0,
                Vector3::new(0.0, 0.0, 1.0),
                Vector3::ZERO,
            )])
            .unwrap(),
            tracker_hits: straight_hits()
                .into_iter()
                .enumerate()
                .map(|(i, mut h)| {
                    h.id = TruthHitId(i);
                    h
                })
                .collect(),
            ..Default::default()
        };
        assert!(EventTruthIndex::build(&event).is_ok());

        event.tracker_hits[1].particle = None;
        let err = EventTruthIndex::build(&event).unwrap_err();
        assert!(matches!(err, TruthError::OrphanTruthHit { hit } if hit == TruthHitId(1)));
        assert!(err.is_data_integrity());

        event.tracker_hits[1].particle = Some(ParticleId(5));
        assert!(matches!(
            EventTruthIndex::build(&event),
            Err(TruthError::UnknownParticle(ParticleId(5)))
        ));
    }

    #[test]
    fn test_event_index_rejects_misplaced_hit_ids() {
        let mut event = TruthEvent {
            particles: ParticleTable::from_sim(vec![SimParticle::new(
                11,
                -1.0,
                Vector3::new(0.0, 0.0, 1.0),
                Vector3::ZERO,
            )])
            .unwrap(),
            tracker_hits: straight_hits()
                .into_iter()
                .enumerate()
                .map(|(i, mut h)| {
                    h.id = TruthHitId(i);
                    h
                })
                .collect(),
            ..Default::default()
        };
        event.tracker_hits.swap(0, 2);

        let err = EventTruthIndex::build(&event).unwrap_err();
        assert!(matches!(
            err,
            TruthError::TruthHitIndexMismatch { hit, index: 0 } if hit == TruthHitId(2)
        ));
        assert!(err.is_data_integrity());
        assert!(err.to_string().contains("position 0"));
    }

    #[test]
    fn test_missing_collections_are_empty() {
        let event = TruthEvent::default();
        let index = EventTruthIndex::build(&event).unwrap();
        assert!(index.relations().is_empty());
        assert!(index.inactive_hits(ParticleId(0)).is_empty());
        assert!(index.calorimeter_hits(ParticleId(0)).is_empty());
    }
}
