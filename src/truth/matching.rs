//! Track → truth particle attribution
//!
//! Every composite hit on a track carries two votes, one per underlying
//! one-dimensional measurement. A particle earns a vote for each distinct
//! readout layer at which one of its truth hits fed a readout on the track.
//! The particle with the most votes is the match.
//!
//! ```text
//!   composite hit ──► readouts ──► truth hits ──► owning particles
//!        │                │
//!        │                └─ layer: (particle, layer) counts once per track
//!        └─ at most VOTES_PER_COMPOSITE_HIT votes per particle
//! ```
//!
//! Ties between equally voted particles go to the particle seen first while
//! walking the track's hits in order.

use crate::error::TruthError;
use crate::truth::hits::{ReconstructedTrack, TrackId, TruthHit, TruthHitId};
use crate::truth::particles::ParticleId;
use crate::truth::relations::ReadoutTruthTable;
use crate::TruthResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Votes carried by each composite hit (its two strip measurements)
pub const VOTES_PER_COMPOSITE_HIT: usize = 2;

// ═══════════════════════════════════════════════════════════════════════════════
// ATTRIBUTION RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of matching one track against the truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionResult {
    pub track: TrackId,
    /// Best-matching particle; `None` when no hit resolves to any particle
    pub matched: Option<ParticleId>,
    /// `VOTES_PER_COMPOSITE_HIT × composite hits`
    pub total_hits: usize,
    /// Votes won by the matched particle
    pub matched_hits: usize,
    /// `total_hits - matched_hits`
    pub bad_hits: usize,
    /// `matched_hits / total_hits`, in [0, 1]
    pub purity: f64,
    /// Track lies in the top detector half
    pub is_top: bool,
    /// Per readout layer: does the matched particle contribute to the track there
    pub layer_hits: BTreeMap<u32, bool>,
    /// Per readout layer: every particle contributing to the track's readouts
    pub layer_particles: BTreeMap<u32, BTreeSet<ParticleId>>,
    /// Vote totals of every contributing particle, in first-seen order
    pub candidates: Vec<(ParticleId, usize)>,
    /// Truth hits of the matched particle not read out by any hit on the track.
    /// Filled in by the analyzer, which knows the particle's full hit list.
    #[serde(default)]
    pub unmatched_truth_hits: Vec<TruthHitId>,
}

impl AttributionResult {
    fn unmatched(track: TrackId, total_hits: usize, is_top: bool) -> Self {
        Self {
            track,
            matched: None,
            total_hits,
            matched_hits: 0,
            bad_hits: total_hits,
            purity: 0.0,
            is_top,
            layer_hits: BTreeMap::new(),
            layer_particles: BTreeMap::new(),
            candidates: Vec::new(),
            unmatched_truth_hits: Vec::new(),
        }
    }

    pub fn is_matched(&self) -> bool {
        self.matched.is_some()
    }

    /// Whether the matched particle contributes at `layer`; `None` if the
    /// track has no readout on that layer.
    pub fn hit_on_layer(&self, layer: u32) -> Option<bool> {
        self.layer_hits.get(&layer).copied()
    }

    /// Number of distinct particles contributing at `layer`
    pub fn particle_count(&self, layer: u32) -> usize {
        self.layer_particles.get(&layer).map_or(0, BTreeSet::len)
    }

    pub fn particles_on_layer(&self, layer: u32) -> Option<&BTreeSet<ParticleId>> {
        self.layer_particles.get(&layer)
    }

    /// Votes won by `particle`
    pub fn votes_for(&self, particle: ParticleId) -> usize {
        self.candidates
            .iter()
            .find(|(p, _)| *p == particle)
            .map_or(0, |(_, votes)| *votes)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MATCHER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct ParticleTally {
    particle: ParticleId,
    layers: BTreeSet<u32>,
    votes: usize,
}

/// Attributes tracks to truth particles through the readout relations
#[derive(Debug, Clone, Copy)]
pub struct TrackTruthMatcher<'a> {
    relations: &'a ReadoutTruthTable,
    truth_hits: &'a [TruthHit],
}

impl<'a> TrackTruthMatcher<'a> {
    /// `truth_hits` must be indexable by the [`TruthHitId`]s in `relations`
    pub fn new(relations: &'a ReadoutTruthTable, truth_hits: &'a [TruthHit]) -> Self {
        Self {
            relations,
            truth_hits,
        }
    }

    fn truth_hit(&self, id: TruthHitId) -> TruthResult<&'a TruthHit> {
        self.truth_hits
            .get(id.0)
            .ok_or(TruthError::UnknownTruthHit(id))
    }

    /// Truth hits related to any readout on `track`
    pub fn related_truth_hits(&self, track: &ReconstructedTrack) -> BTreeSet<TruthHitId> {
        track
            .hits
            .iter()
            .flat_map(|hit| hit.readouts.iter())
            .flat_map(|readout| self.relations.all_from(&readout.id).iter().copied())
            .collect()
    }

    /// Attribute `track` to the particle with the most votes.
    ///
    /// Fails only on corrupted truth: a related truth hit that does not exist
    /// or has no owning particle.
    pub fn match_track(&self, track: &ReconstructedTrack) -> TruthResult<AttributionResult> {
        let total_hits = VOTES_PER_COMPOSITE_HIT * track.hits.len();

        let mut tallies: Vec<ParticleTally> = Vec::new();
        let mut slots: HashMap<ParticleId, usize> = HashMap::new();
        let mut layer_particles: BTreeMap<u32, BTreeSet<ParticleId>> = BTreeMap::new();

        for hit in &track.hits {
            let mut hit_votes: HashMap<ParticleId, usize> = HashMap::new();

            for readout in &hit.readouts {
                let on_layer = layer_particles.entry(readout.layer).or_default();

                for &truth_id in self.relations.all_from(&readout.id) {
                    let particle = self
                        .truth_hit(truth_id)?
                        .particle
                        .ok_or(TruthError::OrphanTruthHit { hit: truth_id })?;
                    on_layer.insert(particle);

                    let slot = *slots.entry(particle).or_insert_with(|| {
                        tallies.push(ParticleTally {
                            particle,
                            layers: BTreeSet::new(),
                            votes: 0,
                        });
                        tallies.len() - 1
                    });
                    let tally = &mut tallies[slot];

                    // several readouts at one layer still count once
                    if tally.layers.insert(readout.layer) {
                        let used = hit_votes.entry(particle).or_insert(0);
                        if *used < VOTES_PER_COMPOSITE_HIT {
                            *used += 1;
                            tally.votes += 1;
                        }
                    }
                }
            }
        }

        let mut best: Option<&ParticleTally> = None;
        for tally in &tallies {
            if tally.votes > best.map_or(0, |b| b.votes) {
                best = Some(tally);
            }
        }

        let Some(best) = best else {
            let mut result = AttributionResult::unmatched(track.id, total_hits, track.is_top());
            result.layer_particles = layer_particles;
            result.layer_hits = result
                .layer_particles
                .keys()
                .map(|&layer| (layer, false))
                .collect();
            return Ok(result);
        };

        let matched_hits = best.votes;
        let purity = if total_hits > 0 {
            matched_hits as f64 / total_hits as f64
        } else {
            0.0
        };
        let layer_hits = layer_particles
            .iter()
            .map(|(&layer, particles)| (layer, particles.contains(&best.particle)))
            .collect();

        Ok(AttributionResult {
            track: track.id,
            matched: Some(best.particle),
            total_hits,
            matched_hits,
            bad_hits: total_hits - matched_hits,
            purity,
            is_top: track.is_top(),
            layer_hits,
            layer_particles,
            candidates: tallies.iter().map(|t| (t.particle, t.votes)).collect(),
            unmatched_truth_hits: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vector3;
    use crate::truth::hits::{CompositeHit, CompositeHitId, RawReadout, ReadoutId, TrackParameters};
    use crate::truth::relations::RelationPair;
    use approx::assert_relative_eq;

    /// One active truth hit per (particle, layer); readouts numbered by layer.
    struct Fixture {
        truth_hits: Vec<TruthHit>,
        pairs: Vec<RelationPair>,
        next_readout: u64,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                truth_hits: Vec::new(),
                pairs: Vec::new(),
                next_readout: 0,
            }
        }

        fn truth(&mut self, particle: usize, layer: u32) -> TruthHitId {
            let id = TruthHitId(self.truth_hits.len());
            self.truth_hits.push(TruthHit::active(
                id,
                ParticleId(particle),
                layer,
                Vector3::new(0.0, 0.0, layer as f64 * 100.0),
                Vector3::new(0.0, 0.0, 1.0),
            ));
            id
        }

        /// Readout at `layer` fed by the given particles
        fn readout(&mut self, layer: u32, particles: &[usize]) -> RawReadout {
            let id = ReadoutId(self.next_readout);
            self.next_readout += 1;
            for &p in particles {
                let truth = self.truth(p, layer);
                self.pairs.push(RelationPair::new(id, truth));
            }
            RawReadout {
                id,
                channel: id.0,
                layer,
            }
        }

        /// Stereo composite hit on `module` (layers 2m-1, 2m)
        fn composite(&mut self, module: u32, particles: &[usize]) -> CompositeHit {
            let axial = self.readout(2 * module - 1, particles);
            let stereo = self.readout(2 * module, particles);
            CompositeHit {
                id: CompositeHitId(module as u64),
                position: Vector3::ZERO,
                readouts: vec![axial, stereo],
            }
        }
    }

    fn track(hits: Vec<CompositeHit>) -> ReconstructedTrack {
        ReconstructedTrack {
            id: TrackId(0),
            hits,
            parameters: TrackParameters {
                tan_lambda: -0.01,
                ..TrackParameters::default()
            },
            charge: -1,
        }
    }

    #[test]
    fn test_pure_track() {
        let mut f = Fixture::new();
        let hits = (1..=6).map(|m| f.composite(m, &[0])).collect();
        let trk = track(hits);
        let table = ReadoutTruthTable::from_pairs(&f.pairs);
        let result = TrackTruthMatcher::new(&table, &f.truth_hits)
            .match_track(&trk)
            .unwrap();

        assert_eq!(result.matched, Some(ParticleId(0)));
        assert_eq!(result.total_hits, 12);
        assert_eq!(result.matched_hits, 12);
        assert_eq!(result.bad_hits, 0);
        assert_relative_eq!(result.purity, 1.0);
        assert!(!result.is_top);
        assert!(result.layer_hits.values().all(|&h| h));
    }

    #[test]
    fn test_one_foreign_hit() {
        let mut f = Fixture::new();
        let mut hits: Vec<CompositeHit> = (1..=5).map(|m| f.composite(m, &[0])).collect();
        hits.push(f.composite(6, &[1]));
        let trk = track(hits);
        let table = ReadoutTruthTable::from_pairs(&f.pairs);
        let result = TrackTruthMatcher::new(&table, &f.truth_hits)
            .match_track(&trk)
            .unwrap();

        assert_eq!(result.matched, Some(ParticleId(0)));
        assert_eq!(result.matched_hits, 10);
        assert_eq!(result.bad_hits, 2);
        assert_relative_eq!(result.purity, 10.0 / 12.0, epsilon = 1e-12);
        assert_eq!(result.hit_on_layer(11), Some(false));
        assert_eq!(result.hit_on_layer(1), Some(true));
        assert_eq!(result.hit_on_layer(13), None);
        assert_eq!(result.votes_for(ParticleId(1)), 2);
    }

    #[test]
    fn test_repeated_layer_counts_once() {
        let mut f = Fixture::new();
        // two readouts on the same layer, both fed by particle 0
        let a = f.readout(1, &[0]);
        let b = f.readout(1, &[0]);
        let hit = CompositeHit {
            id: CompositeHitId(1),
            position: Vector3::ZERO,
            readouts: vec![a, b],
        };
        let trk = track(vec![hit]);
        let table = ReadoutTruthTable::from_pairs(&f.pairs);
        let result = TrackTruthMatcher::new(&table, &f.truth_hits)
            .match_track(&trk)
            .unwrap();

        assert_eq!(result.total_hits, 2);
        assert_eq!(result.matched_hits, 1);
        assert_relative_eq!(result.purity, 0.5);
    }

    #[test]
    fn test_mixed_readouts_count_contributors() {
        let mut f = Fixture::new();
        let hits = vec![f.composite(1, &[0, 1]), f.composite(2, &[0])];
        let trk = track(hits);
        let table = ReadoutTruthTable::from_pairs(&f.pairs);
        let result = TrackTruthMatcher::new(&table, &f.truth_hits)
            .match_track(&trk)
            .unwrap();

        assert_eq!(result.matched, Some(ParticleId(0)));
        assert_eq!(result.particle_count(1), 2);
        assert_eq!(result.particle_count(3), 1);
        assert_eq!(result.particle_count(9), 0);
        assert_eq!(result.matched_hits, 4);
    }

    #[test]
    fn test_no_relations_means_no_match() {
        let mut f = Fixture::new();
        let hits = vec![f.composite(1, &[]), f.composite(2, &[])];
        let trk = track(hits);
        let table = ReadoutTruthTable::from_pairs(&f.pairs);
        let result = TrackTruthMatcher::new(&table, &f.truth_hits)
            .match_track(&trk)
            .unwrap();

        assert!(!result.is_matched());
        assert_eq!(result.purity, 0.0);
        assert_eq!(result.bad_hits, 4);
        assert_eq!(result.hit_on_layer(1), Some(false));
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        let mut f = Fixture::new();
        let hits = vec![f.composite(1, &[1]), f.composite(2, &[0])];
        let trk = track(hits);
        let table = ReadoutTruthTable::from_pairs(&f.pairs);
        let result = TrackTruthMatcher::new(&table, &f.truth_hits)
            .match_track(&trk)
            .unwrap();

        assert_eq!(result.matched, Some(ParticleId(1)));
        assert_eq!(result.matched_hits, 2);
    }

    #[test]
    fn test_orphan_truth_hit_is_fatal() {
        let mut f = Fixture::new();
        let hit = f.composite(1, &[0]);
        f.truth_hits[0].particle = None;
        let trk = track(vec![hit]);
        let table = ReadoutTruthTable::from_pairs(&f.pairs);
        let err = TrackTruthMatcher::new(&table, &f.truth_hits)
            .match_track(&trk)
            .unwrap_err();
        assert!(matches!(err, TruthError::OrphanTruthHit { hit: TruthHitId(0) }));
    }

    #[test]
    fn test_dangling_relation_is_fatal() {
        let f = Fixture::new();
        let pairs = vec![RelationPair::new(ReadoutId(0), TruthHitId(42))];
        let table = ReadoutTruthTable::from_pairs(&pairs);
        let trk = track(vec![CompositeHit {
            id: CompositeHitId(0),
            position: Vector3::ZERO,
            readouts: vec![RawReadout {
                id: ReadoutId(0),
                channel: 0,
                layer: 1,
            }],
        }]);
        let err = TrackTruthMatcher::new(&table, &f.truth_hits)
            .match_track(&trk)
            .unwrap_err();
        assert!(matches!(err, TruthError::UnknownTruthHit(TruthHitId(42))));
    }
}
