//! Seeded toy events
//!
//! Builds self-consistent [`TruthEvent`]s: a neutral parent converts into
//! charged daughters, which are swum through a uniform dipole field across a
//! six-module stereo tracker and into a calorimeter. Every module has an
//! axial sensor, a passive half-module volume and a stereo sensor:
//!
//! ```text
//!   depth:   d          d+2            d+4
//!            │           ▒              │
//!         axial L2m-1  passive       stereo L2m
//!            └───────── composite hit m ┘
//! ```
//!
//! Truth hits record the momentum arriving at the layer; an optional kink is
//! applied afterwards to mimic multiple scattering.

use crate::field::UniformField;
use crate::geometry::Vector3;
use crate::truth::{
    CalorimeterContribution, CalorimeterHit, CellIndex, CompositeHit, CompositeHitId,
    ExtrapolationConfig, ParticleTable, RawReadout, ReadoutId, ReconstructedTrack, RelationPair,
    Sensor, SensorGeometry, SimParticle, TrackId, TrackParameters, TrajectoryExtrapolator,
    TruthEvent, TruthHit, TruthHitId, FIELD_CONVERSION,
};
use crate::truth::ParticleId;
use crate::TruthResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Offset of the passive volume behind each module's axial sensor (mm)
pub const PASSIVE_OFFSET: f64 = 2.0;
/// Offset of the stereo sensor behind the axial sensor (mm)
pub const STEREO_OFFSET: f64 = 4.0;

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Charged daughters per event
    pub n_particles: usize,
    /// Dipole field along detector y (Tesla)
    pub field_strength: f64,
    /// Depth of each module's axial sensor (mm)
    pub module_depths: Vec<f64>,
    /// Momentum magnitude range (GeV/c)
    pub momentum_range: (f64, f64),
    /// Largest initial |x/z| and |y/z|
    pub max_slope: f64,
    /// Half-width of the uniform slope kink applied after each hit
    pub scattering: f64,
    /// Probability that a track picks up another particle's hit on a module
    pub contamination: f64,
    /// Emit passive-material truth hits
    pub inactive_hits: bool,
    pub calorimeter_depth: f64,
    /// Calorimeter crystal pitch (mm)
    pub cell_size: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            n_particles: 4,
            field_strength: -0.5,
            module_depths: vec![100.0, 200.0, 300.0, 500.0, 700.0, 900.0],
            momentum_range: (0.5, 2.5),
            max_slope: 0.04,
            scattering: 0.0,
            contamination: 0.0,
            inactive_hits: true,
            calorimeter_depth: 1400.0,
            cell_size: 15.0,
        }
    }
}

impl GeneratorConfig {
    pub fn n_modules(&self) -> usize {
        self.module_depths.len()
    }

    /// Sensors of the generated tracker
    pub fn geometry(&self) -> SensorGeometry {
        let sensors = (1..=self.n_modules() as u32)
            .flat_map(|m| {
                [
                    Sensor {
                        name: format!("{}_sensor0", passive_volume(m)),
                        layer: 2 * m - 1,
                    },
                    Sensor {
                        name: format!("module_L{}_halfmodule_stereo_sensor0", m),
                        layer: 2 * m,
                    },
                ]
            })
            .collect();
        SensorGeometry::new(sensors)
    }
}

fn passive_volume(module: u32) -> String {
    format!("module_L{}_halfmodule_axial", module)
}

// ═══════════════════════════════════════════════════════════════════════════════
// GENERATOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-particle composite hits, keyed by module
type ModuleHits = BTreeMap<u32, CompositeHit>;

#[derive(Debug)]
pub struct EventGenerator {
    config: GeneratorConfig,
    rng: StdRng,
    field: UniformField,
    extrapolator: TrajectoryExtrapolator,
}

impl EventGenerator {
    pub fn new(config: GeneratorConfig, seed: u64) -> Self {
        Self {
            field: UniformField::dipole(config.field_strength),
            config,
            rng: StdRng::seed_from_u64(seed),
            extrapolator: TrajectoryExtrapolator::new(ExtrapolationConfig::default()),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn field(&self) -> UniformField {
        self.field
    }

    pub fn geometry(&self) -> SensorGeometry {
        self.config.geometry()
    }

    /// Generate `n` consecutive events
    pub fn generate_batch(&mut self, n: usize) -> TruthResult<Vec<TruthEvent>> {
        (0..n as u64).map(|number| self.generate(number)).collect()
    }

    pub fn generate(&mut self, number: u64) -> TruthResult<TruthEvent> {
        let sim = self.sample_particles();
        let particles = ParticleTable::from_sim(sim.clone())?;

        let mut event = TruthEvent {
            number,
            tracker_hits: Vec::new(),
            inactive_hits: self.config.inactive_hits.then(Vec::new),
            calorimeter_hits: None,
            relations: Some(Vec::new()),
            tracks: Vec::new(),
            particles,
        };

        let mut next_readout = 0u64;
        let mut next_composite = 0u64;
        let mut per_particle: Vec<(ParticleId, &SimParticle, ModuleHits)> = Vec::new();
        let mut deposits: BTreeMap<(i32, i32), Vec<(ParticleId, f64, Vector3)>> = BTreeMap::new();

        for (index, particle) in sim.iter().enumerate() {
            if particle.charge == 0.0 {
                continue;
            }
            let id = ParticleId(index);
            let (modules, exit) = self.traverse(
                id,
                particle,
                &mut event,
                &mut next_readout,
                &mut next_composite,
            );
            if let Some((position, momentum)) = exit {
                self.deposit(id, position, momentum, &mut deposits);
            }
            per_particle.push((id, particle, modules));
        }

        event.tracks = self.build_tracks(&per_particle);
        event.calorimeter_hits = Some(calorimeter_hits(deposits));

        log::debug!(
            "Generated event {}: {} particles, {} tracker hits, {} tracks",
            number,
            event.particles.len(),
            event.tracker_hits.len(),
            event.tracks.len()
        );
        Ok(event)
    }

    /// A neutral parent followed by its charged daughters
    fn sample_particles(&mut self) -> Vec<SimParticle> {
        let mut daughters = Vec::with_capacity(self.config.n_particles);
        for i in 0..self.config.n_particles {
            let (lo, hi) = self.config.momentum_range;
            let max_slope = self.config.max_slope;
            let p = self.uniform(lo, hi);
            let sx = self.uniform(-max_slope, max_slope);
            let half = if i % 2 == 0 { 1.0 } else { -1.0 };
            let sy = half * self.uniform(0.2 * max_slope, max_slope);
            let direction = Vector3::new(sx, sy, 1.0);
            let momentum = direction * (p / direction.magnitude());
            let (pdg, charge) = if self.rng.gen_bool(0.5) {
                (11, -1.0)
            } else {
                (-11, 1.0)
            };
            daughters.push(
                SimParticle::new(pdg, charge, momentum, Vector3::ZERO).with_parent(ParticleId(0)),
            );
        }

        let total = daughters
            .iter()
            .fold(Vector3::ZERO, |acc, d| acc + d.momentum);
        let mut particles = vec![SimParticle::new(22, 0.0, total, Vector3::ZERO)];
        particles.extend(daughters);
        particles
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        if hi > lo {
            self.rng.gen_range(lo..hi)
        } else {
            lo
        }
    }

    fn kink(&mut self, momentum: Vector3) -> Vector3 {
        let width = self.config.scattering;
        if width <= 0.0 || momentum.z == 0.0 {
            return momentum;
        }
        let direction = Vector3::new(
            momentum.slope_x() + self.uniform(-width, width),
            momentum.slope_y() + self.uniform(-width, width),
            1.0,
        );
        direction * (momentum.magnitude() / direction.magnitude())
    }

    /// Swim one particle through every module, recording truth hits,
    /// readouts and relations. Returns its composite hits and, if it made it
    /// through the tracker, its state at the calorimeter face.
    fn traverse(
        &mut self,
        id: ParticleId,
        particle: &SimParticle,
        event: &mut TruthEvent,
        next_readout: &mut u64,
        next_composite: &mut u64,
    ) -> (ModuleHits, Option<(Vector3, Vector3)>) {
        let mut modules = ModuleHits::new();
        let mut position = particle.vertex.position;
        let mut momentum = particle.momentum;
        let depths = self.config.module_depths.clone();

        for (m, &depth) in depths.iter().enumerate() {
            let module = m as u32 + 1;
            let mut readouts = Vec::with_capacity(2);
            let mut positions = Vec::with_capacity(2);

            for (z, layer) in [
                (depth, Some(2 * module - 1)),
                (depth + PASSIVE_OFFSET, None),
                (depth + STEREO_OFFSET, Some(2 * module)),
            ] {
                let Some(swim) = self.extrapolator.swim(
                    position,
                    momentum,
                    particle.charge,
                    z,
                    &self.field,
                ) else {
                    return (modules, None);
                };
                position = swim.position;
                momentum = swim.momentum;

                match layer {
                    Some(layer) => {
                        let hit_id = TruthHitId(event.tracker_hits.len());
                        event
                            .tracker_hits
                            .push(TruthHit::active(hit_id, id, layer, position, momentum));
                        let readout = RawReadout {
                            id: ReadoutId(*next_readout),
                            channel: (u64::from(layer) << 32) | *next_readout,
                            layer,
                        };
                        *next_readout += 1;
                        if let Some(relations) = event.relations.as_mut() {
                            relations.push(RelationPair::new(readout.id, hit_id));
                        }
                        readouts.push(readout);
                        positions.push(position);
                    }
                    None => {
                        if let Some(inactive) = event.inactive_hits.as_mut() {
                            let hit_id = TruthHitId(inactive.len());
                            inactive.push(TruthHit::inactive(
                                hit_id,
                                id,
                                passive_volume(module),
                                position,
                                momentum,
                            ));
                        }
                    }
                }
                momentum = self.kink(momentum);
            }

            let centre = positions
                .iter()
                .fold(Vector3::ZERO, |acc, &p| acc + p)
                * (1.0 / positions.len() as f64);
            modules.insert(
                module,
                CompositeHit {
                    id: CompositeHitId(*next_composite),
                    position: centre,
                    readouts,
                },
            );
            *next_composite += 1;
        }

        let exit = self
            .extrapolator
            .swim(
                position,
                momentum,
                particle.charge,
                self.config.calorimeter_depth,
                &self.field,
            )
            .map(|s| (s.position, s.momentum));
        (modules, exit)
    }

    /// Shower core plus one neighbouring crystal
    fn deposit(
        &mut self,
        id: ParticleId,
        position: Vector3,
        momentum: Vector3,
        deposits: &mut BTreeMap<(i32, i32), Vec<(ParticleId, f64, Vector3)>>,
    ) {
        let cell = self.config.cell_size;
        let ix = (position.x / cell).floor() as i32;
        let iy = (position.y / cell).floor() as i32;
        let energy = momentum.magnitude();
        let neighbour = if self.rng.gen_bool(0.5) { 1 } else { -1 };

        for (key, fraction) in [((ix, iy), 0.8), ((ix + neighbour, iy), 0.15)] {
            let centre = Vector3::new(
                (key.0 as f64 + 0.5) * cell,
                (key.1 as f64 + 0.5) * cell,
                self.config.calorimeter_depth,
            );
            deposits
                .entry(key)
                .or_default()
                .push((id, fraction * energy, centre));
        }
    }

    fn build_tracks(
        &mut self,
        per_particle: &[(ParticleId, &SimParticle, ModuleHits)],
    ) -> Vec<ReconstructedTrack> {
        let mut tracks = Vec::new();

        for (k, (own, particle, modules)) in per_particle.iter().enumerate() {
            if modules.is_empty() {
                continue;
            }
            let mut hits = Vec::with_capacity(modules.len());
            for (module, own_hit) in modules {
                let mut hit = own_hit;
                if self.rng.gen::<f64>() < self.config.contamination {
                    let others: Vec<&CompositeHit> = per_particle
                        .iter()
                        .filter(|(other, _, _)| other != own)
                        .filter_map(|(_, _, m)| m.get(module))
                        .collect();
                    if !others.is_empty() {
                        hit = others[self.rng.gen_range(0..others.len())];
                    }
                }
                hits.push(hit.clone());
            }

            let p = particle.momentum;
            let pt = (p.x * p.x + p.z * p.z).sqrt();
            tracks.push(ReconstructedTrack {
                id: TrackId(k as u64),
                hits,
                parameters: TrackParameters {
                    d0: 0.0,
                    phi0: p.x.atan2(p.z),
                    omega: particle.charge * self.config.field_strength * FIELD_CONVERSION / pt,
                    z0: 0.0,
                    tan_lambda: p.y / pt,
                },
                charge: particle.charge.signum() as i32,
            });
        }

        tracks
    }
}

fn calorimeter_hits(
    deposits: BTreeMap<(i32, i32), Vec<(ParticleId, f64, Vector3)>>,
) -> Vec<CalorimeterHit> {
    deposits
        .into_iter()
        .enumerate()
        .map(|(id, ((ix, iy), parts))| {
            let raw: f64 = parts.iter().map(|(_, e, _)| e).sum();
            let position = parts
                .first()
                .map(|&(_, _, centre)| centre)
                .unwrap_or(Vector3::ZERO);
            CalorimeterHit {
                id: id as u64,
                cell: CellIndex { ix, iy },
                position,
                corrected_energy: raw * 1.05,
                contributions: parts
                    .into_iter()
                    .map(|(particle, energy, _)| CalorimeterContribution {
                        particle: Some(particle),
                        energy,
                    })
                    .collect(),
            }
        })
        .collect()
}
