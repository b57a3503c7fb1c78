//! Simulated truth particles
//!
//! Particles live in a per-event arena ([`ParticleTable`]) and refer to one
//! another by [`ParticleId`] index. Each particle has at most one parent; raw
//! simulation records with several parents are rejected when the table is
//! built.

use crate::error::TruthError;
use crate::geometry::Vector3;
use crate::TruthResult;
use serde::{Deserialize, Serialize};

/// Index of a particle in its event's [`ParticleTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticleId(pub usize);

impl std::fmt::Display for ParticleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Production vertex (x, y, z in mm; t in ns)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vertex {
    pub position: Vector3,
    pub time: f64,
}

/// A particle as handed over by the simulation, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParticle {
    pub pdg: i32,
    pub charge: f64,
    pub momentum: Vector3,
    pub vertex: Vertex,
    #[serde(default)]
    pub parents: Vec<ParticleId>,
}

impl SimParticle {
    pub fn new(pdg: i32, charge: f64, momentum: Vector3, origin: Vector3) -> Self {
        Self {
            pdg,
            charge,
            momentum,
            vertex: Vertex {
                position: origin,
                time: 0.0,
            },
            parents: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: ParticleId) -> Self {
        self.parents.push(parent);
        self
    }
}

/// A validated truth particle. Immutable once the table is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleRecord {
    pub id: ParticleId,
    /// PDG particle-type code
    pub pdg: i32,
    /// Charge in units of e
    pub charge: f64,
    /// Momentum at production (GeV/c)
    pub momentum: Vector3,
    pub vertex: Vertex,
    /// Back-reference into the same table
    pub parent: Option<ParticleId>,
}

impl ParticleRecord {
    pub fn is_charged(&self) -> bool {
        self.charge != 0.0
    }

    pub fn is_primary(&self) -> bool {
        self.parent.is_none()
    }

    pub fn energy(&self, mass: f64) -> f64 {
        (self.momentum.dot(&self.momentum) + mass * mass).sqrt()
    }
}

/// Arena of one event's particles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticleTable {
    records: Vec<ParticleRecord>,
}

impl ParticleTable {
    /// Validate raw simulation particles and build the arena.
    ///
    /// Ids are assigned by position in `particles`.
    pub fn from_sim(particles: Vec<SimParticle>) -> TruthResult<Self> {
        let n = particles.len();
        let mut records = Vec::with_capacity(n);

        for (index, sim) in particles.into_iter().enumerate() {
            let id = ParticleId(index);
            let parent = match sim.parents.as_slice() {
                [] => None,
                [parent] => {
                    if parent.0 >= n {
                        return Err(TruthError::UnknownParticle(*parent));
                    }
                    Some(*parent)
                }
                many => {
                    return Err(TruthError::MultipleParents {
                        particle: id,
                        count: many.len(),
                    })
                }
            };

            records.push(ParticleRecord {
                id,
                pdg: sim.pdg,
                charge: sim.charge,
                momentum: sim.momentum,
                vertex: sim.vertex,
                parent,
            });
        }

        Ok(Self { records })
    }

    pub fn get(&self, id: ParticleId) -> TruthResult<&ParticleRecord> {
        self.records
            .get(id.0)
            .ok_or(TruthError::UnknownParticle(id))
    }

    pub fn contains(&self, id: ParticleId) -> bool {
        id.0 < self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParticleRecord> {
        self.records.iter()
    }

    /// Ancestors of `id`, nearest first. Does not include `id` itself.
    pub fn ancestors(&self, id: ParticleId) -> TruthResult<Vec<ParticleId>> {
        let mut chain = Vec::new();
        let mut current = self.get(id)?.parent;

        while let Some(parent) = current {
            // A chain can never be longer than the table without revisiting a particle
            if chain.len() >= self.records.len() {
                return Err(TruthError::ParentCycle { particle: id });
            }
            chain.push(parent);
            current = self.get(parent)?.parent;
        }

        Ok(chain)
    }

    /// The root ancestor of `id` (itself if it has no parent)
    pub fn primary(&self, id: ParticleId) -> TruthResult<ParticleId> {
        Ok(self.ancestors(id)?.last().copied().unwrap_or(id))
    }

    /// Number of parent links between `id` and its root ancestor
    pub fn generation(&self, id: ParticleId) -> TruthResult<usize> {
        Ok(self.ancestors(id)?.len())
    }
}
