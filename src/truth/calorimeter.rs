//! Calorimeter truth
//!
//! A calorimeter cell can collect energy from several particles; each
//! contribution names its particle. Summaries report, for one particle, the
//! cells it reached and how much of each cell's energy it deposited.

use crate::error::TruthError;
use crate::geometry::Vector3;
use crate::truth::particles::ParticleId;
use crate::TruthResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Crystal index in the calorimeter grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellIndex {
    pub ix: i32,
    pub iy: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalorimeterContribution {
    /// `None` only in corrupted input
    pub particle: Option<ParticleId>,
    /// Deposited energy (GeV)
    pub energy: f64,
}

/// Simulated calorimeter hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalorimeterHit {
    pub id: u64,
    pub cell: CellIndex,
    pub position: Vector3,
    /// Sampling-corrected energy of the whole cell (GeV)
    pub corrected_energy: f64,
    pub contributions: Vec<CalorimeterContribution>,
}

impl CalorimeterHit {
    /// Energy deposited by `particle` in this cell
    pub fn contributed_energy(&self, particle: ParticleId) -> f64 {
        self.contributions
            .iter()
            .filter(|c| c.particle == Some(particle))
            .map(|c| c.energy)
            .sum()
    }

    /// Fraction of the cell's raw deposit coming from `particle`
    pub fn energy_fraction(&self, particle: ParticleId) -> f64 {
        let total: f64 = self.contributions.iter().map(|c| c.energy).sum();
        if total > 0.0 {
            self.contributed_energy(particle) / total
        } else {
            0.0
        }
    }
}

/// Map each particle to the calorimeter hits it contributed to, each hit listed
/// once per particle in input order.
pub fn hits_by_particle(
    hits: &[CalorimeterHit],
) -> TruthResult<HashMap<ParticleId, Vec<&CalorimeterHit>>> {
    let mut map: HashMap<ParticleId, Vec<&CalorimeterHit>> = HashMap::new();

    for hit in hits {
        for contribution in &hit.contributions {
            let particle = contribution
                .particle
                .ok_or(TruthError::OrphanCalorimeterHit { hit: hit.id })?;
            let list = map.entry(particle).or_default();
            if !list.iter().any(|h| h.id == hit.id) {
                list.push(hit);
            }
        }
    }

    Ok(map)
}

/// One calorimeter hit as seen from a single particle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalorimeterHitTruth {
    pub hit: u64,
    pub cell: CellIndex,
    pub position: Vector3,
    /// Corrected energy of the whole cell
    pub energy: f64,
    /// The particle's own deposit in the cell
    pub contributed_energy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalorimeterTruth {
    pub particle: ParticleId,
    pub hits: Vec<CalorimeterHitTruth>,
}

impl CalorimeterTruth {
    pub fn summarize(particle: ParticleId, hits: &[&CalorimeterHit]) -> Self {
        let hits = hits
            .iter()
            .map(|hit| CalorimeterHitTruth {
                hit: hit.id,
                cell: hit.cell,
                position: hit.position,
                energy: hit.corrected_energy,
                contributed_energy: hit.contributed_energy(particle),
            })
            .collect();
        Self { particle, hits }
    }

    pub fn n_hits(&self) -> usize {
        self.hits.len()
    }

    /// Summed corrected energy of every cell the particle reached
    pub fn total_energy(&self) -> f64 {
        self.hits.iter().map(|h| h.energy).sum()
    }

    /// Summed energy deposited by the particle itself
    pub fn contributed_energy(&self) -> f64 {
        self.hits.iter().map(|h| h.contributed_energy).sum()
    }

    /// Energy-weighted mean position of the particle's deposits
    pub fn centroid(&self) -> Option<Vector3> {
        let weight = self.contributed_energy();
        if weight <= 0.0 {
            return None;
        }
        let sum = self
            .hits
            .iter()
            .fold(Vector3::ZERO, |acc, h| acc + h.position * h.contributed_energy);
        Some(sum * (1.0 / weight))
    }
}
