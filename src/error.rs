//! Error types for truth analysis

use crate::truth::hits::TruthHitId;
use crate::truth::particles::ParticleId;
use thiserror::Error;

/// Failures that abort analysis of the current track or event.
///
/// Conditions that only make a single layer or extrapolation unavailable are
/// reported as `None` by the relevant operation, not through this type.
#[derive(Error, Debug)]
pub enum TruthError {
    #[error("Tracker truth hit {hit} has no owning particle")]
    OrphanTruthHit { hit: TruthHitId },

    #[error("Calorimeter hit {hit} has a contribution with no owning particle")]
    OrphanCalorimeterHit { hit: u64 },

    #[error("Particle {particle} has {count} parents, expected at most one")]
    MultipleParents { particle: ParticleId, count: usize },

    #[error("Parent chain of particle {particle} does not terminate")]
    ParentCycle { particle: ParticleId },

    #[error("Unknown particle id: {0}")]
    UnknownParticle(ParticleId),

    #[error("Unknown truth hit id: {0}")]
    UnknownTruthHit(TruthHitId),

    #[error("Tracker truth hit {hit} stored at position {index}, ids must match positions")]
    TruthHitIndexMismatch { hit: TruthHitId, index: usize },

    #[error("One-to-one relation violated for key {key}")]
    RelationCardinality { key: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TruthError {
    /// Whether the error indicates corrupted upstream simulation data
    /// rather than a caller mistake.
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            TruthError::OrphanTruthHit { .. }
                | TruthError::OrphanCalorimeterHit { .. }
                | TruthError::MultipleParents { .. }
                | TruthError::ParentCycle { .. }
                | TruthError::UnknownParticle(_)
                | TruthError::UnknownTruthHit(_)
                | TruthError::TruthHitIndexMismatch { .. }
        )
    }
}
