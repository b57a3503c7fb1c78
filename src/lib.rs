//! # Track Truth
//!
//! Truth analysis for a simulated charged-particle tracking detector.
//! Reconstructed tracks are attributed to the simulated particles that
//! produced their hits, and each matched particle is swum backward through
//! the magnetic field between consecutive truth hits to recover per-layer
//! residuals and scattering angles.
//!
//! ## Features
//! - Readout → truth hit relation tables built per event
//! - Vote-based track attribution with purity and per-layer flags
//! - Trajectory-ordered merging of active and passive-material truth hits
//! - Adaptive-step helix swimming through a sampled field map
//! - Calorimeter truth summaries and track hit sharing
//! - **Parallel batch analysis of independent events**
//!
//! ## Architecture
//!
//! ```text
//! TruthEvent → EventTruthIndex → TrackTruthMatcher → HitOrderer → Extrapolator
//!                    │                  │                              │
//!          relations, hit maps    AttributionResult            LayerTruthRecord
//!                                       └────────── TrackTruth ────────┘
//! ```

// Core modules
pub mod error;
pub mod field;
pub mod geometry;

// Truth analysis
pub mod truth;

// Toy event generation
pub mod synthetic;


// Re-exports from core modules
pub use error::TruthError;
pub use field::{FieldMap, UniformField};
pub use geometry::{slope_deltas, Vector3};

// Re-exports from truth analysis
pub use truth::{
    AttributionResult, DetectorTruthAnalyzer, EventTruth, EventTruthIndex, HitKind, HitOrderer,
    LayerTruth, LayerTruthRecord, ParticleId, ParticleTable, ReadoutTruthTable,
    ReconstructedTrack, SensorGeometry, SwimResult, TrackTruth, TrackTruthMatcher,
    TrajectoryExtrapolator, TruthConfig, TruthEvent, TruthStage,
};
pub use synthetic::{EventGenerator, GeneratorConfig};

/// Result type for truth operations
pub type TruthResult<T> = Result<T, TruthError>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        // Geometry and field
        FieldMap,
        UniformField,
        Vector3,

        // Truth analysis
        AttributionResult,
        DetectorTruthAnalyzer,
        EventTruth,
        EventTruthIndex,
        LayerTruth,
        TrackTruth,
        TrackTruthMatcher,
        TrajectoryExtrapolator,
        TruthConfig,
        TruthEvent,

        // Result type
        TruthResult,
        TruthError,
    };
}
