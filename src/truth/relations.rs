//! Bidirectional relation tables between opaque identifiers
//!
//! Built fresh for every event from the persisted relation list, never shared
//! between events. Counterparts are returned in insertion order without
//! duplicates.

use crate::error::TruthError;
use crate::truth::hits::{ReadoutId, TruthHitId};
use crate::TruthResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Cardinality of a relation table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationMode {
    ManyToMany,
    /// Every key has at most one counterpart on either side
    OneToOne,
}

/// A persisted readout → truth hit association. Either side may be missing
/// in the stored list; such entries are skipped when the table is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationPair {
    pub from: Option<ReadoutId>,
    pub to: Option<TruthHitId>,
}

impl RelationPair {
    pub fn new(from: ReadoutId, to: TruthHitId) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }
}

/// Many-to-many (or one-to-one) index from `F` keys to `T` keys and back.
#[derive(Debug, Clone)]
pub struct RelationTable<F, T> {
    mode: RelationMode,
    forward: HashMap<F, Vec<T>>,
    inverse: HashMap<T, Vec<F>>,
}

impl<F, T> RelationTable<F, T>
where
    F: Copy + Eq + Hash + Debug,
    T: Copy + Eq + Hash + Debug,
{
    pub fn new(mode: RelationMode) -> Self {
        Self {
            mode,
            forward: HashMap::new(),
            inverse: HashMap::new(),
        }
    }

    pub fn mode(&self) -> RelationMode {
        self.mode
    }

    /// Register `from ↔ to`. Re-adding an existing pair is a no-op.
    pub fn add(&mut self, from: F, to: T) -> TruthResult<()> {
        let existing_to = self.forward.get(&from).map(|v| v.as_slice()).unwrap_or(&[]);
        if existing_to.contains(&to) {
            return Ok(());
        }

        if self.mode == RelationMode::OneToOne {
            if !existing_to.is_empty() {
                return Err(TruthError::RelationCardinality {
                    key: format!("{:?}", from),
                });
            }
            if self.inverse.get(&to).is_some_and(|v| !v.is_empty()) {
                return Err(TruthError::RelationCardinality {
                    key: format!("{:?}", to),
                });
            }
        }

        self.insert(from, to);
        Ok(())
    }

    /// Record a pair without cardinality checks. Duplicates are ignored.
    fn insert(&mut self, from: F, to: T) {
        let forward = self.forward.entry(from).or_default();
        if forward.contains(&to) {
            return;
        }
        forward.push(to);
        self.inverse.entry(to).or_default().push(from);
    }

    /// All `T` related to `from` (possibly empty)
    pub fn all_from(&self, from: &F) -> &[T] {
        self.forward.get(from).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// All `F` related to `to` (possibly empty)
    pub fn all_to(&self, to: &T) -> &[F] {
        self.inverse.get(to).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// The single counterpart of `from`, if any
    pub fn from_one(&self, from: &F) -> Option<T> {
        self.all_from(from).first().copied()
    }

    pub fn len(&self) -> usize {
        self.forward.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// Readout → truth hit relations of one event
pub type ReadoutTruthTable = RelationTable<ReadoutId, TruthHitId>;

impl ReadoutTruthTable {
    /// Build the many-to-many readout table from a persisted relation list,
    /// skipping entries with a missing side.
    pub fn from_pairs(pairs: &[RelationPair]) -> Self {
        let mut table = Self::new(RelationMode::ManyToMany);
        let mut skipped = 0usize;

        for pair in pairs {
            match (pair.from, pair.to) {
                (Some(from), Some(to)) => table.insert(from, to),
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            log::debug!("Skipped {} incomplete readout relations", skipped);
        }
        table
    }
}
