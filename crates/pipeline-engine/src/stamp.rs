//! Synchronization stamps
//!
//! Every datum travelling along an edge carries a [`Stamp`]. Stamps derived
//! from the same lineage (one source stream) are totally ordered; stamps from
//! unrelated lineages are incomparable. A process with several inputs compares
//! the stamps it receives to detect that two branches have drifted apart.

use std::cmp::Ordering;

use uuid::Uuid;

/// Result of comparing two stamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StampOrdering {
    Less,
    Equal,
    Greater,
    /// The stamps come from independent lineages
    Incomparable,
}

impl From<Ordering> for StampOrdering {
    fn from(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Less => Self::Less,
            Ordering::Equal => Self::Equal,
            Ordering::Greater => Self::Greater,
        }
    }
}

/// A comparable synchronization token attached to every edge datum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stamp {
    lineage: Uuid,
    index: u64,
}

impl Stamp {
    /// Start a fresh lineage
    pub fn new() -> Self {
        Self {
            lineage: Uuid::new_v4(),
            index: 0,
        }
    }

    /// The next stamp in this lineage (strictly greater than `self`)
    pub fn increment(self) -> Self {
        Self {
            lineage: self.lineage,
            index: self.index + 1,
        }
    }

    /// Compare two stamps, reporting `Incomparable` across lineages
    pub fn compare(&self, other: &Stamp) -> StampOrdering {
        if self.lineage != other.lineage {
            return StampOrdering::Incomparable;
        }
        self.index.cmp(&other.index).into()
    }

    /// Whether both stamps share a lineage
    pub fn is_comparable_with(&self, other: &Stamp) -> bool {
        self.lineage == other.lineage
    }

    /// Position of this stamp within its lineage
    pub fn index(&self) -> u64 {
        self.index
    }
}

impl Default for Stamp {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialOrd for Stamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.compare(other) {
            StampOrdering::Less => Some(Ordering::Less),
            StampOrdering::Equal => Some(Ordering::Equal),
            StampOrdering::Greater => Some(Ordering::Greater),
            StampOrdering::Incomparable => None,
        }
    }
}
