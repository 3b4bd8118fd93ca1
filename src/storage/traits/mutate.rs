//! Mutate capability.

use crate::Result;
use crate::models::{GraphEdge, Transaction};
use std::collections::BTreeSet;

/// Edge-level changes applied as one unit: removals first, then insertions.
#[derive(Debug, Clone, Copy)]
pub struct EdgeDelta<'a> {
    /// Edges to add.
    pub inserted: &'a BTreeSet<GraphEdge>,
    /// Edges to delete.
    pub removed: &'a BTreeSet<GraphEdge>,
}

impl<'a> EdgeDelta<'a> {
    /// Builds the delta carried by a transaction.
    #[must_use]
    pub const fn of(transaction: &'a Transaction) -> Self {
        Self {
            inserted: transaction.inserted(),
            removed: transaction.removed(),
        }
    }

    /// Iterates over every edge in the delta.
    pub fn edges(&self) -> impl Iterator<Item = &'a GraphEdge> {
        self.removed.iter().chain(self.inserted.iter())
    }
}

/// Edge-level mutation.
pub trait MutateCapability: Send + Sync {
    /// Applies a delta atomically.
    ///
    /// Concurrent readers observe either the whole delta or none of it. On
    /// error nothing was applied.
    ///
    /// # Errors
    ///
    /// Returns an error if any edge is rejected or the engine is unavailable.
    fn apply(&self, delta: EdgeDelta<'_>) -> Result<()>;
}
