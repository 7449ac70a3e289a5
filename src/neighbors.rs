//! `Neighbors` — one node's immutable edge snapshot.

use crate::node_array::NodeArray;
use crate::types::NodeId;

/// A node's immutable neighbor-list snapshot, as published into a
/// [`crate::concurrent_neighbor_map::ConcurrentNeighborMap`] slot.
///
/// Every mutation produces a brand-new `Neighbors`; CAS identity is
/// checked by `Arc` pointer equality (see
/// `concurrent_neighbor_map::cas_update`), not by comparing contents —
/// a transform that logically leaves the snapshot unchanged must return
/// the very same `Arc` it was given, which `Neighbors` itself can't
/// enforce (that discipline lives in the transform functions).
#[derive(Debug, Clone)]
pub struct Neighbors {
    /// The node this edge list belongs to.
    pub owner: NodeId,
    /// The sorted edge set itself.
    pub array: NodeArray,
    /// Length of the prefix already verified diverse under the current
    /// alpha; lets a subsequent prune skip re-checking it.
    pub diverse_before: usize,
    /// Fraction of diverse neighbors selected at alpha = 1.0, recorded on
    /// the first insert-and-prune for this node (quality diagnostic).
    pub short_edges: f32,
}

impl Neighbors {
    /// An empty neighbor list for a freshly-added node, pre-sized to
    /// `max_overflow_degree + 1` so the first insertions during CAS
    /// attempts never reallocate mid-transform.
    pub fn empty(owner: NodeId, max_overflow_degree: usize) -> Self {
        Neighbors {
            owner,
            array: NodeArray::for_max_overflow_degree(max_overflow_degree),
            diverse_before: 0,
            short_edges: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.array.contains(id)
    }

    pub fn ids(&self) -> &[NodeId] {
        self.array.ids()
    }

    /// Debug/test assertion: no self-loop, no duplicate ids, sorted
    /// descending.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        assert!(!self.array.ids().contains(&self.owner), "self-loop on {}", self.owner);
        assert!(self.array.is_sorted_descending(), "neighbors not sorted descending");
        let mut seen = std::collections::HashSet::new();
        for &id in self.array.ids() {
            assert!(seen.insert(id), "duplicate neighbor {id}");
        }
    }
}
