//! `ConcurrentNeighborMap` — one layer's adjacency relation: a dense
//! NodeId → immutable [`Neighbors`] snapshot mapping, mutated through a
//! lock-free CAS loop, with the Robust Prune diversity rule as its
//! central piece of business logic.

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::dense_int_map::DenseIntMap;
use crate::error::{VortexError, VortexResult};
use crate::neighbors::Neighbors;
use crate::node_array::NodeArray;
use crate::score::ScoreFunction;
use crate::types::{NodeId, Score};

/// A node → `ScoreFunction` factory used for diversity decisions: given a
/// node id, returns an always-exact score function bound to that node, so
/// the Robust Prune rule can compute `score(c, s)` between arbitrary
/// candidate pairs. Callers typically close over a
/// `BuildScoreProvider::diversity_provider_for`.
pub type DiversityProvider<'a> = &'a (dyn Fn(NodeId) -> VortexResult<Arc<dyn ScoreFunction>> + Sync);

/// Step size the Robust Prune rule advances alpha by on each pass, from
/// 1.0 up to the configured threshold.
const ALPHA_STEP: f32 = 0.2;

pub struct ConcurrentNeighborMap {
    slots: DenseIntMap<Arc<ArcSwapOption<Neighbors>>>,
    max_degree: usize,
    max_overflow_degree: usize,
    alpha: f32,
}

impl ConcurrentNeighborMap {
    pub fn new(max_degree: usize, max_overflow_degree: usize, alpha: f32) -> Self {
        ConcurrentNeighborMap {
            slots: DenseIntMap::new(),
            max_degree,
            max_overflow_degree,
            alpha,
        }
    }

    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Returns a clone of the current `Neighbors` for `node`, or `None` if
    /// it was never added to this layer.
    pub fn get(&self, node: NodeId) -> Option<Arc<Neighbors>> {
        self.slots.get(node).and_then(|cell| cell.load_full())
    }

    fn get_or_create_cell(&self, node: NodeId) -> Arc<ArcSwapOption<Neighbors>> {
        self.slots.ensure_capacity(node, || Arc::new(ArcSwapOption::from(None)));
        self.slots.get(node).expect("slot just ensured")
    }

    fn existing_cell(&self, node: NodeId) -> VortexResult<Arc<ArcSwapOption<Neighbors>>> {
        self.slots.get(node).ok_or(VortexError::NotFound(node))
    }

    /// Installs an empty `Neighbors` snapshot for `node`. Fails with
    /// `DuplicateNode` if the slot is already occupied.
    pub fn add_node(&self, node: NodeId) -> VortexResult<()> {
        let cell = self.get_or_create_cell(node);
        let mut duplicate = false;
        cell.rcu(|old: &Option<Arc<Neighbors>>| -> Option<Arc<Neighbors>> {
            match old {
                Some(existing) => {
                    duplicate = true;
                    Some(existing.clone())
                }
                None => Some(Arc::new(Neighbors::empty(node, self.max_overflow_degree))),
            }
        });
        if duplicate {
            return Err(VortexError::DuplicateNode(node));
        }
        Ok(())
    }

    /// Runs one CAS loop: reads the current snapshot, applies `transform`
    /// to get the candidate replacement, and retries until either the
    /// transform is a no-op (same `Arc` returned) or the publish
    /// succeeds. `transform` may fail (e.g. a scoring call hit a storage
    /// error); on failure the loop aborts and the slot is left
    /// unchanged.
    fn cas_update(
        &self,
        node: NodeId,
        mut transform: impl FnMut(&Neighbors) -> VortexResult<Arc<Neighbors>>,
    ) -> VortexResult<Arc<Neighbors>> {
        let cell = self.existing_cell(node)?;
        let mut error: Option<VortexError> = None;
        let mut published: Option<Arc<Neighbors>> = None;

        cell.rcu(|old: &Option<Arc<Neighbors>>| -> Option<Arc<Neighbors>> {
            match old {
                None => {
                    error = Some(VortexError::NotFound(node));
                    None
                }
                Some(old_arc) => match transform(old_arc) {
                    Ok(next) => {
                        published = Some(next.clone());
                        Some(next)
                    }
                    Err(e) => {
                        error = Some(e);
                        Some(old_arc.clone())
                    }
                },
            }
        });

        if let Some(e) = error {
            return Err(e);
        }
        Ok(published.expect("rcu either set an error or published a result"))
    }

    /// Robust Prune: select at most `m` candidates from `candidates`
    /// (assumed sorted descending by score-to-`target`) such that no
    /// selected candidate `c` has an already-selected `s` with
    /// `score(c, s) > score(c, target) * alpha`, for the smallest alpha
    /// in `{1.0, 1.2, ..., alpha_max}` that admits it. Returns the
    /// selected set (re-sorted descending, ties broken by selection
    /// order) and the alpha=1.0 short-edge ratio.
    fn select_diverse(
        candidates: &NodeArray,
        target: NodeId,
        m: usize,
        alpha_max: f32,
        diversity: DiversityProvider,
    ) -> VortexResult<(NodeArray, f32)> {
        let mut selected: Vec<(NodeId, Score)> = Vec::with_capacity(m);
        let mut selected_ids: HashSet<NodeId> = HashSet::with_capacity(m);
        let mut short_edges = 0.0f32;
        let mut alpha = 1.0f32;
        let mut first_pass = true;

        while selected.len() < m && alpha <= alpha_max + f32::EPSILON {
            for (c, score_to_target) in candidates.iter() {
                if selected.len() >= m {
                    break;
                }
                if c == target || selected_ids.contains(&c) {
                    continue;
                }
                let sf_c = diversity(c)?;
                let mut diverse = true;
                for &s in selected_ids.iter() {
                    let score_c_s = sf_c.similarity_to(s)?;
                    if score_c_s > score_to_target * alpha {
                        diverse = false;
                        break;
                    }
                }
                if diverse {
                    selected.push((c, score_to_target));
                    selected_ids.insert(c);
                }
            }
            if first_pass {
                short_edges = selected.len() as f32 / m as f32;
                first_pass = false;
            }
            alpha += ALPHA_STEP;
        }

        // Stable sort: ties keep the order candidates were selected in,
        // matching NodeArray's "ties broken by insertion order" contract.
        selected.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let mut array = NodeArray::with_capacity(selected.len());
        for (id, score) in selected {
            array.add_in_order(id, score)?;
        }
        Ok((array, short_edges))
    }

    /// Inserts a single edge `from -> to`, allowing temporary growth up to
    /// this map's configured `max_overflow_degree`. A diversity prune only
    /// runs once that hard cap is exceeded — ordinary single-edge inserts
    /// (e.g. backlinking during build) stay cheap.
    pub fn insert_one(
        &self,
        from: NodeId,
        to: NodeId,
        score: Score,
        diversity: DiversityProvider,
    ) -> VortexResult<()> {
        if from == to {
            return Err(VortexError::invariant(format!("insert_one self-loop on {from}")));
        }
        self.cas_update(from, |old| {
            if old.contains(to) {
                return Ok(Arc::new(old.clone()));
            }
            let mut array = old.array.copy_with_capacity(NodeArray::grown_capacity(old.len()));
            array.insert_sorted(to, score);

            if array.len() <= self.max_overflow_degree {
                return Ok(Arc::new(Neighbors {
                    owner: from,
                    array,
                    diverse_before: old.diverse_before,
                    short_edges: old.short_edges,
                }));
            }
            let (pruned, short_edges) =
                Self::select_diverse(&array, from, self.max_degree, self.alpha, diversity)?;
            Ok(Arc::new(Neighbors { owner: from, array: pruned, diverse_before: 0, short_edges }))
        })?;
        Ok(())
    }

    /// Merges `candidates` with the existing neighbor set and applies the
    /// full Robust Prune pass.
    pub fn insert_diverse(
        &self,
        node: NodeId,
        candidates: &NodeArray,
        diversity: DiversityProvider,
    ) -> VortexResult<Arc<Neighbors>> {
        self.cas_update(node, |old| {
            let merged = NodeArray::merge(&old.array, candidates);
            let (pruned, short_edges) = Self::select_diverse(&merged, node, self.max_degree, self.alpha, diversity)?;
            Ok(Arc::new(Neighbors { owner: node, array: pruned, diverse_before: 0, short_edges }))
        })
    }

    /// Inserts `from -> to` without diversity checking, for emergency
    /// orphan reconnection. If already at `max_degree`, evicts the
    /// worst-scoring edge first.
    pub fn insert_not_diverse(&self, from: NodeId, to: NodeId, score: Score) -> VortexResult<()> {
        if from == to {
            return Err(VortexError::invariant(format!("insert_not_diverse self-loop on {from}")));
        }
        self.cas_update(from, |old| {
            debug_assert!(old.len() <= self.max_degree, "insert_not_diverse entered above max_degree");
            if old.contains(to) {
                return Ok(Arc::new(old.clone()));
            }
            let mut array = old.array.copy();
            if array.len() >= self.max_degree {
                // Worst-scoring edge sits at the tail (sorted descending).
                let worst_idx = array.len() - 1;
                let mut mask = vec![true; array.len()];
                mask[worst_idx] = false;
                array.retain(&mask);
            }
            array.insert_sorted(to, score);
            Ok(Arc::new(Neighbors { owner: from, array, diverse_before: old.diverse_before, short_edges: old.short_edges }))
        })?;
        Ok(())
    }

    /// If `node`'s degree exceeds `max_degree`, re-prunes it down to the
    /// hard cap. No-op otherwise.
    pub fn enforce_degree(&self, node: NodeId, diversity: DiversityProvider) -> VortexResult<()> {
        self.cas_update(node, |old| {
            if old.len() <= self.max_degree {
                return Ok(Arc::new(old.clone()));
            }
            let (pruned, short_edges) =
                Self::select_diverse(&old.array, node, self.max_degree, self.alpha, diversity)?;
            Ok(Arc::new(Neighbors { owner: node, array: pruned, diverse_before: 0, short_edges }))
        })?;
        Ok(())
    }

    /// Filters out neighbors marked in `deleted`, merges with `candidates`
    /// (typically second-hop edges through the deleted neighbors), and
    /// re-prunes.
    pub fn replace_deleted_neighbors(
        &self,
        node: NodeId,
        deleted: &crate::bitset::GrowableBitSet,
        candidates: &NodeArray,
        diversity: DiversityProvider,
    ) -> VortexResult<()> {
        self.cas_update(node, |old| {
            let mask: Vec<bool> = old.array.ids().iter().map(|id| !deleted.get(id.as_usize())).collect();
            let mut surviving = old.array.copy();
            surviving.retain(&mask);
            let merged = NodeArray::merge(&surviving, candidates);
            let (pruned, short_edges) = Self::select_diverse(&merged, node, self.max_degree, self.alpha, diversity)?;
            Ok(Arc::new(Neighbors { owner: node, array: pruned, diverse_before: 0, short_edges }))
        })?;
        Ok(())
    }

    /// For each `(neighbor, score)` in `array`, inserts the reciprocal
    /// edge `neighbor -> to`.
    pub fn backlink(&self, array: &NodeArray, to: NodeId, diversity: DiversityProvider) -> VortexResult<()> {
        for (neighbor, score) in array.iter() {
            self.insert_one(neighbor, to, score, diversity)?;
        }
        Ok(())
    }

    /// Calls `f` once for every node id that has ever been registered in
    /// this layer via [`Self::add_node`] (regardless of its current edge
    /// count, including zero).
    pub fn for_each_node(&self, mut f: impl FnMut(NodeId)) {
        self.slots.for_each(|idx, cell| {
            if cell.load_full().is_some() {
                f(NodeId(idx as u32));
            }
        });
    }
}
