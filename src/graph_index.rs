//! `OnHeapGraphIndex` — the whole multi-layer proximity graph: one
//! [`ConcurrentNeighborMap`] per layer, a CAS-published entry point, and
//! the deletion bitset. Builder and searcher both operate against a
//! [`View`], a thin borrow that pairs the index with a caller-supplied
//! accept predicate and the graph's own liveness predicate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::RwLock;

use crate::bitset::GrowableBitSet;
use crate::concurrent_neighbor_map::ConcurrentNeighborMap;
use crate::config::BuilderConfig;
use crate::neighbors::Neighbors;
use crate::types::{Bits, NodeAtLevel, NodeId};

pub struct OnHeapGraphIndex {
    layers: RwLock<Vec<Arc<ConcurrentNeighborMap>>>,
    entry_point: ArcSwapOption<NodeAtLevel>,
    deleted: GrowableBitSet,
    node_count: AtomicUsize,
    outstanding_views: AtomicUsize,
    config: BuilderConfig,
    dimensions: usize,
}

impl OnHeapGraphIndex {
    pub fn new(config: BuilderConfig, dimensions: usize) -> Self {
        OnHeapGraphIndex {
            layers: RwLock::new(Vec::new()),
            entry_point: ArcSwapOption::from(None),
            deleted: GrowableBitSet::new(),
            node_count: AtomicUsize::new(0),
            outstanding_views: AtomicUsize::new(0),
            config,
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn size(&self) -> usize {
        self.node_count.load(Ordering::Acquire)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.read().len()
    }

    pub fn entry_point(&self) -> Option<NodeAtLevel> {
        self.entry_point.load_full().map(|arc| *arc)
    }

    pub fn layer(&self, level: usize) -> Option<Arc<ConcurrentNeighborMap>> {
        self.layers.read().get(level).cloned()
    }

    /// Returns the layer at `level`, creating it (and every layer below
    /// it, though those are expected to already exist by construction)
    /// if it doesn't exist yet.
    pub fn ensure_layer(&self, level: usize) -> Arc<ConcurrentNeighborMap> {
        {
            let guard = self.layers.read();
            if let Some(layer) = guard.get(level) {
                return layer.clone();
            }
        }
        let mut guard = self.layers.write();
        while guard.len() <= level {
            guard.push(Arc::new(ConcurrentNeighborMap::new(
                self.config.max_degree,
                self.config.max_overflow_degree,
                self.config.alpha,
            )));
        }
        guard[level].clone()
    }

    /// Registers `node` in every layer from 0 up to and including
    /// `node_level`, creating layers as needed, and bumps the live node
    /// count. Does not touch the entry point; callers run
    /// [`Self::maybe_update_entry_point`] separately once the node's
    /// edges are wired up.
    pub fn add_node(&self, node: NodeId, node_level: u16) -> crate::error::VortexResult<()> {
        for level in 0..=node_level as usize {
            self.ensure_layer(level).add_node(node)?;
        }
        self.node_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Replaces the entry point with `candidate` only if no entry point
    /// exists yet or `candidate` sits at a strictly higher level —
    /// published via the same lock-free CAS discipline as neighbor edges.
    pub fn maybe_update_entry_point(&self, candidate: NodeAtLevel) {
        self.entry_point.rcu(|old: &Option<Arc<NodeAtLevel>>| -> Option<Arc<NodeAtLevel>> {
            match old {
                Some(existing) if existing.level >= candidate.level => Some(existing.clone()),
                _ => Some(Arc::new(candidate)),
            }
        });
    }

    /// Every node registered in the graph, live or deleted (layer 0 holds
    /// every node regardless of its random level draw).
    pub fn all_nodes(&self) -> Vec<NodeId> {
        let mut nodes = Vec::with_capacity(self.size());
        if let Some(layer0) = self.layer(0) {
            layer0.for_each_node(|id| nodes.push(id));
        }
        nodes
    }

    pub fn mark_deleted(&self, node: NodeId) {
        self.deleted.set(node.as_usize());
    }

    pub fn is_deleted(&self, node: NodeId) -> bool {
        self.deleted.get(node.as_usize())
    }

    pub fn deleted_bitset(&self) -> &GrowableBitSet {
        &self.deleted
    }

    pub fn get_neighbors(&self, level: usize, node: NodeId) -> Option<Arc<Neighbors>> {
        self.layer(level)?.get(node)
    }

    /// Opens a [`View`] over `self`, incrementing the outstanding-view
    /// counter so `cleanup()` passes that need exclusivity over a
    /// structural change (e.g. the final orphan sweep) can observe
    /// whether readers are still active.
    pub fn get_view(self: &Arc<Self>, accept: Box<dyn Bits>) -> View {
        self.outstanding_views.fetch_add(1, Ordering::AcqRel);
        View { index: self.clone(), accept }
    }

    pub fn outstanding_views(&self) -> usize {
        self.outstanding_views.load(Ordering::Acquire)
    }
}

/// A read-only handle over the graph for the duration of one search or
/// builder pass, combining the graph's own liveness predicate with a
/// caller-supplied accept predicate.
pub struct View {
    index: Arc<OnHeapGraphIndex>,
    accept: Box<dyn Bits>,
}

impl View {
    pub fn entry_point(&self) -> Option<NodeAtLevel> {
        self.index.entry_point()
    }

    pub fn layer_count(&self) -> usize {
        self.index.layer_count()
    }

    pub fn neighbors(&self, level: usize, node: NodeId) -> Option<Arc<Neighbors>> {
        self.index.get_neighbors(level, node)
    }

    /// A node is visible through this view iff it hasn't been deleted and
    /// the caller's own predicate accepts it.
    pub fn accepts(&self, node: NodeId) -> bool {
        !self.index.is_deleted(node) && self.accept.get(node)
    }

    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }
}

impl Drop for View {
    fn drop(&mut self) {
        self.index.outstanding_views.fetch_sub(1, Ordering::AcqRel);
    }
}
