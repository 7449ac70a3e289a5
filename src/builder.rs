//! `GraphIndexBuilder` — concurrent incremental construction of an
//! [`OnHeapGraphIndex`]: per-node insertion and the deferred maintenance
//! pass, `cleanup()`.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rayon::prelude::*;

use crate::bitset::GrowableBitSet;
use crate::config::BuilderConfig;
use crate::error::VortexResult;
use crate::graph_index::OnHeapGraphIndex;
use crate::node_array::NodeArray;
use crate::score::BuildScoreProvider;
use crate::score_tracker::NoOpTracker;
use crate::searcher::GraphSearcher;
use crate::types::{AcceptAll, NodeAtLevel, NodeId, Score};
use crate::utils::{create_rng, generate_random_level};

/// Below this squared norm, a centroid is treated as the zero vector
/// (degenerate under a symmetric metric like cosine) rather than a real
/// similarity target.
const ZERO_VECTOR_EPSILON: f32 = 1e-12;

/// Tracks node ids whose insertion is in flight: visible to concurrent
/// inserters' searches (so two nodes racing to join the graph at once
/// still find each other) even though neither has finished wiring its
/// edges yet.
struct ConcurrentOrderedSet {
    ids: RwLock<BTreeSet<NodeId>>,
}

impl ConcurrentOrderedSet {
    fn new() -> Self {
        ConcurrentOrderedSet { ids: RwLock::new(BTreeSet::new()) }
    }

    /// Inserts `id` and returns a snapshot of every id currently in the
    /// set (including `id` itself).
    fn insert_and_snapshot(&self, id: NodeId) -> Vec<NodeId> {
        let mut guard = self.ids.write();
        guard.insert(id);
        guard.iter().copied().collect()
    }

    fn remove(&self, id: NodeId) {
        self.ids.write().remove(&id);
    }
}

/// Finally-equivalent cleanup: removes `node` from `set` when dropped,
/// whether `add_node` returns normally or bails out early via `?`.
struct InProgressGuard<'a> {
    set: &'a ConcurrentOrderedSet,
    node: NodeId,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(self.node);
    }
}

thread_local! {
    static SCRATCH: RefCell<Option<GraphSearcher>> = const { RefCell::new(None) };
}

/// Runs `f` against a thread-local, reused [`GraphSearcher`], so repeated
/// insertions on the same thread amortize its frontier/visited-set
/// allocations instead of paying for them on every call.
fn with_scratch<R>(f: impl FnOnce(&mut GraphSearcher) -> R) -> R {
    SCRATCH.with(|cell| {
        let mut slot = cell.borrow_mut();
        let searcher = slot.get_or_insert_with(GraphSearcher::new);
        f(searcher)
    })
}

pub struct GraphIndexBuilder {
    config: BuilderConfig,
    index: Arc<OnHeapGraphIndex>,
    score_provider: Arc<dyn BuildScoreProvider>,
    in_progress: ConcurrentOrderedSet,
    insertions_since_entry_update: AtomicU64,
    rng: RwLock<rand::rngs::StdRng>,
}

impl GraphIndexBuilder {
    pub fn new(config: BuilderConfig, dimensions: usize, score_provider: Arc<dyn BuildScoreProvider>) -> VortexResult<Self> {
        config.validate()?;
        let seed = config.seed;
        Ok(GraphIndexBuilder {
            index: Arc::new(OnHeapGraphIndex::new(config, dimensions)),
            config,
            score_provider,
            in_progress: ConcurrentOrderedSet::new(),
            insertions_since_entry_update: AtomicU64::new(0),
            rng: RwLock::new(create_rng(seed)),
        })
    }

    pub fn index(&self) -> Arc<OnHeapGraphIndex> {
        self.index.clone()
    }

    fn draw_level(&self) -> u16 {
        let mut rng = self.rng.write();
        generate_random_level(self.config.max_degree, &mut *rng)
    }

    /// Inserts `node` into the graph. `node` must already have its vector
    /// available through `score_provider`'s backing
    /// `RandomAccessVectorValues` collaborator.
    ///
    /// 1. draw a random top layer for the node,
    /// 2. register it across layers `0..=level`,
    /// 3. mark it in-progress so concurrent inserters can route through it,
    /// 4. if the graph was empty, it's done — just become the entry point,
    /// 5. otherwise descend greedily from the current entry point down to
    ///    `level`, running a beam search at each layer from `level` down
    ///    to `0` to gather edge candidates (unioned with any other
    ///    in-progress peers),
    /// 6. Robust-Prune each layer's candidates into `node`'s neighbor set
    ///    and backlink each selected neighbor,
    /// 7. (re)consider `node` for the entry point,
    /// 8. unmark in-progress, and periodically refresh the entry point
    ///    from the approximate centroid.
    pub fn add_node(&self, node: NodeId) -> VortexResult<()> {
        let level = self.draw_level();
        self.index.add_node(node, level)?;
        let peers = self.in_progress.insert_and_snapshot(node);
        // Guarantees removal from `in_progress` on every exit path below,
        // including an early return via `?` from the per-layer loop.
        let _in_progress_guard = InProgressGuard { set: &self.in_progress, node };

        let search_provider = self.score_provider.search_provider_for_node(node)?;
        let diversity_fn = {
            let provider = self.score_provider.clone();
            move |n: NodeId| provider.diversity_provider_for(n)
        };

        if self.index.entry_point().is_none() {
            self.index.maybe_update_entry_point(NodeAtLevel { node, level });
            return Ok(());
        }

        // Walk from this node's own top layer down to 0. `search` handles
        // the greedy descent through any layers above `layer` itself
        // (including layers above `entry.level`, when this node's random
        // draw out-ranks the current entry point), so each iteration only
        // needs to gather and wire candidates at its own layer.
        with_scratch(|searcher| -> VortexResult<()> {
            for layer in (0..=level).rev() {
                let neighbor_layer = self.index.ensure_layer(layer as usize);
                let view = self.index.get_view(Box::new(AcceptAll));
                let mut tracker = NoOpTracker;
                let found = searcher.search(
                    &view,
                    search_provider.as_ref(),
                    layer as usize,
                    self.config.beam_width,
                    self.config.beam_width,
                    self.config.beam_width,
                    Score::NEG_INFINITY,
                    Score::NEG_INFINITY,
                    None,
                    &mut tracker,
                )?;
                drop(view);

                let mut candidates = found.results;
                for &peer in &peers {
                    if peer != node && !candidates.contains(peer) && neighbor_layer.get(peer).is_some() {
                        let score = search_provider.similarity_to(peer)?;
                        candidates.insert_sorted(peer, score);
                    }
                }

                let selected = neighbor_layer.insert_diverse(node, &candidates, &diversity_fn)?;
                neighbor_layer.backlink(&selected.array, node, &diversity_fn)?;
            }
            Ok(())
        })?;

        self.index.maybe_update_entry_point(NodeAtLevel { node, level });

        let since_update = self.insertions_since_entry_update.fetch_add(1, Ordering::AcqRel) + 1;
        if since_update % self.config.entry_point_update_interval == 0 {
            self.refresh_entry_point()?;
        }
        Ok(())
    }

    /// Inserts many nodes in parallel via `rayon`; each call is otherwise
    /// identical to calling [`Self::add_node`] once per id.
    pub fn add_nodes_parallel(&self, nodes: &[NodeId]) -> VortexResult<()> {
        nodes.par_iter().try_for_each(|&node| self.add_node(node))
    }

    pub fn mark_deleted(&self, node: NodeId) {
        self.index.mark_deleted(node);
    }

    /// Re-anchors the entry point at the live node whose vector is
    /// closest to the graph's approximate centroid, among the nodes that
    /// sit at the current maximum layer.
    fn refresh_entry_point(&self) -> VortexResult<()> {
        let centroid = self.score_provider.approximate_centroid()?;
        let max_level = match self.index.entry_point() {
            Some(e) => e.level,
            None => return Ok(()),
        };

        let centroid_norm_sq: f32 = centroid.iter().map(|x| x * x).sum();
        if centroid_norm_sq < ZERO_VECTOR_EPSILON {
            return self.refresh_entry_point_to_random_live_node(max_level);
        }

        let provider = self.score_provider.search_provider_for_vector(centroid.as_slice().unwrap_or(&[]))?;

        let mut best: Option<(NodeId, Score)> = None;
        if let Some(layer) = self.index.layer(max_level as usize) {
            layer.for_each_node(|id| {
                if self.index.is_deleted(id) {
                    return;
                }
                if let Ok(score) = provider.similarity_to(id) {
                    if best.map(|(_, b)| score > b).unwrap_or(true) {
                        best = Some((id, score));
                    }
                }
            });
        }
        match best {
            Some((node, _)) => {
                self.index.maybe_update_entry_point(NodeAtLevel { node, level: max_level });
                Ok(())
            }
            None => self.refresh_entry_point_to_random_live_node(max_level),
        }
    }

    /// Falls back to a uniformly random live node when there's no
    /// principled "closest to centroid" candidate — either the centroid
    /// collapsed to (approximately) the zero vector, which is ill-defined
    /// under a symmetric metric like cosine, or no live node at the max
    /// layer scored at all.
    fn refresh_entry_point_to_random_live_node(&self, max_level: u16) -> VortexResult<()> {
        let live: Vec<NodeId> = self.index.all_nodes().into_iter().filter(|&n| !self.index.is_deleted(n)).collect();
        let chosen = {
            let mut rng = self.rng.write();
            live.choose(&mut *rng).copied()
        };
        if let Some(node) = chosen {
            self.index.maybe_update_entry_point(NodeAtLevel { node, level: max_level });
        }
        Ok(())
    }

    /// Breadth-first reachability sweep over layer 0 from the current
    /// entry point.
    fn reachable_from_entry(&self) -> GrowableBitSet {
        let reached = GrowableBitSet::new();
        let entry = match self.index.entry_point() {
            Some(e) => e.node,
            None => return reached,
        };
        let layer0 = match self.index.layer(0) {
            Some(l) => l,
            None => return reached,
        };

        reached.set(entry.as_usize());
        let mut frontier = vec![entry];
        while let Some(node) = frontier.pop() {
            if let Some(neighbors) = layer0.get(node) {
                for &n in neighbors.ids() {
                    if self.index.is_deleted(n) {
                        continue;
                    }
                    if reached.try_claim(n.as_usize()) {
                        frontier.push(n);
                    }
                }
            }
        }
        reached
    }

    /// Deferred maintenance, run once building is otherwise finished:
    /// re-enforces degree caps graph-wide, repairs the two-hop
    /// neighborhood around every deleted node, reconnects any node left
    /// unreachable from the entry point, and refreshes the entry point.
    pub fn cleanup(&self) -> VortexResult<()> {
        let nodes = self.index.all_nodes();
        let diversity_fn = {
            let provider = self.score_provider.clone();
            move |n: NodeId| provider.diversity_provider_for(n)
        };

        // Phase 1: enforce degree across every layer, in parallel.
        for level in 0..self.index.layer_count() {
            let layer = self.index.ensure_layer(level);
            nodes.par_iter().try_for_each(|&node| -> VortexResult<()> {
                if layer.get(node).is_some() {
                    layer.enforce_degree(node, &diversity_fn)?;
                }
                Ok(())
            })?;
        }

        // Phase 2: two-hop repair around deleted nodes, at every layer
        // they participated in.
        for level in 0..self.index.layer_count() {
            let layer = self.index.ensure_layer(level);
            for &node in &nodes {
                if !self.index.is_deleted(node) {
                    continue;
                }
                let dead_neighbors = match layer.get(node) {
                    Some(n) => n,
                    None => continue,
                };
                let replacement_pool = dead_neighbors.array.clone();
                for &neighbor in dead_neighbors.ids() {
                    if self.index.is_deleted(neighbor) {
                        continue;
                    }
                    let mut candidates = NodeArray::new();
                    let provider = self.score_provider.search_provider_for_node(neighbor)?;
                    for &candidate in replacement_pool.ids() {
                        if candidate == neighbor || candidate == node || self.index.is_deleted(candidate) {
                            continue;
                        }
                        let score = provider.similarity_to(candidate)?;
                        candidates.insert_sorted(candidate, score);
                    }

                    if candidates.is_empty() {
                        // The surviving two-hop pool is empty (e.g. every
                        // other edge of `neighbor` is itself deleted too).
                        // Sample a batch of random live nodes as emergency
                        // replacement candidates rather than leaving
                        // `neighbor` with nothing to repair with.
                        let sample_size = 2 * self.config.max_degree;
                        let live: Vec<NodeId> = nodes
                            .iter()
                            .copied()
                            .filter(|&n| n != neighbor && n != node && !self.index.is_deleted(n))
                            .collect();
                        let sampled: Vec<NodeId> = {
                            let mut rng = self.rng.write();
                            live.choose_multiple(&mut *rng, sample_size.min(live.len())).copied().collect()
                        };
                        for candidate in sampled {
                            let score = provider.similarity_to(candidate)?;
                            candidates.insert_sorted(candidate, score);
                        }
                    }

                    layer.replace_deleted_neighbors(neighbor, self.index.deleted_bitset(), &candidates, &diversity_fn)?;
                }
            }
        }

        // Phase 3: orphan reconnection, retried up to
        // `orphan_repair_passes` times since reconnecting one orphan can
        // merge components and change who else is still unreachable.
        for _ in 0..self.config.orphan_repair_passes {
            let reached = self.reachable_from_entry();
            let orphans: Vec<NodeId> = nodes
                .iter()
                .copied()
                .filter(|&n| !self.index.is_deleted(n) && !reached.get(n.as_usize()))
                .collect();
            if orphans.is_empty() {
                break;
            }
            let layer0 = self.index.ensure_layer(0);
            // One claim per reached node for this pass, so a single
            // exceptionally central node can't absorb every orphan —
            // once claimed, later orphans in this pass fall through to
            // their next-best candidate instead.
            let claimed_targets = GrowableBitSet::new();
            for orphan in orphans {
                let provider = self.score_provider.search_provider_for_node(orphan)?;
                // Linear scan for the nearest reached nodes — cleanup runs
                // off the hot insertion path, so a full scan per orphan is
                // an acceptable trade against the complexity of searching
                // a graph whose reachable component is exactly what we're
                // trying to re-enter.
                let mut ranked: Vec<(NodeId, crate::types::Score)> = Vec::new();
                for &candidate in &nodes {
                    if candidate == orphan || !reached.get(candidate.as_usize()) {
                        continue;
                    }
                    let score = provider.similarity_to(candidate)?;
                    ranked.push((candidate, score));
                }
                ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

                let mut target = ranked.into_iter().find(|&(candidate, _)| claimed_targets.try_claim(candidate.as_usize()));

                if target.is_none() {
                    // Every nearby reached node this orphan's own scan
                    // considered is already claimed this pass. Fall back
                    // to a fresh layer-0 search from the current entry
                    // point for a candidate the linear scan above
                    // wouldn't have surfaced first.
                    let view = self.index.get_view(Box::new(AcceptAll));
                    let mut tracker = NoOpTracker;
                    let found = with_scratch(|searcher| {
                        searcher.search(
                            &view,
                            provider.as_ref(),
                            0,
                            self.config.max_degree,
                            self.config.max_degree,
                            self.config.beam_width,
                            Score::NEG_INFINITY,
                            Score::NEG_INFINITY,
                            None,
                            &mut tracker,
                        )
                    })?;
                    drop(view);
                    target = found
                        .results
                        .iter()
                        .find(|&(candidate, _)| candidate != orphan && claimed_targets.try_claim(candidate.as_usize()));
                }

                if let Some((target_node, score)) = target {
                    layer0.insert_not_diverse(orphan, target_node, score)?;
                    layer0.insert_not_diverse(target_node, orphan, score)?;
                }
            }
        }

        // Phase 4: refresh the entry point against the now-repaired graph.
        self.refresh_entry_point()?;

        // Phase 5: one more degree sweep, since phases 2-3 may have
        // pushed some nodes back over their cap.
        for level in 0..self.index.layer_count() {
            let layer = self.index.ensure_layer(level);
            nodes.par_iter().try_for_each(|&node| -> VortexResult<()> {
                if layer.get(node).is_some() {
                    layer.enforce_degree(node, &diversity_fn)?;
                }
                Ok(())
            })?;
        }

        Ok(())
    }

    /// Live (non-deleted) node count.
    pub fn live_count(&self) -> usize {
        self.index.all_nodes().iter().filter(|&&n| !self.index.is_deleted(n)).count()
    }
}
