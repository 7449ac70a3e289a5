//! `GraphSearcher` — greedy multi-layer descent followed by a bounded
//! beam search at a target layer, with an optional exact rerank pass.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::bitset::GrowableBitSet;
use crate::config::{ScoreTrackerKind, SearchConfig};
use crate::error::VortexResult;
use crate::graph_index::View;
use crate::node_array::NodeArray;
use crate::score::ScoreFunction;
use crate::score_tracker::{NoOpTracker, RelaxedMonotonicityTracker, ScoreTracker, TwoPhaseTracker};
use crate::types::{NodeId, Score};

/// A `(score, node)` pair ordered purely by score, for use in a
/// `BinaryHeap` as a max-heap frontier. `f32` isn't `Ord`; `total_cmp`
/// gives a well-defined order even across NaN, which never legitimately
/// occurs here but shouldn't panic if it does.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: Score,
    node: NodeId,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.node == other.node
    }
}
impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.total_cmp(&other.score)
    }
}

/// The result of one [`GraphSearcher::search`] or
/// [`GraphSearcher::resume`] call.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Candidates found, sorted descending by score. Length is at most
    /// the requested `top_k`.
    pub results: NodeArray,
    /// Total number of distinct nodes the search evaluated a score for,
    /// including ones later pruned or never entering the final window.
    pub visited_count: usize,
    /// Number of exact-scoring calls the rerank pass actually made (cache
    /// misses on the `CachingReranker`). Zero when no reranker was given.
    pub rerank_count: usize,
    /// The worst approximate score among the results that survived into
    /// the final top-`k`, or `None` if the result set is empty. With no
    /// reranker this is simply the approximate score of the last result;
    /// with a reranker it's the approximate score of the exact-sorted
    /// result that barely made the cut — useful for calibrating
    /// `rerank_floor` across queries.
    pub worst_approximate_in_top_k: Option<Score>,
}

/// Wraps a primary (possibly approximate) score function and an exact
/// one, caching exact scores by node id so a rerank pass never scores
/// the same node against the query twice, even across a `search` +
/// `resume` pair sharing the same reranker.
pub struct CachingReranker {
    exact: Arc<dyn ScoreFunction>,
    cache: std::collections::HashMap<NodeId, Score>,
    invocations: usize,
}

impl CachingReranker {
    pub fn new(exact: Arc<dyn ScoreFunction>) -> Self {
        CachingReranker { exact, cache: std::collections::HashMap::new(), invocations: 0 }
    }

    pub fn score(&mut self, node: NodeId) -> VortexResult<Score> {
        if let Some(&cached) = self.cache.get(&node) {
            return Ok(cached);
        }
        let score = self.exact.similarity_to(node)?;
        self.cache.insert(node, score);
        self.invocations += 1;
        Ok(score)
    }

    /// Total number of exact-scoring calls made across this reranker's
    /// lifetime (cache misses only).
    pub fn invocation_count(&self) -> usize {
        self.invocations
    }
}

/// Resumable beam-search state. A single `GraphSearcher` instance is
/// meant to be reused across many `search`/`resume` calls from the same
/// thread (see `builder::with_scratch`) to amortize the frontier and
/// visited-set allocations.
pub struct GraphSearcher {
    frontier: BinaryHeap<Candidate>,
    visited: GrowableBitSet,
    results: NodeArray,
    visited_count: usize,
    /// Approximate results bumped out of the `rerank_k`-bounded window
    /// by a strictly better candidate, kept so [`Self::resume`] can give
    /// them a second chance against a wider `top_k`.
    evicted_results: Vec<Candidate>,
}

impl GraphSearcher {
    pub fn new() -> Self {
        GraphSearcher {
            frontier: BinaryHeap::new(),
            visited: GrowableBitSet::new(),
            results: NodeArray::new(),
            visited_count: 0,
            evicted_results: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.frontier.clear();
        self.visited = GrowableBitSet::new();
        self.results.clear();
        self.visited_count = 0;
        self.evicted_results.clear();
    }

    /// Greedily descends from `view`'s entry point down to (but not
    /// including) `target_layer`, keeping only the single best candidate
    /// at each layer — the standard HNSW-style upper-layer search, used
    /// purely to find a good entry node for the beam search run at
    /// `target_layer`.
    fn descend_upper_layers(
        &mut self,
        view: &View,
        score_provider: &dyn ScoreFunction,
        target_layer: usize,
    ) -> VortexResult<Option<NodeId>> {
        let entry = match view.entry_point() {
            Some(e) => e,
            None => return Ok(None),
        };
        let mut current = entry.node;
        let mut current_score = score_provider.similarity_to(current)?;

        if (entry.level as usize) < target_layer {
            return Ok(Some(current));
        }

        for level in (target_layer + 1..=entry.level as usize).rev() {
            loop {
                let mut improved = false;
                if let Some(neighbors) = view.neighbors(level, current) {
                    for &candidate in neighbors.ids() {
                        if !view.accepts(candidate) {
                            continue;
                        }
                        let score = score_provider.similarity_to(candidate)?;
                        if score > current_score {
                            current = candidate;
                            current_score = score;
                            improved = true;
                        }
                    }
                }
                if !improved {
                    break;
                }
            }
        }
        Ok(Some(current))
    }

    /// Seeds the frontier and result window with `entry_node`, without
    /// draining it — used once per fresh [`Self::search`] call, and
    /// skipped entirely by [`Self::resume`], which continues draining an
    /// already-seeded frontier.
    fn seed(
        &mut self,
        view: &View,
        score_provider: &dyn ScoreFunction,
        entry_node: NodeId,
        threshold: Score,
        tracker: &mut dyn ScoreTracker,
    ) -> VortexResult<()> {
        let entry_score = score_provider.similarity_to(entry_node)?;
        self.visited.set(entry_node.as_usize());
        self.frontier.push(Candidate { score: entry_score, node: entry_node });
        if view.accepts(entry_node) && entry_score >= threshold {
            self.results.insert_sorted(entry_node, entry_score);
        }
        tracker.push(entry_score);
        self.visited_count += 1;
        Ok(())
    }

    /// Drains the frontier (whatever it currently holds) until either it
    /// empties, the `rerank_k`-bounded approximate-result window can
    /// provably no longer improve, or `tracker` signals an early stop.
    fn drain(
        &mut self,
        view: &View,
        score_provider: &dyn ScoreFunction,
        layer: usize,
        rerank_k: usize,
        beam_width: usize,
        threshold: Score,
        tracker: &mut dyn ScoreTracker,
    ) -> VortexResult<()> {
        let mut visited_count = 0usize;

        // The frontier always pops its best remaining (highest-score)
        // unexplored candidate first. Once the approximate-result window
        // (bounded by `rerank_k` during the walk) is full and that best
        // remaining candidate already scores worse than the window's
        // worst member, nothing left in the frontier can improve it
        // either.
        while let Some(Candidate { score: popped_score, node }) = self.frontier.pop() {
            if self.results.len() >= rerank_k {
                if let Some((_, worst)) = self.results.get(rerank_k - 1) {
                    if popped_score < worst {
                        break;
                    }
                }
            }
            if self.results.len() >= beam_width {
                let worst_best = self.results.get(beam_width - 1).map(|(_, s)| s).unwrap_or(Score::NEG_INFINITY);
                if tracker.should_stop(worst_best, threshold) {
                    break;
                }
            }

            let neighbors = match view.neighbors(layer, node) {
                Some(n) => n,
                None => continue,
            };

            let ids = neighbors.ids();
            let bulk = score_provider.edge_loading_similarity_to(node, ids);

            for (idx, &candidate) in ids.iter().enumerate() {
                if self.visited.get(candidate.as_usize()) {
                    continue;
                }
                self.visited.set(candidate.as_usize());
                visited_count += 1;

                let score = match &bulk {
                    Some(Ok(scores)) => scores[idx],
                    Some(Err(_)) => score_provider.similarity_to(candidate)?,
                    None => score_provider.similarity_to(candidate)?,
                };
                tracker.push(score);

                if view.accepts(candidate) && score >= threshold {
                    self.results.insert_sorted(candidate, score);
                    if self.results.len() > rerank_k {
                        // `insert_sorted` only ever grows the array past
                        // the cap by exactly one at a time, and it stays
                        // sorted descending, so the overflowing entry is
                        // always the last one.
                        if let Some((evicted_id, evicted_score)) = self.results.get(self.results.len() - 1) {
                            self.evicted_results.push(Candidate { score: evicted_score, node: evicted_id });
                        }
                        let keep = self.results.len() - 1;
                        let mask: Vec<bool> = (0..self.results.len()).map(|i| i < keep).collect();
                        self.results.retain(&mask);
                    }
                }
                self.frontier.push(Candidate { score, node: candidate });
            }
        }

        self.visited_count += visited_count;
        Ok(())
    }

    /// Trims the accumulated approximate-result window down to a final
    /// [`SearchResult`], optionally rescoring through `reranker` first.
    fn finish(&mut self, top_k: usize, rerank_floor: Score, reranker: Option<&mut CachingReranker>) -> VortexResult<SearchResult> {
        match reranker {
            None => {
                if self.results.len() > top_k {
                    let mask: Vec<bool> = (0..self.results.len()).map(|i| i < top_k).collect();
                    self.results.retain(&mask);
                }
                let worst_approximate_in_top_k = self.results.get(self.results.len().saturating_sub(1)).map(|(_, s)| s);
                Ok(SearchResult {
                    results: self.results.copy(),
                    visited_count: self.visited_count,
                    rerank_count: 0,
                    worst_approximate_in_top_k,
                })
            }
            Some(reranker) => {
                let invocations_before = reranker.invocation_count();
                let mut rescored: Vec<(NodeId, Score, Score)> = Vec::new();
                for (node, approx_score) in self.results.iter() {
                    if approx_score < rerank_floor {
                        continue;
                    }
                    let exact_score = reranker.score(node)?;
                    rescored.push((node, exact_score, approx_score));
                }
                rescored.sort_by(|a, b| b.1.total_cmp(&a.1));
                rescored.truncate(top_k);

                let worst_approximate_in_top_k = rescored.last().map(|&(_, _, approx)| approx);
                let mut final_results = NodeArray::with_capacity(rescored.len());
                for (node, exact_score, _) in rescored {
                    final_results.add_in_order(node, exact_score)?;
                }
                Ok(SearchResult {
                    results: final_results,
                    visited_count: self.visited_count,
                    rerank_count: reranker.invocation_count() - invocations_before,
                    worst_approximate_in_top_k,
                })
            }
        }
    }

    /// Runs a fresh search at `layer` from `view`'s entry point.
    ///
    /// `top_k` is the final result count; `rerank_k` (must be `>=
    /// top_k`) bounds how many approximate-scored candidates the beam
    /// walk keeps around for the rerank pass. `threshold` is a minimum
    /// similarity score gating both which candidates enter the
    /// approximate window and when threshold-mode score trackers give up
    /// early; pass `Score::NEG_INFINITY` for no threshold. `rerank_floor`
    /// (checked against each candidate's *approximate* score) further
    /// filters which of the `rerank_k` candidates get exact-rescored when
    /// `reranker` is `Some`. With no reranker, the approximate window is
    /// simply truncated to `top_k`.
    ///
    /// Pass `layer = 0` for an ordinary top-level query; the builder also
    /// drives this at higher layers while gathering edge candidates for
    /// a node being inserted.
    #[allow(clippy::too_many_arguments)]
    pub fn search(
        &mut self,
        view: &View,
        score_provider: &dyn ScoreFunction,
        layer: usize,
        top_k: usize,
        rerank_k: usize,
        beam_width: usize,
        threshold: Score,
        rerank_floor: Score,
        reranker: Option<&mut CachingReranker>,
        tracker: &mut dyn ScoreTracker,
    ) -> VortexResult<SearchResult> {
        debug_assert!(rerank_k >= top_k, "rerank_k must be >= top_k");
        self.reset();
        let entry = self.descend_upper_layers(view, score_provider, layer)?;
        let entry_node = match entry {
            Some(n) => n,
            None => {
                return Ok(SearchResult {
                    results: NodeArray::new(),
                    visited_count: 0,
                    rerank_count: 0,
                    worst_approximate_in_top_k: None,
                })
            }
        };
        self.seed(view, score_provider, entry_node, threshold, tracker)?;
        self.drain(view, score_provider, layer, rerank_k, beam_width, threshold, tracker)?;
        self.finish(top_k, rerank_floor, reranker)
    }

    /// Continues a previous `search` call to satisfy a larger `top_k`,
    /// without re-descending the upper layers or re-visiting
    /// already-expanded nodes. Re-seeds the frontier with whatever got
    /// evicted from the approximate-result window last time (those
    /// candidates are legitimate contenders against the now-wider
    /// window) before resuming the beam walk. `layer` must match the
    /// layer passed to the `search`/`resume` call that produced the
    /// frontier being resumed; a reranker passed here should be the same
    /// instance used previously, so its cache carries over.
    #[allow(clippy::too_many_arguments)]
    pub fn resume(
        &mut self,
        view: &View,
        score_provider: &dyn ScoreFunction,
        layer: usize,
        top_k: usize,
        rerank_k: usize,
        beam_width: usize,
        threshold: Score,
        rerank_floor: Score,
        reranker: Option<&mut CachingReranker>,
        tracker: &mut dyn ScoreTracker,
    ) -> VortexResult<SearchResult> {
        debug_assert!(rerank_k >= top_k, "rerank_k must be >= top_k");
        for candidate in self.evicted_results.drain(..) {
            self.frontier.push(candidate);
        }
        self.drain(view, score_provider, layer, rerank_k, beam_width, threshold, tracker)?;
        self.finish(top_k, rerank_floor, reranker)
    }

    /// Convenience entry point that picks `rerank_k`, `rerank_floor` and
    /// the score tracker from a [`SearchConfig`] instead of having the
    /// caller wire each one up by hand; `beam_width` is taken to be
    /// `rerank_k`, since `SearchConfig` doesn't carry a separate knob for
    /// it. Builds its own tracker internally, so there's nothing for the
    /// caller to pass in beyond the config itself.
    pub fn search_with_config(
        &mut self,
        view: &View,
        score_provider: &dyn ScoreFunction,
        layer: usize,
        top_k: usize,
        threshold: Score,
        reranker: Option<&mut CachingReranker>,
        config: &SearchConfig,
    ) -> VortexResult<SearchResult> {
        let rerank_k = config.rerank_k.max(top_k);
        let mut tracker: Box<dyn ScoreTracker> = match config.tracker_kind {
            ScoreTrackerKind::NoOp => Box::new(NoOpTracker),
            ScoreTrackerKind::TwoPhase => Box::new(TwoPhaseTracker::new()),
            ScoreTrackerKind::RelaxedMonotonicity => Box::new(RelaxedMonotonicityTracker::new()),
        };
        self.search(view, score_provider, layer, top_k, rerank_k, rerank_k, threshold, config.rerank_floor, reranker, tracker.as_mut())
    }
}

impl Default for GraphSearcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuilderConfig;
    use crate::distance::DistanceMetric;
    use crate::graph_index::OnHeapGraphIndex;
    use crate::score::DefaultScoreProvider;
    use crate::score::BuildScoreProvider;
    use crate::score_tracker::NoOpTracker;
    use crate::types::{AcceptAll, NodeAtLevel};
    use crate::vector::InMemoryVectorValues;

    fn line_vectors(n: u32) -> Arc<InMemoryVectorValues> {
        let store = InMemoryVectorValues::new(1);
        for i in 0..n {
            store.put(NodeId(i), vec![i as f32].into()).unwrap();
        }
        Arc::new(store)
    }

    #[test]
    fn test_search_on_empty_index_returns_empty() {
        let index = Arc::new(OnHeapGraphIndex::new(BuilderConfig::new(4, 10, 1.2), 1));
        let view = index.get_view(Box::new(AcceptAll));
        let vectors = line_vectors(1);
        let provider = DefaultScoreProvider::new(DistanceMetric::L2, vectors);
        let sf = provider.search_provider_for_vector(&[0.0]).unwrap();
        let mut searcher = GraphSearcher::new();
        let mut tracker = NoOpTracker;
        let result = searcher
            .search(&view, sf.as_ref(), 0, 5, 5, 10, Score::NEG_INFINITY, Score::NEG_INFINITY, None, &mut tracker)
            .unwrap();
        assert!(result.results.is_empty());
        assert_eq!(result.rerank_count, 0);
        assert_eq!(result.worst_approximate_in_top_k, None);
    }

    fn build_line_index(n: u32) -> (Arc<OnHeapGraphIndex>, DefaultScoreProvider) {
        let config = BuilderConfig::new(4, 10, 1.2);
        let index = Arc::new(OnHeapGraphIndex::new(config, 1));
        for i in 0..n {
            index.add_node(NodeId(i), 0).unwrap();
        }
        index.maybe_update_entry_point(NodeAtLevel { node: NodeId(0), level: 0 });

        let vectors = line_vectors(n);
        let provider = DefaultScoreProvider::new(DistanceMetric::L2, vectors);
        let diversity = |n: NodeId| provider.diversity_provider_for(n);
        let layer0 = index.layer(0).unwrap();
        for i in 0..n {
            if i > 0 {
                let score = provider.search_provider_for_node(NodeId(i)).unwrap().similarity_to(NodeId(i - 1)).unwrap();
                layer0.insert_one(NodeId(i), NodeId(i - 1), score, &diversity).unwrap();
            }
            if i < n - 1 {
                let score = provider.search_provider_for_node(NodeId(i)).unwrap().similarity_to(NodeId(i + 1)).unwrap();
                layer0.insert_one(NodeId(i), NodeId(i + 1), score, &diversity).unwrap();
            }
        }
        (index, provider)
    }

    #[test]
    fn test_search_finds_nearest_on_a_line() {
        let (index, provider) = build_line_index(10);
        let view = index.get_view(Box::new(AcceptAll));
        let sf = provider.search_provider_for_vector(&[7.0]).unwrap();
        let mut searcher = GraphSearcher::new();
        let mut tracker = NoOpTracker;
        let result = searcher
            .search(&view, sf.as_ref(), 0, 1, 1, 10, Score::NEG_INFINITY, Score::NEG_INFINITY, None, &mut tracker)
            .unwrap();
        assert_eq!(result.results.get(0).map(|(id, _)| id), Some(NodeId(7)));
    }

    #[test]
    fn test_search_respects_threshold() {
        let (index, provider) = build_line_index(10);
        let view = index.get_view(Box::new(AcceptAll));
        let sf = provider.search_provider_for_vector(&[7.0]).unwrap();
        let mut searcher = GraphSearcher::new();
        let mut tracker = NoOpTracker;
        // The self-match score (0.0 raw L2 -> heap_score upper bound) is
        // the best any candidate can do; an impossibly high threshold
        // should admit nothing.
        let result = searcher
            .search(&view, sf.as_ref(), 0, 5, 5, 10, Score::INFINITY, Score::NEG_INFINITY, None, &mut tracker)
            .unwrap();
        assert!(result.results.is_empty());
    }

    #[test]
    fn test_search_with_reranker_reorders_by_exact_score() {
        let (index, provider) = build_line_index(10);
        let view = index.get_view(Box::new(AcceptAll));
        let sf = provider.search_provider_for_vector(&[7.0]).unwrap();
        let exact = provider.search_provider_for_vector(&[7.0]).unwrap();
        let mut reranker = CachingReranker::new(exact);
        let mut searcher = GraphSearcher::new();
        let mut tracker = NoOpTracker;
        let result = searcher
            .search(
                &view,
                sf.as_ref(),
                0,
                3,
                6,
                10,
                Score::NEG_INFINITY,
                Score::NEG_INFINITY,
                Some(&mut reranker),
                &mut tracker,
            )
            .unwrap();
        assert_eq!(result.results.get(0).map(|(id, _)| id), Some(NodeId(7)));
        assert!(result.rerank_count > 0);
        assert!(result.worst_approximate_in_top_k.is_some());
    }

    #[test]
    fn test_resume_considers_evicted_candidates() {
        let (index, provider) = build_line_index(12);
        let view = index.get_view(Box::new(AcceptAll));
        let sf = provider.search_provider_for_vector(&[7.0]).unwrap();
        let mut searcher = GraphSearcher::new();
        let mut tracker = NoOpTracker;
        let first =
            searcher.search(&view, sf.as_ref(), 0, 1, 1, 10, Score::NEG_INFINITY, Score::NEG_INFINITY, None, &mut tracker).unwrap();
        assert_eq!(first.results.len(), 1);

        let mut tracker = NoOpTracker;
        let resumed = searcher
            .resume(&view, sf.as_ref(), 0, 5, 5, 10, Score::NEG_INFINITY, Score::NEG_INFINITY, None, &mut tracker)
            .unwrap();
        assert!(resumed.results.len() >= first.results.len());
        assert_eq!(resumed.results.get(0).map(|(id, _)| id), Some(NodeId(7)));
    }

    #[test]
    fn test_search_with_config_uses_configured_rerank_k_and_floor() {
        let (index, provider) = build_line_index(10);
        let view = index.get_view(Box::new(AcceptAll));
        let sf = provider.search_provider_for_vector(&[7.0]).unwrap();
        let mut searcher = GraphSearcher::new();
        let config = crate::config::SearchConfig { rerank_k: 4, rerank_floor: Score::NEG_INFINITY, tracker_kind: crate::config::ScoreTrackerKind::NoOp };
        let result = searcher.search_with_config(&view, sf.as_ref(), 0, 2, Score::NEG_INFINITY, None, &config).unwrap();
        assert_eq!(result.results.get(0).map(|(id, _)| id), Some(NodeId(7)));
        assert!(result.results.len() <= 2);
    }

    #[test]
    fn test_caching_reranker_caches_scores() {
        let vectors = line_vectors(3);
        let provider = DefaultScoreProvider::new(DistanceMetric::L2, vectors);
        let sf = provider.search_provider_for_vector(&[0.0]).unwrap();
        let mut reranker = CachingReranker::new(sf);
        let first = reranker.score(NodeId(1)).unwrap();
        let second = reranker.score(NodeId(1)).unwrap();
        assert_eq!(first, second);
        assert_eq!(reranker.invocation_count(), 1);
    }
}
