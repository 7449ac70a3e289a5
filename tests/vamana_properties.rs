//! End-to-end property tests against the public `GraphIndexBuilder` /
//! `GraphSearcher` surface, covering the scenarios a disk-aware ANN core
//! is expected to hold up under: empty/singleton edge cases, exact small
//! topologies, diversity pruning, deletion repair, resumable search, and
//! build determinism under exact scoring.

use std::sync::Arc;

use vortex_core::builder::GraphIndexBuilder;
use vortex_core::config::BuilderConfig;
use vortex_core::distance::DistanceMetric;
use vortex_core::score::{BuildScoreProvider, DefaultScoreProvider, ScoreFunction};
use vortex_core::score_tracker::{NoOpTracker, TwoPhaseTracker};
use vortex_core::searcher::GraphSearcher;
use vortex_core::types::{AcceptAll, NodeId, Score};
use vortex_core::vector::InMemoryVectorValues;

fn provider(dim: usize, vectors: &[(NodeId, Vec<f32>)], metric: DistanceMetric) -> Arc<dyn BuildScoreProvider> {
    let store = InMemoryVectorValues::new(dim);
    for (id, v) in vectors {
        store.put(*id, v.clone().into()).unwrap();
    }
    Arc::new(DefaultScoreProvider::new(metric, Arc::new(store)))
}

#[test]
fn s1_empty_graph_returns_no_results() {
    let sp = provider(4, &[], DistanceMetric::Cosine);
    let config = BuilderConfig::new(8, 16, 1.2);
    let builder = GraphIndexBuilder::new(config, 4, sp.clone()).unwrap();
    let index = builder.index();

    let view = index.get_view(Box::new(AcceptAll));
    let sf = sp.search_provider_for_vector(&[1.0, 0.0, 0.0, 0.0]).unwrap();
    let mut searcher = GraphSearcher::new();
    let mut tracker = NoOpTracker;
    let result = searcher.search(&view, sf.as_ref(), 0, 5, 16, 16, Score::NEG_INFINITY, Score::NEG_INFINITY, None, &mut tracker).unwrap();

    assert!(result.results.is_empty());
    assert_eq!(result.visited_count, 0);
}

#[test]
fn s2_single_node_matches_itself() {
    let sp = provider(4, &[(NodeId(0), vec![1.0, 0.0, 0.0, 0.0])], DistanceMetric::Cosine);
    let config = BuilderConfig::new(8, 16, 1.2);
    let builder = GraphIndexBuilder::new(config, 4, sp.clone()).unwrap();
    builder.add_node(NodeId(0)).unwrap();
    let index = builder.index();

    let view = index.get_view(Box::new(AcceptAll));
    let sf = sp.search_provider_for_vector(&[1.0, 0.0, 0.0, 0.0]).unwrap();
    let mut searcher = GraphSearcher::new();
    let mut tracker = NoOpTracker;
    let result = searcher.search(&view, sf.as_ref(), 0, 5, 16, 16, Score::NEG_INFINITY, Score::NEG_INFINITY, None, &mut tracker).unwrap();

    assert_eq!(result.visited_count, 1);
    let (id, score) = result.results.get(0).unwrap();
    assert_eq!(id, NodeId(0));
    assert!((score - 1.0).abs() < 1e-6);
}

#[test]
fn s3_exact_triangle_links_the_shared_corner() {
    let vectors = vec![
        (NodeId(0), vec![1.0, 0.0]),
        (NodeId(1), vec![0.0, 1.0]),
        (NodeId(2), vec![std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2]),
    ];
    let sp = provider(2, &vectors, DistanceMetric::Cosine);
    let config = BuilderConfig { orphan_repair_passes: 1, ..BuilderConfig::new(2, 4, 1.2) };
    let builder = GraphIndexBuilder::new(config, 2, sp.clone()).unwrap();
    for (id, _) in &vectors {
        builder.add_node(*id).unwrap();
    }
    builder.cleanup().unwrap();
    let index = builder.index();

    let layer0 = index.layer(0).unwrap();
    let node2_neighbors = layer0.get(NodeId(2)).unwrap();
    assert!(node2_neighbors.contains(NodeId(0)));
    assert!(node2_neighbors.contains(NodeId(1)));
    assert!(layer0.get(NodeId(0)).unwrap().contains(NodeId(2)));
    assert!(layer0.get(NodeId(1)).unwrap().contains(NodeId(2)));

    let view = index.get_view(Box::new(AcceptAll));
    let sf = sp.search_provider_for_vector(&[1.0, 0.1]).unwrap();
    let mut searcher = GraphSearcher::new();
    let mut tracker = NoOpTracker;
    let result = searcher.search(&view, sf.as_ref(), 0, 2, 4, 4, Score::NEG_INFINITY, Score::NEG_INFINITY, None, &mut tracker).unwrap();
    assert_eq!(result.results.get(0).map(|(id, _)| id), Some(NodeId(0)));
}

#[test]
fn s4_diversity_prune_drops_the_near_duplicate() {
    // Target T sits at the origin. A and C are equidistant in orthogonal
    // directions; B is almost collinear with A (same direction, distance
    // 1.001 instead of 1), so it should lose out to A under Robust Prune.
    let vectors = vec![
        (NodeId(3), vec![0.0, 0.0]),    // T, the node these edges are for
        (NodeId(0), vec![1.0, 0.0]),    // A
        (NodeId(1), vec![1.001, 0.0]),  // B, nearly collinear with A
        (NodeId(2), vec![0.0, 1.0]),    // C, a distinct direction
    ];
    let sp = provider(2, &vectors, DistanceMetric::L2);
    let target_scorer = sp.search_provider_for_node(NodeId(3)).unwrap();
    let diversity = |n: NodeId| sp.diversity_provider_for(n);

    let map = vortex_core::concurrent_neighbor_map::ConcurrentNeighborMap::new(2, 8, 1.2);
    map.add_node(NodeId(3)).unwrap();

    // Insertion order ties A and C at the same score; A must come first to
    // match the scenario this test is checking.
    let mut candidates = vortex_core::node_array::NodeArray::new();
    for &id in &[NodeId(0), NodeId(2), NodeId(1)] {
        let score = target_scorer.similarity_to(id).unwrap();
        candidates.insert_sorted(id, score);
    }

    let selected = map.insert_diverse(NodeId(3), &candidates, &diversity).unwrap();
    assert!(selected.array.contains(NodeId(0)));
    assert!(selected.array.contains(NodeId(2)));
    assert!(!selected.array.contains(NodeId(1)));
}

#[test]
fn s5_deletion_with_two_hop_repair_reconnects_the_line() {
    let vectors = vec![
        (NodeId(0), vec![0.0]),
        (NodeId(1), vec![1.0]),
        (NodeId(2), vec![2.0]),
        (NodeId(3), vec![3.0]),
    ];
    let sp = provider(1, &vectors, DistanceMetric::L2);
    let config = BuilderConfig { orphan_repair_passes: 2, ..BuilderConfig::new(2, 8, 1.2) };
    let builder = GraphIndexBuilder::new(config, 1, sp).unwrap();
    for (id, _) in &vectors {
        builder.add_node(*id).unwrap();
    }
    builder.cleanup().unwrap();

    builder.mark_deleted(NodeId(1));
    builder.mark_deleted(NodeId(2));
    builder.cleanup().unwrap();

    let index = builder.index();
    let layer0 = index.layer(0).unwrap();
    let node0_neighbors = layer0.get(NodeId(0)).unwrap();
    assert!(node0_neighbors.contains(NodeId(3)), "node 0 should reconnect directly to node 3 after 1 and 2 are deleted");
    assert!(!node0_neighbors.contains(NodeId(1)));
    assert!(!node0_neighbors.contains(NodeId(2)));
}

#[test]
fn s6_resumable_search_has_no_duplicates_across_calls() {
    let n = 1_000u32;
    let vectors: Vec<(NodeId, Vec<f32>)> = (0..n).map(|i| (NodeId(i), vec![i as f32])).collect();
    let sp = provider(1, &vectors, DistanceMetric::L2);
    let config = BuilderConfig::new(16, 64, 1.2);
    let builder = GraphIndexBuilder::new(config, 1, sp.clone()).unwrap();
    for (id, _) in &vectors {
        builder.add_node(*id).unwrap();
    }
    builder.cleanup().unwrap();
    let index = builder.index();

    let view = index.get_view(Box::new(AcceptAll));
    let sf = sp.search_provider_for_vector(&[500.0]).unwrap();
    let mut searcher = GraphSearcher::new();
    let mut tracker = TwoPhaseTracker::new();

    let first = searcher
        .search(&view, sf.as_ref(), 0, 5, 64, 64, Score::NEG_INFINITY, Score::NEG_INFINITY, None, &mut tracker)
        .unwrap();
    assert!(first.results.len() <= 5);
    assert!(first.results.is_sorted_descending());

    let second = searcher
        .resume(&view, sf.as_ref(), 0, 10, 64, 64, Score::NEG_INFINITY, Score::NEG_INFINITY, None, &mut tracker)
        .unwrap();
    assert!(second.results.len() <= 10);
    assert!(second.results.is_sorted_descending());

    let second_ids: std::collections::HashSet<NodeId> = second.results.ids().iter().copied().collect();
    assert_eq!(second_ids.len(), second.results.len(), "resumed window must not contain duplicate nodes");
    assert_eq!(second.results.get(0).map(|(id, _)| id), Some(NodeId(500)), "the exact query match should stay the top result across resumes");
}

#[test]
fn s7_concurrent_build_preserves_recall_under_exact_scoring() {
    let n = 2_000u32;
    let mut seed = 42u64;
    let vectors: Vec<(NodeId, Vec<f32>)> = (0..n)
        .map(|i| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            let x = ((seed >> 33) as f32) / (u32::MAX as f32);
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            let y = ((seed >> 33) as f32) / (u32::MAX as f32);
            (NodeId(i), vec![x, y])
        })
        .collect();

    let build_once = |build_seed: u64| -> Arc<vortex_core::graph_index::OnHeapGraphIndex> {
        let sp = provider(2, &vectors, DistanceMetric::L2);
        let config = BuilderConfig { seed: Some(build_seed), ..BuilderConfig::new(16, 64, 1.2) };
        let builder = GraphIndexBuilder::new(config, 2, sp).unwrap();
        let ids: Vec<NodeId> = vectors.iter().map(|(id, _)| *id).collect();
        builder.add_nodes_parallel(&ids).unwrap();
        builder.cleanup().unwrap();
        builder.index()
    };

    let index_a = build_once(7);
    let index_b = build_once(7);

    let sp = provider(2, &vectors, DistanceMetric::L2);
    let query = [0.5, 0.5];
    let sf = sp.search_provider_for_vector(&query).unwrap();

    let top_k = |index: &Arc<vortex_core::graph_index::OnHeapGraphIndex>| -> Vec<NodeId> {
        let view = index.get_view(Box::new(AcceptAll));
        let mut searcher = GraphSearcher::new();
        let mut tracker = NoOpTracker;
        let result = searcher
            .search(&view, sf.as_ref(), 0, 10, 128, 128, Score::NEG_INFINITY, Score::NEG_INFINITY, None, &mut tracker)
            .unwrap();
        result.results.ids().to_vec()
    };

    let a = top_k(&index_a);
    let b: std::collections::HashSet<NodeId> = top_k(&index_b).into_iter().collect();
    let overlap = a.iter().filter(|id| b.contains(id)).count();
    let recall = overlap as f32 / a.len().max(1) as f32;
    assert!(recall >= 0.95, "expected top-10 recall >= 0.95 between two builds of the same data, got {recall}");
}
