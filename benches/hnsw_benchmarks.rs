use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vortex_core::builder::GraphIndexBuilder;
use vortex_core::config::BuilderConfig;
use vortex_core::distance::DistanceMetric;
use vortex_core::score::{BuildScoreProvider, DefaultScoreProvider};
use vortex_core::score_tracker::NoOpTracker;
use vortex_core::searcher::GraphSearcher;
use vortex_core::types::{AcceptAll, NodeId, Score};
use vortex_core::vector::{Embedding, InMemoryVectorValues};

const DIM: usize = 128;

fn generate_random_vector(dim: usize, rng: &mut StdRng) -> Embedding {
    let vec: Vec<f32> = (0..dim).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();
    vec.into()
}

fn generate_test_data(num_vectors: usize, dim: usize, seed: u64) -> Vec<(NodeId, Embedding)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..num_vectors)
        .map(|i| (NodeId(i as u32), generate_random_vector(dim, &mut rng)))
        .collect()
}

fn make_provider(data: &[(NodeId, Embedding)], dim: usize) -> (Arc<InMemoryVectorValues>, Arc<dyn BuildScoreProvider>) {
    let store = Arc::new(InMemoryVectorValues::new(dim));
    for (id, vector) in data {
        store.put(*id, vector.clone()).unwrap();
    }
    let provider: Arc<dyn BuildScoreProvider> = Arc::new(DefaultScoreProvider::new(DistanceMetric::L2, store.clone()));
    (store, provider)
}

fn bench_build_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_sequential");
    let seed = 1u64;

    for &n in [100usize, 1_000, 5_000].iter() {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || {
                    let data = generate_test_data(n, DIM, seed);
                    let (_store, provider) = make_provider(&data, DIM);
                    let config = BuilderConfig { seed: Some(seed), ..BuilderConfig::new(16, 200, 1.2) };
                    let builder = GraphIndexBuilder::new(config, DIM, provider).unwrap();
                    let ids: Vec<NodeId> = data.iter().map(|(id, _)| *id).collect();
                    (builder, ids)
                },
                |(builder, ids)| {
                    for id in ids {
                        builder.add_node(black_box(id)).unwrap();
                    }
                    builder
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_build_parallel(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_parallel");
    let seed = 2u64;

    for &n in [1_000usize, 10_000].iter() {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || {
                    let data = generate_test_data(n, DIM, seed);
                    let (_store, provider) = make_provider(&data, DIM);
                    let config = BuilderConfig { seed: Some(seed), ..BuilderConfig::new(16, 100, 1.2) };
                    let builder = GraphIndexBuilder::new(config, DIM, provider).unwrap();
                    let ids: Vec<NodeId> = data.iter().map(|(id, _)| *id).collect();
                    (builder, ids)
                },
                |(builder, ids)| {
                    builder.add_nodes_parallel(black_box(&ids)).unwrap();
                    builder
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_add_node_single(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_node_single");
    let seed = 3u64;

    for &n in [1_000usize, 10_000].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || {
                    let mut data = generate_test_data(n, DIM, seed);
                    let (store, provider) = make_provider(&data, DIM);
                    let config = BuilderConfig { seed: Some(seed), ..BuilderConfig::new(16, 100, 1.2) };
                    let builder = GraphIndexBuilder::new(config, DIM, provider).unwrap();
                    for (id, _) in &data {
                        builder.add_node(*id).unwrap();
                    }
                    let mut rng = StdRng::seed_from_u64(seed + n as u64);
                    let new_id = NodeId(n as u32);
                    let new_vector = generate_random_vector(DIM, &mut rng);
                    store.put(new_id, new_vector.clone()).unwrap();
                    data.push((new_id, new_vector));
                    (builder, new_id)
                },
                |(builder, new_id)| {
                    builder.add_node(black_box(new_id)).unwrap();
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_search_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_latency");
    let seed = 4u64;

    let n_values = [1_000usize, 10_000, 50_000];
    let top_k_values = [1usize, 10, 50];
    let beam_width_values = [50usize, 100, 200];

    for &n in n_values.iter() {
        let data = generate_test_data(n, DIM, seed);
        let (_store, provider) = make_provider(&data, DIM);
        let config = BuilderConfig { seed: Some(seed), ..BuilderConfig::new(16, 100, 1.2) };
        let builder = GraphIndexBuilder::new(config, DIM, provider.clone()).unwrap();
        for (id, _) in &data {
            builder.add_node(*id).unwrap();
        }
        builder.cleanup().unwrap();
        let index = builder.index();

        let mut query_rng = StdRng::seed_from_u64(seed + n as u64 + 1);

        for &top_k in top_k_values.iter() {
            for &beam_width in beam_width_values.iter() {
                if beam_width < top_k {
                    continue;
                }
                let query = generate_random_vector(DIM, &mut query_rng);
                let bench_id = format!("N={n}/k={top_k}/beam_width={beam_width}");
                group.throughput(Throughput::Elements(1));
                group.bench_with_input(BenchmarkId::from_parameter(bench_id), &(top_k, beam_width), |b, &(top_k, beam_width)| {
                    let view = index.get_view(Box::new(AcceptAll));
                    let sf = provider.search_provider_for_vector(query.as_slice().unwrap()).unwrap();
                    b.iter_batched(
                        GraphSearcher::new,
                        |mut searcher| {
                            let mut tracker = NoOpTracker;
                            black_box(
                                searcher
                                    .search(
                                        &view,
                                        sf.as_ref(),
                                        0,
                                        black_box(top_k),
                                        black_box(beam_width),
                                        black_box(beam_width),
                                        Score::NEG_INFINITY,
                                        Score::NEG_INFINITY,
                                        None,
                                        &mut tracker,
                                    )
                                    .unwrap(),
                            );
                        },
                        criterion::BatchSize::SmallInput,
                    );
                });
            }
        }
    }
    group.finish();
}

criterion_group!(benches, bench_build_sequential, bench_build_parallel, bench_add_node_single, bench_search_latency);
criterion_main!(benches);
