//! vortex-core: a concurrently-built, disk-aware proximity graph core for
//! approximate nearest-neighbor search, generalizing the HNSW layered-graph
//! search discipline with a Vamana/DiskANN-style Robust Prune diversity
//! rule for edge selection.
//!
//! This crate owns the graph itself — concurrent construction
//! ([`builder::GraphIndexBuilder`]), the layered adjacency structure
//! ([`graph_index::OnHeapGraphIndex`]), and bounded beam search
//! ([`searcher::GraphSearcher`]) — and nothing else. Vector storage,
//! on-disk persistence, and quantization are the concern of a collaborator
//! implementing [`vector::RandomAccessVectorValues`] and
//! [`score::BuildScoreProvider`]; this crate never implements a disk-backed
//! vector store of its own.

pub mod bitset;
pub mod builder;
pub mod concurrent_neighbor_map;
pub mod config;
pub mod dense_int_map;
pub mod distance;
pub mod error;
pub mod graph_index;
pub mod neighbors;
pub mod node_array;
pub mod score;
pub mod score_tracker;
pub mod searcher;
pub mod types;
pub mod vector;
mod utils;

pub use builder::GraphIndexBuilder;
pub use config::{BuilderConfig, ScoreTrackerKind, SearchConfig};
pub use distance::DistanceMetric;
pub use error::{VortexError, VortexResult};
pub use graph_index::{OnHeapGraphIndex, View};
pub use neighbors::Neighbors;
pub use node_array::NodeArray;
pub use score::{BuildScoreProvider, DefaultScoreProvider, ScoreFunction};
pub use score_tracker::{NoOpTracker, RelaxedMonotonicityTracker, ScoreTracker, TwoPhaseTracker};
pub use searcher::{CachingReranker, GraphSearcher, SearchResult};
pub use types::{AcceptAll, AcceptNone, Bits, NodeAtLevel, NodeId, Score};
pub use vector::{Embedding, InMemoryVectorValues, RandomAccessVectorValues};
