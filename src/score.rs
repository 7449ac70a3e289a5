//! Score-function and score-provider traits consumed by the builder and
//! searcher, plus the one concrete (exact, uncompressed) implementation
//! this crate ships for tests and benchmarks.

use std::sync::Arc;

use ndarray::Array1;

use crate::distance::{calculate_distance, heap_score, DistanceMetric};
use crate::error::VortexResult;
use crate::types::{NodeId, Score};
use crate::vector::RandomAccessVectorValues;

/// A score function bound to one query (either a vector or a node).
/// `is_exact` tells callers whether scores from this function are safe to
/// use for diversity decisions directly, or whether they were computed
/// over a compressed representation and need exact re-scoring first.
///
/// `edge_loading_similarity_to` is an optional bulk path: given a node and
/// its neighbor ids, return all neighbor similarities in one call. The
/// default returns `None`, meaning "no bulk path available"; the searcher
/// then falls back to calling `similarity_to` once per neighbor.
pub trait ScoreFunction: Send + Sync {
    fn is_exact(&self) -> bool;

    fn similarity_to(&self, node: NodeId) -> VortexResult<Score>;

    fn edge_loading_similarity_to(&self, node: NodeId, neighbors: &[NodeId]) -> Option<VortexResult<Vec<Score>>> {
        let _ = (node, neighbors);
        None
    }
}

/// Marker alias: any `ScoreFunction` can serve as a search-time score
/// provider. Kept distinct in the type signatures below so call sites
/// document intent (searching vs. diversity pruning) even though the
/// trait bound is identical.
pub trait SearchScoreProvider: ScoreFunction {}
impl<T: ScoreFunction + ?Sized> SearchScoreProvider for T {}

/// Factory a builder uses to obtain query-bound [`ScoreFunction`]s, and to
/// learn whether its primary tier is exact or approximate.
///
/// `diversity_provider_for` MUST return an exact function even when
/// `search_provider_for_*` is approximate — the core relies on this
/// contract rather than re-checking it, since enforcing it requires
/// knowledge only the collaborator has (e.g. which compressed tier, if
/// any, backs a given node).
pub trait BuildScoreProvider: Send + Sync {
    fn is_exact(&self) -> bool;

    fn approximate_centroid(&self) -> VortexResult<Array1<f32>>;

    fn search_provider_for_node(&self, node: NodeId) -> VortexResult<Arc<dyn ScoreFunction>>;

    fn search_provider_for_vector(&self, vector: &[f32]) -> VortexResult<Arc<dyn ScoreFunction>>;

    fn diversity_provider_for(&self, node: NodeId) -> VortexResult<Arc<dyn ScoreFunction>>;
}

/// Exact, uncompressed score provider over a [`RandomAccessVectorValues`]
/// collaborator and a [`DistanceMetric`]. Always `is_exact() == true`, so
/// its diversity provider is the same function as its search provider —
/// this crate has no quantized tier of its own (that's the named
/// non-goal), so there is nothing for the two to diverge over.
pub struct DefaultScoreProvider {
    metric: DistanceMetric,
    vectors: Arc<dyn RandomAccessVectorValues>,
}

impl DefaultScoreProvider {
    pub fn new(metric: DistanceMetric, vectors: Arc<dyn RandomAccessVectorValues>) -> Self {
        DefaultScoreProvider { metric, vectors }
    }
}

impl BuildScoreProvider for DefaultScoreProvider {
    fn is_exact(&self) -> bool {
        true
    }

    fn approximate_centroid(&self) -> VortexResult<Array1<f32>> {
        let dim = self.vectors.dimension();
        let mut sum = Array1::<f32>::zeros(dim);
        let mut count = 0usize;
        for raw_id in 0..self.vectors.size() as u32 {
            if let Some(v) = self.vectors.get_vector(NodeId(raw_id)) {
                sum = sum + &v.0;
                count += 1;
            }
        }
        if count > 0 {
            sum.mapv_inplace(|x| x / count as f32);
        }
        Ok(sum)
    }

    fn search_provider_for_node(&self, node: NodeId) -> VortexResult<Arc<dyn ScoreFunction>> {
        let vector = self.vectors.get_vector(node).ok_or(crate::error::VortexError::NotFound(node))?;
        Ok(Arc::new(VectorScoreFunction { metric: self.metric, query: vector.0, vectors: self.vectors.clone() }))
    }

    fn search_provider_for_vector(&self, vector: &[f32]) -> VortexResult<Arc<dyn ScoreFunction>> {
        Ok(Arc::new(VectorScoreFunction {
            metric: self.metric,
            query: Array1::from(vector.to_vec()),
            vectors: self.vectors.clone(),
        }))
    }

    fn diversity_provider_for(&self, node: NodeId) -> VortexResult<Arc<dyn ScoreFunction>> {
        self.search_provider_for_node(node)
    }
}

/// A [`ScoreFunction`] bound to a fixed query vector, scoring against a
/// [`RandomAccessVectorValues`] collaborator on demand.
struct VectorScoreFunction {
    metric: DistanceMetric,
    query: Array1<f32>,
    vectors: Arc<dyn RandomAccessVectorValues>,
}

impl ScoreFunction for VectorScoreFunction {
    fn is_exact(&self) -> bool {
        true
    }

    fn similarity_to(&self, node: NodeId) -> VortexResult<Score> {
        let target = self.vectors.get_vector(node).ok_or(crate::error::VortexError::NotFound(node))?;
        let raw = calculate_distance(self.metric, self.query.view(), target.0.view())?;
        Ok(heap_score(self.metric, raw))
    }
}
