//! Distance metrics for comparing vectors, and the heap-score convention
//! that lets both metrics share one max-heap-of-best-score implementation.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::error::{VortexError, VortexResult};
use crate::types::Score;

/// Enum representing supported distance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Cosine similarity. Higher values mean more similar.
    Cosine,
    /// Euclidean (L2) distance. Lower values mean more similar.
    L2,
}

/// Calculates the distance/similarity between two vectors based on the
/// specified metric.
///
/// Cosine returns *similarity* (higher is better, range `[-1, 1]`). L2
/// returns *distance* (lower is better, range `[0, inf)`).
pub fn calculate_distance(metric: DistanceMetric, v1: ArrayView1<f32>, v2: ArrayView1<f32>) -> VortexResult<f32> {
    if v1.len() != v2.len() {
        return Err(VortexError::DimensionMismatch { expected: v1.len(), actual: v2.len() });
    }

    match metric {
        DistanceMetric::Cosine => {
            let dot_product = v1.dot(&v2);
            let norm_v1 = v1.dot(&v1).sqrt();
            let norm_v2 = v2.dot(&v2).sqrt();

            if norm_v1 == 0.0 || norm_v2 == 0.0 {
                Ok(0.0)
            } else {
                Ok((dot_product / (norm_v1 * norm_v2)).clamp(-1.0, 1.0))
            }
        }
        DistanceMetric::L2 => {
            let diff = &v1 - &v2;
            Ok(diff.dot(&diff).sqrt())
        }
    }
}

/// Trait to encapsulate distance calculation logic, letting other
/// components stay generic over the metric.
pub trait Distance {
    fn distance(&self, v1: ArrayView1<f32>, v2: ArrayView1<f32>) -> VortexResult<f32>;
}

impl Distance for DistanceMetric {
    fn distance(&self, v1: ArrayView1<f32>, v2: ArrayView1<f32>) -> VortexResult<f32> {
        calculate_distance(*self, v1, v2)
    }
}

/// Maps a raw metric value onto the "higher is always better" convention
/// every heap/candidate-ordering structure in the searcher and builder
/// assumes. L2 distances are negated so the max-heap that keeps the best
/// candidate on top works identically for both metrics.
#[inline]
pub fn heap_score(metric: DistanceMetric, raw: f32) -> Score {
    match metric {
        DistanceMetric::L2 => -raw,
        DistanceMetric::Cosine => raw,
    }
}

/// Inverse of [`heap_score`]: recovers the metric's native value from a
/// heap score.
#[inline]
pub fn original_score(metric: DistanceMetric, heap_score: Score) -> f32 {
    match metric {
        DistanceMetric::L2 => -heap_score,
        DistanceMetric::Cosine => heap_score,
    }
}
