//! Construction and search tuning parameters.

use serde::{Deserialize, Serialize};

use crate::error::{VortexError, VortexResult};

/// Tuning parameters for [`crate::builder::GraphIndexBuilder`].
///
/// A plain `Copy` struct with a `validate()` that rejects nonsensical
/// values before any state is touched, covering the full set of
/// Vamana/DiskANN construction knobs the builder and concurrent neighbor
/// map need.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Hard neighbor cap per node per layer (`M`).
    pub max_degree: usize,
    /// Candidate-queue bound during single-layer search.
    pub beam_width: usize,
    /// Soft cap multiplier during build: a node may temporarily carry up
    /// to `neighbor_overflow * max_degree` edges before a prune is forced.
    pub neighbor_overflow: f32,
    /// Hard ceiling on temporary overflow degree, regardless of
    /// `neighbor_overflow * max_degree`.
    pub max_overflow_degree: usize,
    /// Robust Prune diversity multiplier; `1.0` is the HNSW rule, Vamana
    /// commonly uses `1.2`.
    pub alpha: f32,
    /// Recompute the entry point every this-many successful insertions.
    pub entry_point_update_interval: u64,
    /// Number of orphan-reconnection passes attempted during `cleanup()`.
    pub orphan_repair_passes: u32,
    /// Seed for the level-assignment RNG. `None` uses an entropy seed.
    pub seed: Option<u64>,
}

impl BuilderConfig {
    pub fn new(max_degree: usize, beam_width: usize, alpha: f32) -> Self {
        BuilderConfig {
            max_degree,
            beam_width,
            neighbor_overflow: 1.2,
            max_overflow_degree: max_degree * 2,
            alpha,
            entry_point_update_interval: 10_000,
            orphan_repair_passes: 5,
            seed: None,
        }
    }

    /// Rejects nonsensical tuning values before any graph state is touched.
    pub fn validate(&self) -> VortexResult<()> {
        if self.max_degree == 0 {
            return Err(VortexError::InvalidArgument("max_degree (M) must be greater than 0".to_string()));
        }
        if self.beam_width == 0 {
            return Err(VortexError::InvalidArgument("beam_width must be greater than 0".to_string()));
        }
        if self.neighbor_overflow < 1.0 {
            return Err(VortexError::InvalidArgument("neighbor_overflow must be >= 1.0".to_string()));
        }
        if self.max_overflow_degree < self.max_degree {
            return Err(VortexError::InvalidArgument(
                "max_overflow_degree must be >= max_degree".to_string(),
            ));
        }
        if self.alpha < 1.0 {
            return Err(VortexError::InvalidArgument("alpha must be >= 1.0".to_string()));
        }
        if self.entry_point_update_interval == 0 {
            return Err(VortexError::InvalidArgument(
                "entry_point_update_interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig::new(16, 100, 1.2)
    }
}

/// Which score-termination heuristic [`crate::searcher::GraphSearcher`]
/// uses when the caller doesn't force one explicitly via a non-zero
/// threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreTrackerKind {
    /// Never stop early.
    NoOp,
    /// Threshold-mode relaxed monotonicity (VBase-style, 500-window /
    /// top-100 / 99th-percentile).
    TwoPhase,
    /// Non-threshold relaxed monotonicity (Welford mean/stddev window).
    RelaxedMonotonicity,
}

/// Default search parameters, overridable per call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub rerank_k: usize,
    pub rerank_floor: f32,
    pub tracker_kind: ScoreTrackerKind,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            rerank_k: 100,
            rerank_floor: f32::NEG_INFINITY,
            tracker_kind: ScoreTrackerKind::NoOp,
        }
    }
}
