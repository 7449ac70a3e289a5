//! Score-termination heuristics for [`crate::searcher::GraphSearcher`].
//!
//! A tracker watches the stream of scores the beam search evaluates and
//! decides when continuing to expand the frontier is no longer worth
//! it — trading a small amount of recall for a large cut in visited
//! nodes on easy queries.

use crate::types::Score;

/// Per-search-call decision: whether the searcher should stop expanding
/// the candidate frontier. `worst_best_score` is the worst score
/// currently held in the kept result window; `threshold` is the
/// caller's similarity-threshold argument to `search`/`resume`
/// (`Score::NEG_INFINITY` when the caller didn't supply one).
pub trait ScoreTracker: Send {
    /// Records one more observed candidate score.
    fn push(&mut self, score: Score);

    /// Returns `true` once the tracker believes further expansion can no
    /// longer improve the current best-`k` result window.
    fn should_stop(&self, worst_best_score: Score, threshold: Score) -> bool;
}

/// Never stops early; the searcher runs until its candidate queue is
/// exhausted. The safe default (`ScoreTrackerKind::NoOp`).
#[derive(Debug, Default)]
pub struct NoOpTracker;

impl ScoreTracker for NoOpTracker {
    fn push(&mut self, _score: Score) {}

    fn should_stop(&self, _worst_best_score: Score, _threshold: Score) -> bool {
        false
    }
}

/// VBase-style relaxed monotonicity over a fixed window: keeps the last
/// `WINDOW` scores, and once the window is full, stops as soon as the
/// 99th-percentile score among the best `TOP_K` seen falls behind both
/// the current worst-best score and the caller's threshold — i.e. the
/// frontier has drifted far enough past the result window, and past
/// whatever similarity bar the caller asked for, that further expansion
/// is unlikely to help. Threshold mode: with no real threshold supplied
/// (`Score::NEG_INFINITY`), the threshold half of the test can never be
/// satisfied, so this tracker only ever stops when one is given.
pub struct TwoPhaseTracker {
    window: Vec<Score>,
}

const TWO_PHASE_WINDOW: usize = 500;
const TWO_PHASE_TOP_K: usize = 100;

impl TwoPhaseTracker {
    pub fn new() -> Self {
        TwoPhaseTracker { window: Vec::with_capacity(TWO_PHASE_WINDOW) }
    }

    fn percentile_99_of_top_k(&self) -> Option<Score> {
        if self.window.len() < TWO_PHASE_WINDOW {
            return None;
        }
        let mut top: Vec<Score> = self.window.clone();
        top.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        top.truncate(TWO_PHASE_TOP_K);
        let idx = ((top.len() as f64) * 0.99).floor() as usize;
        top.get(idx.min(top.len().saturating_sub(1))).copied()
    }
}

impl Default for TwoPhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreTracker for TwoPhaseTracker {
    fn push(&mut self, score: Score) {
        if self.window.len() == TWO_PHASE_WINDOW {
            self.window.remove(0);
        }
        self.window.push(score);
    }

    fn should_stop(&self, worst_best_score: Score, threshold: Score) -> bool {
        match self.percentile_99_of_top_k() {
            Some(p99) => p99 < worst_best_score && p99 < threshold,
            None => false,
        }
    }
}

/// Non-threshold relaxed monotonicity: maintains a running mean and
/// standard deviation of observed scores via Welford's online algorithm,
/// and stops once the current worst-best score is more than four
/// standard deviations above the running mean — i.e. the frontier has
/// settled into a regime so much worse than what's already in the
/// result window that it is statistically unlikely to produce an
/// improvement. Ignores `threshold`; this is the non-threshold-mode
/// tracker, selected when the caller has no similarity threshold to
/// give.
#[derive(Debug, Default)]
pub struct RelaxedMonotonicityTracker {
    count: u64,
    mean: f64,
    m2: f64,
}

const STD_DEV_MULTIPLIER: f64 = 4.0;
const MIN_SAMPLES: u64 = 32;

impl RelaxedMonotonicityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn std_dev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.m2 / (self.count - 1) as f64).sqrt()
    }
}

impl ScoreTracker for RelaxedMonotonicityTracker {
    fn push(&mut self, score: Score) {
        self.count += 1;
        let x = score as f64;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    fn should_stop(&self, worst_best_score: Score, _threshold: Score) -> bool {
        if self.count < MIN_SAMPLES {
            return false;
        }
        let stop_level = self.mean + STD_DEV_MULTIPLIER * self.std_dev();
        (worst_best_score as f64) > stop_level
    }
}
