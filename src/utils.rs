//! RNG helpers for level assignment.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Draws a node's top layer:
/// `floor(-ln(uniform(0,1)) / ln(M))`, where `M` is the configured
/// `max_degree`. Larger `M` makes the exponential distribution decay
/// faster, so fewer nodes reach the upper layers as the graph gets
/// denser per layer.
pub(crate) fn generate_random_level(max_degree: usize, rng: &mut impl Rng) -> u16 {
    let m = max_degree.max(2) as f64;
    let uniform_random: f64 = rng.gen_range(f64::EPSILON..=1.0);
    (-uniform_random.ln() / m.ln()).floor() as u16
}

/// Creates a seeded random number generator, or one seeded from entropy
/// if `seed` is `None`.
pub(crate) fn create_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}
