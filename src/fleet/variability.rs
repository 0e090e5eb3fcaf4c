use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Produces one multiplicative factor per city for a given month.
pub trait VariabilitySource: Send + Sync {
    fn factors(&self, month: u32, count: usize) -> Vec<f64>;
}

/// Uniform factors in `[low, high)` from a generator seeded with the month,
/// so a month always yields the same sequence.
#[derive(Debug, Clone, Copy)]
pub struct SeededVariability {
    pub low: f64,
    pub high: f64,
}

impl Default for SeededVariability {
    fn default() -> Self {
        Self {
            low: 0.9,
            high: 1.1,
        }
    }
}

impl VariabilitySource for SeededVariability {
    fn factors(&self, month: u32, count: usize) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(u64::from(month));
        (0..count)
            .map(|_| rng.random_range(self.low..self.high))
            .collect()
    }
}
