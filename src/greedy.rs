//! Epsilon-greedy.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::policy::{Policy, RunningMeans};

/// With probability `epsilon` explore uniformly, otherwise exploit the best
/// running mean (lowest index on ties).
#[derive(Debug, Clone)]
pub struct EpsilonGreedy {
    epsilon: f64,
    stats: RunningMeans,
    rng: StdRng,
}

impl EpsilonGreedy {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon: epsilon.clamp(0.0, 1.0),
            stats: RunningMeans::default(),
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn stats(&self) -> &RunningMeans {
        &self.stats
    }
}

impl Default for EpsilonGreedy {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl Policy for EpsilonGreedy {
    fn name(&self) -> &str {
        "epsilon_greedy"
    }

    fn reset(&mut self, k: usize, rng: StdRng) {
        self.stats = RunningMeans::new(k);
        self.rng = rng;
    }

    fn select_arm(&mut self, _t: usize) -> isize {
        let k = self.stats.k();
        if k > 0 && self.rng.random::<f64>() < self.epsilon {
            return self.rng.random_range(0..k) as isize;
        }
        self.stats.best_arm() as isize
    }

    fn update(&mut self, arm: usize, reward: u8) {
        self.stats.update(arm, reward);
    }
}
