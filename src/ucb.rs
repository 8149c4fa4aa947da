//! UCB1.

use rand::rngs::StdRng;

use crate::policy::{Policy, RunningMeans};

/// Upper-confidence-bound policy.
///
/// Plays every untried arm once (index order), then the arm maximizing
/// `mean + c * sqrt(2 ln(t + 1) / count)`. `c = 1` is textbook UCB1.
#[derive(Debug, Clone)]
pub struct Ucb1 {
    exploration: f64,
    stats: RunningMeans,
}

impl Ucb1 {
    pub fn new() -> Self {
        Self::with_exploration(1.0)
    }

    /// UCB1 with the confidence bonus scaled by `c`.
    pub fn with_exploration(c: f64) -> Self {
        Self {
            exploration: if c.is_finite() && c >= 0.0 { c } else { 1.0 },
            stats: RunningMeans::default(),
        }
    }

    pub fn stats(&self) -> &RunningMeans {
        &self.stats
    }

    /// Upper confidence bound of each arm at step `t` (`+inf` for untried arms).
    pub fn bounds(&self, t: usize) -> Vec<f64> {
        let log_t = ((t + 1) as f64).ln();
        self.stats
            .counts()
            .iter()
            .zip(self.stats.values())
            .map(|(&n, &mean)| {
                if n == 0 {
                    f64::INFINITY
                } else {
                    mean + self.exploration * (2.0 * log_t / n as f64).sqrt()
                }
            })
            .collect()
    }
}

impl Default for Ucb1 {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for Ucb1 {
    fn name(&self) -> &str {
        "ucb1"
    }

    fn reset(&mut self, k: usize, _rng: StdRng) {
        self.stats = RunningMeans::new(k);
    }

    fn select_arm(&mut self, t: usize) -> isize {
        if let Some(untried) = self.stats.counts().iter().position(|&n| n == 0) {
            return untried as isize;
        }
        crate::policy::argmax(&self.bounds(t)) as isize
    }

    fn update(&mut self, arm: usize, reward: u8) {
        self.stats.update(arm, reward);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn tries_each_arm_once_in_index_order() {
        let mut p = Ucb1::new();
        p.reset(3, StdRng::seed_from_u64(0));
        for (t, expected) in [0, 1, 2].into_iter().enumerate() {
            assert_eq!(p.select_arm(t), expected);
            p.update(expected as usize, 0);
        }
    }

    #[test]
    fn prefers_higher_mean_at_equal_counts() {
        let mut p = Ucb1::new();
        p.reset(2, StdRng::seed_from_u64(0));
        for _ in 0..10 {
            p.update(0, 0);
            p.update(1, 1);
        }
        assert_eq!(p.select_arm(20), 1);
    }

    #[test]
    fn bonus_revisits_a_neglected_arm() {
        let mut p = Ucb1::new();
        p.reset(2, StdRng::seed_from_u64(0));
        p.update(0, 0);
        for _ in 0..200 {
            p.update(1, 1);
        }
        // Arm 1 has mean 1.0 but arm 0's bonus after one pull dominates for large t.
        let b = p.bounds(10_000);
        assert!(b[0] > b[1], "bounds={b:?}");
        assert_eq!(p.select_arm(10_000), 0);
    }

    #[test]
    fn zero_exploration_is_greedy() {
        let mut p = Ucb1::with_exploration(0.0);
        p.reset(2, StdRng::seed_from_u64(0));
        p.update(0, 0);
        p.update(1, 1);
        assert_eq!(p.select_arm(1_000_000), 1);
    }
}
