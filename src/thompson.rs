//! Bernoulli Thompson sampling.
//!
//! Notes:
//! - Each arm keeps a `Beta(alpha, beta)` posterior starting at `Beta(1, 1)`.
//! - Selection draws one sample per arm and takes the argmax (lowest index on ties).
//! - The policy is **seedable**: the generator handed to `reset` fully determines
//!   its draws.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Beta, Distribution};

use crate::policy::{argmax, Policy};

/// Beta posterior state for one arm.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BetaStats {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for BetaStats {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }
}

impl BetaStats {
    pub fn expected_value(&self) -> f64 {
        let denom = self.alpha + self.beta;
        if denom <= 0.0 {
            0.5
        } else {
            self.alpha / denom
        }
    }
}

/// Seedable Thompson-sampling bandit over `{0, 1}` rewards.
#[derive(Debug, Clone)]
pub struct ThompsonSampling {
    stats: Vec<BetaStats>,
    rng: StdRng,
}

impl ThompsonSampling {
    pub fn new() -> Self {
        Self {
            stats: Vec::new(),
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Access the per-arm Beta stats.
    pub fn stats(&self) -> &[BetaStats] {
        &self.stats
    }

    fn sample_beta(&mut self, s: BetaStats) -> f64 {
        if !(s.alpha.is_finite() && s.beta.is_finite()) || s.alpha <= 0.0 || s.beta <= 0.0 {
            return 0.5;
        }
        match Beta::new(s.alpha, s.beta) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => 0.5,
        }
    }
}

impl Default for ThompsonSampling {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for ThompsonSampling {
    fn name(&self) -> &str {
        "thompson"
    }

    fn reset(&mut self, k: usize, rng: StdRng) {
        self.stats = vec![BetaStats::default(); k];
        self.rng = rng;
    }

    fn select_arm(&mut self, _t: usize) -> isize {
        let mut samples = Vec::with_capacity(self.stats.len());
        for i in 0..self.stats.len() {
            let s = self.stats[i];
            samples.push(self.sample_beta(s));
        }
        argmax(&samples) as isize
    }

    /// `alpha += 1` on success, `beta += 1` on failure.
    fn update(&mut self, arm: usize, reward: u8) {
        let Some(s) = self.stats.get_mut(arm) else {
            return;
        };
        if reward > 0 {
            s.alpha += 1.0;
        } else {
            s.beta += 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_installs_uniform_priors() {
        let mut ts = ThompsonSampling::new();
        ts.reset(3, StdRng::seed_from_u64(0));
        assert_eq!(ts.stats(), &[BetaStats::default(); 3]);
    }

    #[test]
    fn deterministic_choices_given_same_seed_and_state() {
        let mut t1 = ThompsonSampling::new();
        let mut t2 = ThompsonSampling::new();
        t1.reset(4, StdRng::seed_from_u64(42));
        t2.reset(4, StdRng::seed_from_u64(42));
        for t in 0..50 {
            let a = t1.select_arm(t);
            assert_eq!(a, t2.select_arm(t));
            t1.update(a as usize, (t % 3 == 0) as u8);
            t2.update(a as usize, (t % 3 == 0) as u8);
        }
    }

    #[test]
    fn update_moves_expected_value() {
        let mut ts = ThompsonSampling::new();
        ts.reset(2, StdRng::seed_from_u64(0));
        let before = ts.stats()[0].expected_value();
        for _ in 0..10 {
            ts.update(0, 1);
        }
        ts.update(1, 0);
        assert!(ts.stats()[0].expected_value() > before);
        assert_eq!(ts.stats()[1].beta, 2.0);
    }

    #[test]
    fn concentrates_on_a_dominant_posterior() {
        let mut ts = ThompsonSampling::new();
        ts.reset(3, StdRng::seed_from_u64(7));
        for _ in 0..200 {
            ts.update(1, 1);
            ts.update(0, 0);
            ts.update(2, 0);
        }
        let picks = (0..100).filter(|&t| ts.select_arm(t) == 1).count();
        assert!(picks >= 99, "picks={picks}");
    }
}
