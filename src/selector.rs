//! EXP3 meta-policy over a fixed menu of base policies.
//!
//! A bounded form of self-improvement: the action space stays the bandit arms and
//! rewards still come from the environment; the selector only adapts weights over
//! *which* base policy gets to choose. Every base policy learns from every
//! observation, so a rarely-chosen policy is never starved of data.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::policy::Policy;
use crate::{EpsilonGreedy, ThompsonSampling, Ucb1};

/// EXP3 over base policies.
pub struct PolicySelector {
    base: Vec<Box<dyn Policy>>,
    gamma: f64,
    weights: Vec<f64>,
    chosen: Vec<u64>,
    last: Option<usize>,
    rng: StdRng,
}

impl std::fmt::Debug for PolicySelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicySelector")
            .field("base", &self.base.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("gamma", &self.gamma)
            .field("weights", &self.weights)
            .field("chosen", &self.chosen)
            .finish()
    }
}

impl PolicySelector {
    /// Selector over `base` with uniform-mixing rate `gamma` in `(0, 1]`.
    pub fn new(base: Vec<Box<dyn Policy>>, gamma: f64) -> Self {
        let m = base.len();
        Self {
            base,
            gamma: if gamma.is_finite() { gamma.clamp(1e-6, 1.0) } else { 0.05 },
            weights: vec![1.0; m],
            chosen: vec![0; m],
            last: None,
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Epsilon-greedy(0.1), UCB1 and Thompson sampling.
    pub fn with_default_menu(gamma: f64) -> Self {
        Self::new(
            vec![
                Box::new(EpsilonGreedy::new(0.1)),
                Box::new(Ucb1::new()),
                Box::new(ThompsonSampling::new()),
            ],
            gamma,
        )
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// How often each base policy (menu order) was delegated to since the last reset.
    pub fn selection_counts(&self) -> Vec<(&str, u64)> {
        self.base
            .iter()
            .zip(&self.chosen)
            .map(|(p, &n)| (p.name(), n))
            .collect()
    }

    /// `(1 - gamma) * w_i / sum(w) + gamma / m`.
    pub fn probabilities(&self) -> Vec<f64> {
        let m = self.weights.len() as f64;
        let total: f64 = self.weights.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return vec![1.0 / m; self.weights.len()];
        }
        self.weights
            .iter()
            .map(|w| (1.0 - self.gamma) * (w / total) + self.gamma / m)
            .collect()
    }

    fn sample_index(&mut self, probs: &[f64]) -> usize {
        let r: f64 = self.rng.random();
        let mut cdf = 0.0;
        for (i, &p) in probs.iter().enumerate() {
            cdf += p;
            if r < cdf {
                return i;
            }
        }
        probs.len().saturating_sub(1)
    }
}

impl Policy for PolicySelector {
    fn name(&self) -> &str {
        "iai_selector"
    }

    fn reset(&mut self, k: usize, mut rng: StdRng) {
        for p in &mut self.base {
            let seed: u64 = rng.random();
            p.reset(k, StdRng::seed_from_u64(seed));
        }
        self.weights = vec![1.0; self.base.len()];
        self.chosen = vec![0; self.base.len()];
        self.last = None;
        self.rng = rng;
    }

    fn select_arm(&mut self, t: usize) -> isize {
        if self.base.is_empty() {
            return 0;
        }
        let probs = self.probabilities();
        let idx = self.sample_index(&probs);
        self.last = Some(idx);
        self.chosen[idx] += 1;
        self.base[idx].select_arm(t)
    }

    fn update(&mut self, arm: usize, reward: u8) {
        for p in &mut self.base {
            p.update(arm, reward);
        }
        let Some(idx) = self.last else {
            return;
        };
        let probs = self.probabilities();
        let m = self.weights.len() as f64;
        let x_hat = f64::from(reward) / probs[idx].max(f64::MIN_POSITIVE);
        self.weights[idx] *= (self.gamma * x_hat / m).exp();

        // Only ratios matter; keep the largest weight at 1.
        let max_w = self.weights.iter().copied().fold(0.0, f64::max);
        if max_w.is_finite() && max_w > 0.0 {
            for w in &mut self.weights {
                *w /= max_w;
            }
        } else {
            self.weights.fill(1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FixedPolicy;

    #[test]
    fn probabilities_form_a_distribution_with_floor() {
        let mut s = PolicySelector::with_default_menu(0.3);
        s.reset(3, StdRng::seed_from_u64(1));
        for t in 0..200 {
            let a = s.select_arm(t) as usize;
            s.update(a, (t % 2) as u8);
            let p = s.probabilities();
            let sum: f64 = p.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "sum={sum}");
            assert!(p.iter().all(|&x| x >= 0.3 / 3.0 - 1e-12));
        }
    }

    #[test]
    fn shifts_weight_toward_the_policy_that_earns_reward() {
        // Base 0 always plays the paying arm, base 1 never does.
        let mut s = PolicySelector::new(
            vec![Box::new(FixedPolicy::new(1)), Box::new(FixedPolicy::new(0))],
            0.1,
        );
        s.reset(2, StdRng::seed_from_u64(3));
        for t in 0..2_000 {
            let a = s.select_arm(t) as usize;
            s.update(a, u8::from(a == 1));
        }
        let p = s.probabilities();
        assert!(p[0] > 0.9, "p={p:?}");
        let counts = s.selection_counts();
        assert_eq!(counts[0].0, "fixed");
        assert!(counts[0].1 > counts[1].1);
    }

    #[test]
    fn long_runs_keep_weights_finite() {
        let mut s = PolicySelector::new(vec![Box::new(FixedPolicy::new(0))], 0.05);
        s.reset(1, StdRng::seed_from_u64(0));
        for t in 0..50_000 {
            let a = s.select_arm(t) as usize;
            s.update(a, 1);
        }
        assert!(s.probabilities().iter().all(|p| p.is_finite()));
    }

    #[test]
    fn reset_is_reproducible() {
        let run = |seed| {
            let mut s = PolicySelector::with_default_menu(0.05);
            s.reset(4, StdRng::seed_from_u64(seed));
            (0..300)
                .map(|t| {
                    let a = s.select_arm(t);
                    s.update(a as usize, (t % 5 == 0) as u8);
                    a
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(11), run(11));
    }
}
