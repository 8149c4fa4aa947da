//! Bernoulli reward environment with an optional one-time drift.
//!
//! Each arm pays `1` with its current success probability and `0` otherwise.
//! A drift is a single hard switch from `means_pre` to `means_post` at
//! `drift_step`; there is no interpolation.
//!
//! The environment owns its random source. Policies never see it, which keeps a
//! run reproducible from the `(environment seed, policy seed)` pair alone.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Stochastic reward source over `k` Bernoulli arms.
#[derive(Debug, Clone)]
pub struct BernoulliBandit {
    means_pre: Vec<f64>,
    means_post: Option<Vec<f64>>,
    drift_step: Option<usize>,
    rng: StdRng,
}

impl BernoulliBandit {
    /// Stationary bandit seeded with `seed`.
    pub fn new(means: Vec<f64>, seed: u64) -> Result<Self> {
        Self::with_rng(means, None, None, StdRng::seed_from_u64(seed))
    }

    /// Bandit that switches to `means_post` at `drift_step`.
    pub fn with_drift(
        means_pre: Vec<f64>,
        means_post: Vec<f64>,
        drift_step: usize,
        seed: u64,
    ) -> Result<Self> {
        Self::with_rng(
            means_pre,
            Some(means_post),
            Some(drift_step),
            StdRng::seed_from_u64(seed),
        )
    }

    /// Fully general constructor.
    ///
    /// Fails before any run starts if the arm count is zero, a probability lies
    /// outside `[0, 1]`, or `means_post` has a different length than `means_pre`.
    /// A `drift_step` without `means_post` (or vice versa) means no drift.
    pub fn with_rng(
        means_pre: Vec<f64>,
        means_post: Option<Vec<f64>>,
        drift_step: Option<usize>,
        rng: StdRng,
    ) -> Result<Self> {
        if means_pre.is_empty() {
            return Err(Error::NoArms);
        }
        validate_probabilities(&means_pre)?;
        if let Some(post) = &means_post {
            if post.len() != means_pre.len() {
                return Err(Error::ShapeMismatch {
                    pre: means_pre.len(),
                    post: post.len(),
                });
            }
            validate_probabilities(post)?;
        }
        Ok(Self {
            means_pre,
            means_post,
            drift_step,
            rng,
        })
    }

    /// Number of arms.
    pub fn k(&self) -> usize {
        self.means_pre.len()
    }

    /// The drift step, if this environment actually drifts.
    pub fn drift_step(&self) -> Option<usize> {
        self.means_post.as_ref().and(self.drift_step)
    }

    /// Success probabilities in effect at step `t`.
    pub fn true_means(&self, t: usize) -> &[f64] {
        match (&self.means_post, self.drift_step) {
            (Some(post), Some(step)) if t >= step => post,
            _ => &self.means_pre,
        }
    }

    /// Expected reward of the best arm at step `t`.
    pub fn best_mean(&self, t: usize) -> f64 {
        self.true_means(t)
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Draw a `{0, 1}` reward for `arm` at step `t`.
    ///
    /// `arm` must be in `[0, k)`; the evaluator clips before calling.
    pub fn pull(&mut self, arm: usize, t: usize) -> u8 {
        let p = self.true_means(t)[arm];
        u8::from(self.rng.random::<f64>() < p)
    }
}

fn validate_probabilities(means: &[f64]) -> Result<()> {
    for (index, &value) in means.iter().enumerate() {
        if !(0.0..=1.0).contains(&value) {
            return Err(Error::InvalidProbability { index, value });
        }
    }
    Ok(())
}

/// A synthetic bandit with one clearly-best arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedBandit {
    pub means: Vec<f64>,
    pub best: usize,
}

/// Pre/post pair of independently generated bandits sharing `k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftPair {
    pub pre: GeneratedBandit,
    pub post: GeneratedBandit,
}

/// Default margin between the best arm and the runner-up.
pub const DEFAULT_GAP: f64 = 0.1;

/// Sample a "good" bandit: base rates uniform in `[0.05, 0.45]`, one arm picked
/// uniformly and lifted by `gap + uniform(0, 0.25)` above the best base rate,
/// capped at `0.95`.
///
/// For `gap <= 0.5` the chosen arm beats every other arm by at least `gap`.
pub fn make_random_bandit<R: Rng + ?Sized>(k: usize, rng: &mut R, gap: f64) -> GeneratedBandit {
    let k = k.max(1);
    let mut means: Vec<f64> = (0..k).map(|_| rng.random_range(0.05..0.45)).collect();
    let best = rng.random_range(0..k);
    let top = means
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != best)
        .map(|(_, &m)| m)
        .fold(means[best], f64::max);
    let lift = gap.max(0.0) + rng.random_range(0.0..0.25);
    means[best] = (top + lift).min(0.95);
    GeneratedBandit { means, best }
}

/// Sample independent pre- and post-drift bandits over the same `k` arms.
pub fn make_drift_pair<R: Rng + ?Sized>(k: usize, rng: &mut R) -> DriftPair {
    let pre = make_random_bandit(k, rng, DEFAULT_GAP);
    let post = make_random_bandit(k, rng, DEFAULT_GAP);
    DriftPair { pre, post }
}
