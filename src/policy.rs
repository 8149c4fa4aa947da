//! The `Policy` contract shared by every decision-maker.
//!
//! The evaluator and the orchestrator only ever see `dyn Policy`; they never
//! branch on which variant they are driving. Configurations that the evolution
//! loop mutates are described by the serialisable [`PolicyConfig`].

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{EpsilonGreedy, PolicySelector, ThompsonSampling, Ucb1};

/// Common interface for stateful online bandit policies.
///
/// # Example
///
/// ```rust
/// use iai_bandit::{Policy, Ucb1};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// fn run<P: Policy + ?Sized>(policy: &mut P) {
///     policy.reset(3, StdRng::seed_from_u64(0));
///     for t in 0..10 {
///         let arm = policy.select_arm(t) as usize;
///         policy.update(arm, 1);
///     }
/// }
///
/// run(&mut Ucb1::default());
/// ```
pub trait Policy: Send {
    /// Stable system name used in trajectories and logs.
    fn name(&self) -> &str;

    /// Reinitialize per-arm statistics to a neutral prior for `k` arms and take
    /// ownership of `rng`.
    ///
    /// Must be called before the first `select_arm` and before every new run.
    fn reset(&mut self, k: usize, rng: StdRng);

    /// Choose an arm for step `t`.
    ///
    /// Well-behaved policies return a value in `[0, k)`. The return type is
    /// signed so that a misbehaving policy is detectable instead of wrapping.
    fn select_arm(&mut self, t: usize) -> isize;

    /// Incorporate one observed `{0, 1}` reward for `arm`.
    fn update(&mut self, arm: usize, reward: u8);
}

impl<P: Policy + ?Sized> Policy for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn reset(&mut self, k: usize, rng: StdRng) {
        (**self).reset(k, rng)
    }
    fn select_arm(&mut self, t: usize) -> isize {
        (**self).select_arm(t)
    }
    fn update(&mut self, arm: usize, reward: u8) {
        (**self).update(arm, reward)
    }
}

/// Running pull counts and incremental mean rewards per arm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningMeans {
    counts: Vec<u64>,
    values: Vec<f64>,
}

impl RunningMeans {
    pub fn new(k: usize) -> Self {
        Self {
            counts: vec![0; k],
            values: vec![0.0; k],
        }
    }

    pub fn k(&self) -> usize {
        self.counts.len()
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// `mean += (reward - mean) / n`. Out-of-range arms are ignored.
    pub fn update(&mut self, arm: usize, reward: u8) {
        let (Some(n), Some(v)) = (self.counts.get_mut(arm), self.values.get_mut(arm)) else {
            return;
        };
        *n += 1;
        *v += (f64::from(reward) - *v) / (*n as f64);
    }

    /// Arm with the highest mean; ties go to the lowest index.
    pub fn best_arm(&self) -> usize {
        argmax(&self.values)
    }
}

/// Index of the maximum value, lowest index on ties. Empty input yields `0`.
pub(crate) fn argmax(xs: &[f64]) -> usize {
    let mut best = 0;
    let mut best_x = f64::NEG_INFINITY;
    for (i, &x) in xs.iter().enumerate() {
        if x > best_x {
            best = i;
            best_x = x;
        }
    }
    best
}

/// Static baseline: always plays one configured arm, never learns.
#[derive(Debug, Clone, Default)]
pub struct FixedPolicy {
    arm: usize,
    configured: usize,
}

impl FixedPolicy {
    pub fn new(arm: usize) -> Self {
        Self {
            arm,
            configured: arm,
        }
    }
}

impl Policy for FixedPolicy {
    fn name(&self) -> &str {
        "fixed"
    }

    fn reset(&mut self, k: usize, _rng: StdRng) {
        self.arm = if self.configured < k {
            self.configured
        } else {
            0
        };
    }

    fn select_arm(&mut self, _t: usize) -> isize {
        self.arm as isize
    }

    fn update(&mut self, _arm: usize, _reward: u8) {}
}

/// Serialisable description of one candidate policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum PolicyConfig {
    EpsilonGreedy { epsilon: f64 },
    Thompson,
    Ucb1 { exploration: f64 },
    Fixed { arm: usize },
    Selector { gamma: f64 },
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig::EpsilonGreedy { epsilon: 0.1 }
    }
}

impl PolicyConfig {
    /// Name of the policy this configuration builds.
    pub fn name(&self) -> &'static str {
        match self {
            PolicyConfig::EpsilonGreedy { .. } => "epsilon_greedy",
            PolicyConfig::Thompson => "thompson",
            PolicyConfig::Ucb1 { .. } => "ucb1",
            PolicyConfig::Fixed { .. } => "fixed",
            PolicyConfig::Selector { .. } => "iai_selector",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            PolicyConfig::EpsilonGreedy { epsilon } if !(0.0..=1.0).contains(&epsilon) => Err(
                Error::InvalidConfig(format!("epsilon {epsilon} is outside [0, 1]")),
            ),
            PolicyConfig::Ucb1 { exploration }
                if !(exploration.is_finite() && exploration >= 0.0) =>
            {
                Err(Error::InvalidConfig(format!(
                    "ucb exploration {exploration} must be finite and >= 0"
                )))
            }
            PolicyConfig::Selector { gamma } if !(gamma > 0.0 && gamma <= 1.0) => Err(
                Error::InvalidConfig(format!("selector gamma {gamma} is outside (0, 1]")),
            ),
            _ => Ok(()),
        }
    }

    /// Construct a fresh (not yet reset) policy.
    pub fn build(&self) -> Result<Box<dyn Policy>> {
        self.validate()?;
        Ok(match *self {
            PolicyConfig::EpsilonGreedy { epsilon } => Box::new(EpsilonGreedy::new(epsilon)),
            PolicyConfig::Thompson => Box::new(ThompsonSampling::default()),
            PolicyConfig::Ucb1 { exploration } => Box::new(Ucb1::with_exploration(exploration)),
            PolicyConfig::Fixed { arm } => Box::new(FixedPolicy::new(arm)),
            PolicyConfig::Selector { gamma } => Box::new(PolicySelector::with_default_menu(gamma)),
        })
    }
}
