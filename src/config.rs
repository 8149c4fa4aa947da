//! Harness configuration surface.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::challenger::ChallengerConfig;
use crate::error::{Error, Result};
use crate::judge::Strictness;
use crate::policy::PolicyConfig;

/// Every tunable of one experiment: environment shape, run length, evolution
/// budget, and acceptance gate.
///
/// Missing fields in a JSON file take their [`Default`] values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Arm count.
    pub k: usize,
    /// Exploration rate of the epsilon-greedy baseline and the initial candidate.
    pub epsilon: f64,
    /// Challenger window length.
    pub window_size: usize,
    pub drift_step: Option<usize>,
    /// Evaluator step ceiling; `None` means `n_steps` is the only limit.
    pub max_steps: Option<usize>,
    pub n_steps: usize,
    /// Seeds per generation.
    pub n_runs: usize,
    pub n_generations: usize,
    pub strictness: Strictness,
    /// Allowed increase in mean strain signals per seed over the incumbent.
    pub strain_tolerance: f64,
    /// Stop after this many consecutive rejections.
    pub patience: Option<usize>,
    pub judge_timeout_ms: u64,
    pub seed: u64,
    /// Evaluate the fixed baseline systems before evolving.
    pub run_baseline: bool,
    /// Evaluate seeds on the rayon pool.
    pub parallel: bool,
    /// Generation-0 configuration; defaults to epsilon-greedy at `epsilon`.
    pub initial: Option<PolicyConfig>,
    /// Probability that a mutation switches policy family.
    pub family_hop: f64,
    pub challenger: ChallengerConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            k: 5,
            epsilon: 0.1,
            window_size: 1000,
            drift_step: Some(7000),
            max_steps: None,
            n_steps: 10_000,
            n_runs: 3,
            n_generations: 5,
            strictness: Strictness::Balanced,
            strain_tolerance: 0.5,
            patience: None,
            judge_timeout_ms: 30_000,
            seed: 42,
            run_baseline: true,
            parallel: true,
            initial: None,
            family_hop: 0.15,
            challenger: ChallengerConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s).map_err(Error::Config)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(Error::InvalidConfig(msg));
        if self.k == 0 {
            return Err(Error::NoArms);
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return bad(format!("epsilon {} is outside [0, 1]", self.epsilon));
        }
        if self.window_size == 0 {
            return bad("window_size must be positive".into());
        }
        if self.n_steps == 0 {
            return bad("n_steps must be positive".into());
        }
        if self.n_runs == 0 {
            return bad("n_runs must be positive".into());
        }
        if !(self.strain_tolerance >= 0.0) {
            return bad(format!("strain_tolerance {} must be >= 0", self.strain_tolerance));
        }
        if !(0.0..=1.0).contains(&self.family_hop) {
            return bad(format!("family_hop {} is outside [0, 1]", self.family_hop));
        }
        if self.patience == Some(0) {
            return bad("patience must be at least 1 when set".into());
        }
        if let Some(p) = &self.initial {
            p.validate()?;
        }
        self.challenger_config().validate()
    }

    /// The configuration generation 0 evaluates.
    pub fn initial_policy(&self) -> PolicyConfig {
        self.initial.clone().unwrap_or(PolicyConfig::EpsilonGreedy {
            epsilon: self.epsilon,
        })
    }

    /// Challenger settings with the harness-level window and drift applied.
    pub fn challenger_config(&self) -> ChallengerConfig {
        ChallengerConfig {
            window_size: self.window_size,
            drift_step: self.drift_step,
            ..self.challenger.clone()
        }
    }

    /// Effective per-run step ceiling.
    pub fn step_budget(&self) -> usize {
        self.max_steps.unwrap_or(usize::MAX)
    }
}
