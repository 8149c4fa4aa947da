//! Scalar run statistics derived from a trajectory.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::evaluator::Trajectory;

/// Fraction of post-drift steps used as the recovery window.
pub const RECOVERY_FRACTION: f64 = 0.05;

/// Reduction of one trajectory. Always recomputable from the trajectory itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub system: String,
    pub steps: usize,
    pub cum_reward: u64,
    pub cum_regret: f64,
    /// Mean of the per-step switch flags.
    pub switch_rate: f64,
    /// Mean regret over the first `max(1, 5%)` post-drift steps.
    ///
    /// `None` when the drift did not happen inside the run, which is not the same
    /// thing as a measured zero.
    pub post_drift_regret_mean_5pct: Option<f64>,
    /// Mean regret over every post-drift step (`None` as above).
    pub post_drift_regret_mean_all: Option<f64>,
}

/// Summarize a non-empty trajectory.
///
/// Post-drift statistics are reported only when `drift_step` falls before the
/// end of the run.
pub fn summarize(traj: &Trajectory, drift_step: Option<usize>) -> Result<RunSummary> {
    let last = traj.last().ok_or(Error::EmptyTrajectory)?;
    let steps = traj.len();
    let switches = traj.rows().iter().filter(|r| r.switched).count();

    let post: Vec<f64> = match drift_step {
        Some(d) if d < steps => traj
            .rows()
            .iter()
            .filter(|r| r.t >= d)
            .map(|r| r.inst_regret)
            .collect(),
        _ => Vec::new(),
    };
    let (recovery, all) = if post.is_empty() {
        (None, None)
    } else {
        let w = ((RECOVERY_FRACTION * post.len() as f64) as usize).max(1);
        (Some(mean(&post[..w])), Some(mean(&post)))
    };

    Ok(RunSummary {
        system: traj.system().to_string(),
        steps,
        cum_reward: last.cum_reward,
        cum_regret: last.cum_regret,
        switch_rate: switches as f64 / steps as f64,
        post_drift_regret_mean_5pct: recovery,
        post_drift_regret_mean_all: all,
    })
}

pub(crate) fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}
