//! Evaluator: drives one policy against one environment and records the
//! trajectory.
//!
//! The evaluator is the only component that sees both the policy's choices and
//! the environment's true means, so it owns regret accounting and invariant
//! checks. Two invariant violations are detected, both non-fatal:
//!
//! - **`InvalidAction`**: the policy returned an arm outside `[0, k)`. The arm is
//!   clipped into range and the run continues.
//! - **`BudgetExhaustion`**: the step about to run would exceed `max_steps`. The
//!   run stops and the partial trajectory is returned.
//!
//! Violations accumulate across every run of one evaluator instance.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::environment::BernoulliBandit;
use crate::policy::Policy;

/// One step of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRow {
    pub t: usize,
    pub arm: usize,
    pub reward: u8,
    pub cum_reward: u64,
    pub inst_regret: f64,
    pub cum_regret: f64,
    /// `true` iff `arm` differs from the previous step's arm (`false` at `t = 0`).
    pub switched: bool,
}

/// Ordered, append-only record of one run of one system.
///
/// Only the evaluator appends; a finished trajectory is read-only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trajectory {
    system: String,
    rows: Vec<TrajectoryRow>,
}

impl Trajectory {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            rows: Vec::new(),
        }
    }

    /// Rebuild a trajectory from `(t, arm, reward, inst_regret)` steps, e.g. a
    /// replayed log. Cumulative columns and switch flags are recomputed.
    pub fn from_steps(
        system: impl Into<String>,
        steps: impl IntoIterator<Item = (usize, usize, u8, f64)>,
    ) -> Self {
        let mut traj = Self::new(system);
        for (t, arm, reward, inst_regret) in steps {
            traj.push_step(t, arm, reward, inst_regret);
        }
        traj
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn rows(&self) -> &[TrajectoryRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&TrajectoryRow> {
        self.rows.last()
    }

    pub fn cum_reward(&self) -> u64 {
        self.last().map_or(0, |r| r.cum_reward)
    }

    pub fn cum_regret(&self) -> f64 {
        self.last().map_or(0.0, |r| r.cum_regret)
    }

    /// Append a row derived from the previous one.
    ///
    /// Cumulative columns and the switch flag are computed here so they can never
    /// disagree with the per-step values.
    pub(crate) fn push_step(&mut self, t: usize, arm: usize, reward: u8, inst_regret: f64) {
        let (cum_reward, cum_regret, switched) = match self.rows.last() {
            Some(prev) => (
                prev.cum_reward + u64::from(reward),
                prev.cum_regret + inst_regret,
                prev.arm != arm,
            ),
            None => (u64::from(reward), inst_regret, false),
        };
        self.rows.push(TrajectoryRow {
            t,
            arm,
            reward,
            cum_reward,
            inst_regret,
            cum_regret,
            switched,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    InvalidAction,
    BudgetExhaustion,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ViolationKind::InvalidAction => "invalid_action",
            ViolationKind::BudgetExhaustion => "budget_exhaustion",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub t: usize,
    pub system: String,
    pub kind: ViolationKind,
    pub description: String,
}

/// Runs policies against environments under a step budget.
#[derive(Debug, Clone)]
pub struct Evaluator {
    max_steps: usize,
    violations: Vec<Violation>,
}

impl Evaluator {
    /// Evaluator that refuses to run step `max_steps` or later.
    pub fn new(max_steps: usize) -> Self {
        Self {
            max_steps,
            violations: Vec::new(),
        }
    }

    /// Evaluator without a step ceiling.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Every violation recorded over this evaluator's lifetime, oldest first.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Run `policy` against `env` for up to `steps` steps.
    ///
    /// The policy must already be `reset` for `env.k()` arms. Given fixed seeds for
    /// the environment and the policy, the returned trajectory is reproducible.
    pub fn run<P: Policy + ?Sized>(
        &mut self,
        policy: &mut P,
        env: &mut BernoulliBandit,
        steps: usize,
        system_name: &str,
    ) -> Trajectory {
        let k = env.k();
        let mut traj = Trajectory::new(system_name);
        traj.rows.reserve(steps.min(self.max_steps));

        for t in 0..steps {
            if t >= self.max_steps {
                self.record(
                    t,
                    system_name,
                    ViolationKind::BudgetExhaustion,
                    format!("exceeded max steps {}", self.max_steps),
                );
                break;
            }

            let raw = policy.select_arm(t);
            let arm = if raw < 0 || raw as usize >= k {
                self.record(
                    t,
                    system_name,
                    ViolationKind::InvalidAction,
                    format!("selected arm {raw} out of bounds [0, {k})"),
                );
                raw.clamp(0, k as isize - 1) as usize
            } else {
                raw as usize
            };

            let reward = env.pull(arm, t);
            policy.update(arm, reward);

            let means = env.true_means(t);
            let best = means.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            traj.push_step(t, arm, reward, best - means[arm]);
        }
        traj
    }

    fn record(&mut self, t: usize, system: &str, kind: ViolationKind, description: String) {
        warn!(system, t, kind = %kind, %description, "invariant violation");
        self.violations.push(Violation {
            t,
            system: system.to_string(),
            kind,
            description,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ThompsonSampling, Ucb1};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct AlwaysMinusOne;

    impl Policy for AlwaysMinusOne {
        fn name(&self) -> &str {
            "broken"
        }
        fn reset(&mut self, _k: usize, _rng: StdRng) {}
        fn select_arm(&mut self, t: usize) -> isize {
            if t == 3 {
                -1
            } else {
                1
            }
        }
        fn update(&mut self, _arm: usize, _reward: u8) {}
    }

    fn env() -> BernoulliBandit {
        BernoulliBandit::with_drift(vec![0.2, 0.7, 0.4], vec![0.6, 0.1, 0.3], 50, 11).unwrap()
    }

    #[test]
    fn budget_exhaustion_truncates_with_one_violation() {
        let mut ev = Evaluator::new(500);
        let mut env = BernoulliBandit::new(vec![0.1, 0.9], 0).unwrap();
        let mut p = Ucb1::new();
        p.reset(2, StdRng::seed_from_u64(0));
        let traj = ev.run(&mut p, &mut env, 1000, "ucb1");
        assert_eq!(traj.len(), 500);
        assert_eq!(traj.last().unwrap().t, 499);
        assert_eq!(ev.violations().len(), 1);
        assert_eq!(ev.violations()[0].kind, ViolationKind::BudgetExhaustion);
        assert_eq!(ev.violations()[0].t, 500);
    }

    #[test]
    fn invalid_arm_is_clipped_and_run_continues() {
        let mut ev = Evaluator::unbounded();
        let mut e = env();
        let traj = ev.run(&mut AlwaysMinusOne, &mut e, 10, "broken");
        assert_eq!(traj.len(), 10);
        assert_eq!(traj.rows()[3].arm, 0);
        assert_eq!(ev.violations().len(), 1);
        assert_eq!(ev.violations()[0].kind, ViolationKind::InvalidAction);
        assert_eq!(ev.violations()[0].t, 3);
    }

    #[test]
    fn violations_accumulate_across_runs() {
        let mut ev = Evaluator::new(5);
        for _ in 0..3 {
            let mut e = env();
            ev.run(&mut AlwaysMinusOne, &mut e, 10, "broken");
        }
        // Each run: one invalid action at t=3 and one budget stop at t=5.
        assert_eq!(ev.violations().len(), 6);
    }

    #[test]
    fn regret_uses_means_in_effect_at_each_step() {
        let mut ev = Evaluator::unbounded();
        let mut e = env();
        let mut p = crate::FixedPolicy::new(1);
        p.reset(3, StdRng::seed_from_u64(0));
        let traj = ev.run(&mut p, &mut e, 100, "fixed");
        assert_eq!(traj.rows()[49].inst_regret, 0.0);
        assert!((traj.rows()[50].inst_regret - 0.5).abs() < 1e-12);
        assert!((traj.cum_regret() - 50.0 * 0.5).abs() < 1e-9);
    }

    #[test]
    fn switched_flag_tracks_arm_changes() {
        let mut ev = Evaluator::unbounded();
        let mut e = env();
        let mut p = ThompsonSampling::new();
        p.reset(3, StdRng::seed_from_u64(4));
        let traj = ev.run(&mut p, &mut e, 200, "thompson");
        assert!(!traj.rows()[0].switched);
        for w in traj.rows().windows(2) {
            assert_eq!(w[1].switched, w[0].arm != w[1].arm);
        }
    }

    #[test]
    fn from_steps_recomputes_cumulative_columns() {
        let steps = [(0, 1, 1, 0.0), (1, 1, 0, 0.2), (2, 0, 1, 0.1)];
        let traj = Trajectory::from_steps("replay", steps);
        assert_eq!(traj.system(), "replay");
        let last = traj.last().unwrap();
        assert_eq!(last.cum_reward, 2);
        assert!((last.cum_regret - 0.3).abs() < 1e-12);
        let switched: Vec<bool> = traj.rows().iter().map(|r| r.switched).collect();
        assert_eq!(switched, vec![false, false, true]);
    }

    #[test]
    fn zero_budget_returns_empty_trajectory() {
        let mut ev = Evaluator::new(0);
        let mut e = env();
        let mut p = Ucb1::new();
        p.reset(3, StdRng::seed_from_u64(0));
        let traj = ev.run(&mut p, &mut e, 10, "ucb1");
        assert!(traj.is_empty());
        assert_eq!(ev.violations().len(), 1);
    }
}
