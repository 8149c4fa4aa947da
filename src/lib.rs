//! `iai-bandit`: a seedable multi-armed-bandit experimentation harness.
//!
//! Online decision policies compete in a Bernoulli environment that may shift its
//! reward distribution once, at a known step. An evaluator records every step as
//! a trajectory row and checks two invariants; a challenger reads finished
//! trajectories for signs of *strain*; and an evolutionary loop proposes policy
//! variants, scores them across seeds, and keeps a lineage of accepted ones.
//!
//! **Goals:**
//! - **Deterministic by default**: the same seeds produce bit-identical
//!   trajectories, in parallel or not.
//! - **Non-stationarity aware**: regret is charged against the means in effect at
//!   each step, and post-drift recovery is measured separately.
//! - **Soft failure inside runs**: out-of-range arms and exhausted budgets become
//!   violation records; a failing seed degrades its generation instead of
//!   aborting it. Only configuration errors are fatal.
//!
//! **Components (leaves first):**
//! - [`BernoulliBandit`] with [`make_random_bandit`] / [`make_drift_pair`]:
//!   the environment.
//! - [`Policy`]: `reset` / `select_arm` / `update`, implemented by
//!   [`EpsilonGreedy`], [`ThompsonSampling`], [`Ucb1`], [`FixedPolicy`] and the
//!   EXP3 meta-policy [`PolicySelector`]. [`PolicyConfig`] describes one
//!   serialisable candidate.
//! - [`Evaluator`]: runs one policy against one environment into a
//!   [`Trajectory`], accumulating [`Violation`]s.
//! - [`summarize`]: scalar [`RunSummary`] including post-drift recovery windows.
//! - [`Challenger`]: windowed strain signals, [`Critique`]s and
//!   [`ParameterSuggestion`]s.
//! - [`Judge`] / [`judge_with_timeout`] / [`ThresholdJudge`] / [`parse_verdict`]:
//!   the opaque accept/reject collaborator and its timeout wrapper.
//! - [`Orchestrator`]: the propose → evaluate → challenge → decide loop, producing
//!   an [`EvolutionReport`].
//! - [`TrajectorySink`] / [`JsonlSink`] / [`MemorySink`]: append-only output.
//!
//! **Non-goals:**
//! - No dashboards, no prompt construction, no HTTP clients.
//! - Persistence stops at JSONL trajectories and a JSON report.
//!
//! # Quick start
//!
//! ```rust
//! use iai_bandit::{summarize, BernoulliBandit, Evaluator, Policy, ThompsonSampling};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut env =
//!     BernoulliBandit::with_drift(vec![0.2, 0.8, 0.3], vec![0.7, 0.1, 0.3], 500, 7).unwrap();
//! let mut policy = ThompsonSampling::new();
//! policy.reset(env.k(), StdRng::seed_from_u64(7));
//!
//! let mut evaluator = Evaluator::unbounded();
//! let traj = evaluator.run(&mut policy, &mut env, 1_000, "thompson");
//! let summary = summarize(&traj, env.drift_step()).unwrap();
//!
//! assert_eq!(summary.steps, 1_000);
//! assert!(summary.cum_regret >= 0.0);
//! assert!(summary.post_drift_regret_mean_5pct.is_some());
//! ```
//!
//! # Regret and drift
//!
//! Instantaneous regret at step `t` is `max(true_means(t)) - true_means(t)[arm]`,
//! so a policy that keeps playing the pre-drift winner starts paying regret at
//! exactly `drift_step`. The summarizer's recovery window covers the first
//! `max(1, 5%)` of the post-drift segment; the challenger's covers the first
//! `window_size / 2` steps and compares it against the `window_size` steps just
//! before the drift.
//!
//! # Evolution
//!
//! Seeds within a generation share nothing: each owns its environment and policy
//! generator, derived from the harness seed with [`derive_seed`]. Environment
//! seeds depend only on the run index, so every candidate is compared on the same
//! worlds. See [`Orchestrator`] for the decision order.

#![forbid(unsafe_code)]

mod error;
pub use error::{Error, Result};

mod stable_hash;
pub use stable_hash::*;

mod environment;
pub use environment::*;

mod policy;
pub use policy::*;

mod greedy;
pub use greedy::*;

mod ucb;
pub use ucb::*;

mod thompson;
pub use thompson::*;

mod selector;
pub use selector::*;

mod evaluator;
pub use evaluator::*;

mod summary;
pub use summary::*;

mod challenger;
pub use challenger::*;

mod judge;
pub use judge::*;

mod config;
pub use config::*;

mod sink;
pub use sink::*;

mod evolution;
pub use evolution::*;
