//! Evolution orchestrator: propose, evaluate across seeds, challenge, decide.
//!
//! Each generation runs a candidate [`PolicyConfig`] on `n_runs` seeded worlds.
//! Environment seeds depend only on the run index, so every generation (and the
//! baseline systems) faces the same worlds and scores are directly comparable.
//!
//! Decision order for a candidate:
//!
//! 1. zero successful seeds: reject;
//! 2. mean strain per seed above the incumbent's by more than `strain_tolerance`:
//!    reject;
//! 3. otherwise ask the [`Judge`] (bounded by `judge_timeout_ms`); accept iff it
//!    concurs. An unavailable judge is a reject.
//!
//! The first candidate to succeed while there is no incumbent is accepted
//! without judgment. The loop stops after `n_generations`, or earlier once
//! `patience` consecutive generations have been rejected.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::challenger::{signal_rates, Challenger, Parameter, ParameterSuggestion, StrainAnalysis};
use crate::config::HarnessConfig;
use crate::environment::{make_drift_pair, BernoulliBandit};
use crate::error::{Error, Result};
use crate::evaluator::{Evaluator, Trajectory};
use crate::judge::{panic_message, try_judge_with_timeout, Evidence, Judge, Judgment};
use crate::policy::{Policy, PolicyConfig};
use crate::sink::TrajectorySink;
use crate::stable_hash::derive_seed;
use crate::summary::{mean, summarize, RunSummary};

/// Builds a fresh policy for one seed.
pub type PolicyFactory = Arc<dyn Fn(&PolicyConfig) -> Result<Box<dyn Policy>> + Send + Sync>;

/// Everything one successful seed produced.
#[derive(Debug, Clone)]
pub struct SeedOutcome {
    pub run: usize,
    pub trajectory: Trajectory,
    pub summary: RunSummary,
    pub analysis: StrainAnalysis,
    pub violations: usize,
}

/// Aggregate over the successful seeds of one evaluation.
///
/// Means are `0.0` when `seeds_ok == 0`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationScore {
    pub seeds_ok: usize,
    pub seeds_failed: usize,
    pub mean_regret: f64,
    pub mean_reward: f64,
    /// Mean count of positive strain signals per seed.
    pub mean_strain: f64,
    pub mean_switch_rate: f64,
    /// Mean of the post-drift recovery-window regret over seeds that saw drift.
    pub mean_post_drift_regret: Option<f64>,
    pub violations: usize,
}

impl GenerationScore {
    pub fn from_outcomes(outcomes: &[SeedOutcome], seeds_failed: usize) -> Self {
        let post: Vec<f64> = outcomes
            .iter()
            .filter_map(|o| o.summary.post_drift_regret_mean_5pct)
            .collect();
        Self {
            seeds_ok: outcomes.len(),
            seeds_failed,
            mean_regret: mean_of(outcomes, |o| o.summary.cum_regret),
            mean_reward: mean_of(outcomes, |o| o.summary.cum_reward as f64),
            mean_strain: mean_of(outcomes, |o| o.analysis.strain_count() as f64),
            mean_switch_rate: mean_of(outcomes, |o| o.summary.switch_rate),
            mean_post_drift_regret: (!post.is_empty()).then(|| mean(&post)),
            violations: outcomes.iter().map(|o| o.violations).sum(),
        }
    }
}

fn mean_of(outcomes: &[SeedOutcome], f: impl Fn(&SeedOutcome) -> f64) -> f64 {
    mean(&outcomes.iter().map(f).collect::<Vec<_>>())
}

/// Result of evaluating one configuration on every seed.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub config: PolicyConfig,
    pub outcomes: Vec<SeedOutcome>,
    /// One line per failed seed.
    pub failures: Vec<String>,
    pub score: GenerationScore,
}

impl Evaluation {
    /// Deduplicated suggestions from every seed, first occurrence wins.
    pub fn suggestions(&self) -> Vec<ParameterSuggestion> {
        let mut out: Vec<ParameterSuggestion> = Vec::new();
        for s in self.outcomes.iter().flat_map(|o| &o.analysis.suggestions) {
            if !out
                .iter()
                .any(|x| x.parameter == s.parameter && x.direction == s.direction)
            {
                out.push(s.clone());
            }
        }
        out
    }

    /// Per-seed challenger output, in run order.
    pub fn analyses(&self) -> Vec<StrainAnalysis> {
        self.outcomes.iter().map(|o| o.analysis.clone()).collect()
    }

    pub fn critiques(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .flat_map(|o| {
                o.analysis
                    .critiques
                    .iter()
                    .map(move |c| format!("run {}: {c}", o.run))
            })
            .collect()
    }
}

/// One entry of the lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub index: usize,
    pub config: PolicyConfig,
    pub score: GenerationScore,
    pub accepted: bool,
    pub reason: String,
    pub critiques: Vec<String>,
    pub suggestions: Vec<ParameterSuggestion>,
    pub failures: Vec<String>,
}

/// Append-only record of every generation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Lineage {
    generations: Vec<Generation>,
}

impl Lineage {
    pub fn generations(&self) -> &[Generation] {
        &self.generations
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    /// The most recently accepted generation.
    pub fn current_best(&self) -> Option<&Generation> {
        self.generations.iter().rev().find(|g| g.accepted)
    }

    fn push(&mut self, g: Generation) {
        self.generations.push(g);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxGenerations,
    /// `rejected` consecutive generations were rejected.
    Patience { rejected: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineSystem {
    pub config: PolicyConfig,
    pub score: GenerationScore,
}

/// Reference systems evaluated on the same seeds as the lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub systems: Vec<BaselineSystem>,
    pub best_system: Option<String>,
    pub best_regret: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionReport {
    pub lineage: Lineage,
    pub baseline: Option<Baseline>,
    pub stop_reason: StopReason,
    pub accepted: usize,
    pub rejected: usize,
    pub judge_unavailable: usize,
    pub degraded_seeds: usize,
    pub sink_errors: usize,
}

impl EvolutionReport {
    pub fn best(&self) -> Option<&Generation> {
        self.lineage.current_best()
    }
}

/// Drives the generational loop.
pub struct Orchestrator {
    cfg: HarnessConfig,
    factory: PolicyFactory,
    judge: Arc<dyn Judge>,
    sink: Option<Box<dyn TrajectorySink>>,
    baseline_regret: Option<f64>,
    rng: StdRng,
    degraded_seeds: usize,
    sink_errors: usize,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("cfg", &self.cfg)
            .field("baseline_regret", &self.baseline_regret)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl Orchestrator {
    /// Validates `cfg`; configuration errors surface here, before any run.
    pub fn new(cfg: HarnessConfig, judge: Arc<dyn Judge>) -> Result<Self> {
        cfg.validate()?;
        let rng = StdRng::seed_from_u64(derive_seed(cfg.seed, "mutation", 0));
        Ok(Self {
            cfg,
            factory: Arc::new(|c: &PolicyConfig| c.build()),
            judge,
            sink: None,
            baseline_regret: None,
            rng,
            degraded_seeds: 0,
            sink_errors: 0,
        })
    }

    /// Replace how policies are built from configurations.
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&PolicyConfig) -> Result<Box<dyn Policy>> + Send + Sync + 'static,
    {
        self.factory = Arc::new(factory);
        self
    }

    pub fn with_sink(mut self, sink: impl TrajectorySink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.cfg
    }

    /// Baseline regret the challenger compares against, if any.
    pub fn baseline_regret(&self) -> Option<f64> {
        self.cfg.challenger.baseline_regret.or(self.baseline_regret)
    }

    fn challenger(&self) -> Challenger {
        let mut c = self.cfg.challenger_config();
        c.baseline_regret = self.baseline_regret();
        Challenger::new(c)
    }

    /// Run the whole loop.
    pub fn run(&mut self) -> EvolutionReport {
        let baseline = self.cfg.run_baseline.then(|| self.run_baseline());

        let mut lineage = Lineage::default();
        let mut incumbent: Option<(PolicyConfig, GenerationScore, Vec<ParameterSuggestion>)> = None;
        let mut accepted = 0;
        let mut rejected = 0;
        let mut judge_unavailable = 0;
        let mut streak = 0;
        let mut stop_reason = StopReason::MaxGenerations;

        for index in 0..self.cfg.n_generations {
            let candidate = match &incumbent {
                None if index == 0 => self.cfg.initial_policy(),
                None => {
                    let seed_config = self.cfg.initial_policy();
                    self.mutate(&seed_config, &[])
                }
                Some((parent, _, hints)) => {
                    let (parent, hints) = (parent.clone(), hints.clone());
                    self.mutate(&parent, &hints)
                }
            };
            info!(generation = index, candidate = ?candidate, "generation start");

            let eval = self.evaluate(&candidate);
            let judgment = match &incumbent {
                _ if eval.score.seeds_ok == 0 => Judgment::reject(format!(
                    "no successful seeds ({} failed)",
                    eval.score.seeds_failed
                )),
                None => Judgment::accept("first successful configuration"),
                Some((_, inc, _))
                    if eval.score.mean_strain > inc.mean_strain + self.cfg.strain_tolerance =>
                {
                    Judgment::reject(format!(
                        "mean strain {:.2} exceeds incumbent {:.2} + tolerance {:.2}",
                        eval.score.mean_strain, inc.mean_strain, self.cfg.strain_tolerance
                    ))
                }
                Some((_, inc, _)) => {
                    let analyses = eval.analyses();
                    let evidence = Evidence {
                        generation: index,
                        candidate: candidate.clone(),
                        candidate_regret: eval.score.mean_regret,
                        candidate_strain: eval.score.mean_strain,
                        incumbent_regret: Some(inc.mean_regret),
                        incumbent_strain: Some(inc.mean_strain),
                        baseline_regret: self.baseline_regret(),
                        signal_rates: signal_rates(&analyses),
                        analyses,
                        critiques: eval.critiques(),
                        suggestions: eval.suggestions(),
                    };
                    try_judge_with_timeout(
                        Arc::clone(&self.judge),
                        &evidence,
                        self.cfg.strictness,
                        Duration::from_millis(self.cfg.judge_timeout_ms),
                    )
                    .unwrap_or_else(|e| {
                        warn!(generation = index, error = %e, "judgment unavailable");
                        judge_unavailable += 1;
                        Judgment::unavailable(&e)
                    })
                }
            };

            info!(
                generation = index,
                accepted = judgment.accept,
                mean_regret = eval.score.mean_regret,
                mean_strain = eval.score.mean_strain,
                reason = %judgment.reason,
                "generation decided"
            );

            let suggestions = eval.suggestions();
            if judgment.accept {
                accepted += 1;
                streak = 0;
                incumbent = Some((candidate.clone(), eval.score.clone(), suggestions.clone()));
            } else {
                rejected += 1;
                streak += 1;
            }
            lineage.push(Generation {
                index,
                critiques: eval.critiques(),
                config: candidate,
                score: eval.score,
                accepted: judgment.accept,
                reason: judgment.reason,
                suggestions,
                failures: eval.failures,
            });

            if let Some(p) = self.cfg.patience {
                if streak >= p {
                    stop_reason = StopReason::Patience { rejected: streak };
                    break;
                }
            }
        }

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.flush() {
                warn!(error = %e, "trajectory sink flush failed");
                self.sink_errors += 1;
            }
        }

        info!(
            generations = lineage.len(),
            accepted,
            rejected,
            stop = ?stop_reason,
            best = ?lineage.current_best().map(|g| &g.config),
            "evolution finished"
        );

        EvolutionReport {
            lineage,
            baseline,
            stop_reason,
            accepted,
            rejected,
            judge_unavailable,
            degraded_seeds: self.degraded_seeds,
            sink_errors: self.sink_errors,
        }
    }

    /// Evaluate Thompson sampling, UCB1 and epsilon-greedy on the lineage's seeds.
    ///
    /// Unless the challenger already has an explicit baseline, the best mean
    /// regret becomes its `baseline_regret` from here on.
    pub fn run_baseline(&mut self) -> Baseline {
        let systems: Vec<BaselineSystem> = [
            PolicyConfig::Thompson,
            PolicyConfig::Ucb1 { exploration: 1.0 },
            PolicyConfig::EpsilonGreedy {
                epsilon: self.cfg.epsilon,
            },
        ]
        .into_iter()
        .map(|config| {
            let eval = self.evaluate(&config);
            info!(system = config.name(), mean_regret = eval.score.mean_regret, "baseline");
            BaselineSystem {
                config,
                score: eval.score,
            }
        })
        .collect();

        let best = systems
            .iter()
            .filter(|s| s.score.seeds_ok > 0)
            .min_by(|a, b| a.score.mean_regret.total_cmp(&b.score.mean_regret));
        let best_system = best.map(|s| s.config.name().to_string());
        let best_regret = best.map(|s| s.score.mean_regret);
        self.baseline_regret = best_regret;

        Baseline {
            systems,
            best_system,
            best_regret,
        }
    }

    /// Evaluate `config` on every seed. Failed seeds are logged and skipped.
    pub fn evaluate(&mut self, config: &PolicyConfig) -> Evaluation {
        let challenger = self.challenger();
        let cfg = &self.cfg;
        let factory = &self.factory;
        let one = |run: usize| {
            isolate(run, || evaluate_seed(cfg, factory, &challenger, config, run))
        };

        let results: Vec<Result<SeedOutcome>> = if cfg.parallel {
            (0..cfg.n_runs).into_par_iter().map(one).collect()
        } else {
            (0..cfg.n_runs).map(one).collect()
        };

        let mut outcomes = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for res in results {
            match res {
                Ok(o) => {
                    debug!(
                        system = config.name(),
                        run = o.run,
                        cum_regret = o.summary.cum_regret,
                        strain = o.analysis.strain_count(),
                        "seed done"
                    );
                    outcomes.push(o);
                }
                Err(e) => {
                    warn!(system = config.name(), error = %e, "degraded seed");
                    failures.push(e.to_string());
                }
            }
        }
        self.degraded_seeds += failures.len();

        if let Some(sink) = self.sink.as_mut() {
            for o in &outcomes {
                if let Err(e) = sink.append(&o.trajectory) {
                    warn!(run = o.run, error = %e, "trajectory sink append failed");
                    self.sink_errors += 1;
                }
            }
        }

        let score = GenerationScore::from_outcomes(&outcomes, failures.len());
        Evaluation {
            config: config.clone(),
            outcomes,
            failures,
            score,
        }
    }

    /// Propose a child of `parent`.
    ///
    /// Challenger suggestions for the parent's tunable take priority; otherwise
    /// the tunable is scaled by a factor in `[0.5, 1.5)`. Parameterless parents,
    /// and a `family_hop` fraction of the rest, switch to another family instead.
    pub fn mutate(&mut self, parent: &PolicyConfig, hints: &[ParameterSuggestion]) -> PolicyConfig {
        let parameterless = matches!(parent, PolicyConfig::Thompson | PolicyConfig::Fixed { .. });
        if parameterless || self.rng.random_bool(self.cfg.family_hop) {
            return self.hop_family(parent);
        }
        match *parent {
            PolicyConfig::EpsilonGreedy { epsilon } => PolicyConfig::EpsilonGreedy {
                epsilon: self.tweak(epsilon, Some(Parameter::Epsilon), hints).clamp(0.01, 0.5),
            },
            PolicyConfig::Selector { gamma } => PolicyConfig::Selector {
                gamma: self.tweak(gamma, Some(Parameter::Gamma), hints).clamp(0.01, 0.3),
            },
            PolicyConfig::Ucb1 { exploration } => PolicyConfig::Ucb1 {
                exploration: self.tweak(exploration, None, hints).clamp(0.1, 3.0),
            },
            PolicyConfig::Thompson | PolicyConfig::Fixed { .. } => self.hop_family(parent),
        }
    }

    fn tweak(
        &mut self,
        value: f64,
        param: Option<Parameter>,
        hints: &[ParameterSuggestion],
    ) -> f64 {
        let hinted = param
            .and_then(|p| hints.iter().find(|h| h.parameter == p && !h.values.is_empty()));
        match hinted {
            Some(h) => h.values[self.rng.random_range(0..h.values.len())],
            None => value * self.rng.random_range(0.5..1.5),
        }
    }

    fn hop_family(&mut self, parent: &PolicyConfig) -> PolicyConfig {
        let options: Vec<PolicyConfig> = [
            PolicyConfig::EpsilonGreedy {
                epsilon: self.cfg.epsilon,
            },
            PolicyConfig::Thompson,
            PolicyConfig::Ucb1 { exploration: 1.0 },
            PolicyConfig::Selector { gamma: 0.05 },
        ]
        .into_iter()
        .filter(|c| c.name() != parent.name())
        .collect();
        options[self.rng.random_range(0..options.len())].clone()
    }
}

fn evaluate_seed(
    cfg: &HarnessConfig,
    factory: &PolicyFactory,
    challenger: &Challenger,
    config: &PolicyConfig,
    run: usize,
) -> Result<SeedOutcome> {
    let mut env_rng = StdRng::seed_from_u64(derive_seed(cfg.seed, "env", run as u64));
    let pair = make_drift_pair(cfg.k, &mut env_rng);
    let post = cfg.drift_step.map(|_| pair.post.means);
    let mut env = BernoulliBandit::with_rng(pair.pre.means, post, cfg.drift_step, env_rng)?;

    let mut policy = factory(config)?;
    policy.reset(
        env.k(),
        StdRng::seed_from_u64(derive_seed(cfg.seed, "policy", run as u64)),
    );

    let mut evaluator = Evaluator::new(cfg.step_budget());
    let trajectory = evaluator.run(&mut *policy, &mut env, cfg.n_steps, config.name());
    let summary = summarize(&trajectory, cfg.drift_step)?;
    let analysis = challenger.analyse(&trajectory);
    Ok(SeedOutcome {
        run,
        trajectory,
        summary,
        analysis,
        violations: evaluator.violations().len(),
    })
}

/// Contain both errors and panics to the seed that raised them.
fn isolate(run: usize, f: impl FnOnce() -> Result<SeedOutcome>) -> Result<SeedOutcome> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(o)) => Ok(o),
        Ok(Err(e)) => Err(Error::SeedFailed {
            run,
            reason: e.to_string(),
        }),
        Err(payload) => Err(Error::SeedFailed {
            run,
            reason: format!("panicked: {}", panic_message(payload.as_ref())),
        }),
    }
}
