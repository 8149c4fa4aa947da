//! Challenger: windowed strain detection over a completed trajectory.
//!
//! The challenger is advisory. It never mutates the trajectory and keeps no
//! state between calls: the same `(trajectory, config)` pair always produces the
//! same [`StrainAnalysis`].
//!
//! Signals compare an *early* window (the first `min(window_size, n/3)` steps)
//! against a *recent* window (the last `window_size` steps), plus a post-drift
//! recovery check and an optional comparison to a baseline regret:
//!
//! | signal | fires when |
//! |---|---|
//! | `regret_slope_increasing` | recent cumulative-regret slope > `regret_slope_ratio` × early slope, and > `min_regret_slope` |
//! | `switch_rate_unstable` | std of the rolling (`switch_window`) switch rate > `switch_rate_std` |
//! | `reward_variance_spike` | recent reward variance > `reward_var_ratio` × early variance |
//! | `post_drift_recovery_slow` | mean regret over the first `window_size/2` post-drift steps > `recovery_floor` and > `recovery_ratio` × the pre-drift window mean |
//! | `absolute_regret_high` | final cumulative regret > `absolute_regret_ratio` × `baseline_regret` |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::evaluator::{Trajectory, TrajectoryRow};
use crate::summary::mean;

/// Thresholds and windows for strain detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengerConfig {
    /// Length of the early/recent comparison windows.
    ///
    /// Not read from configuration files: the harness supplies its own.
    #[serde(skip)]
    pub window_size: usize,
    /// Known drift step, enabling the recovery check. Supplied like `window_size`.
    #[serde(skip)]
    pub drift_step: Option<usize>,
    /// Reference cumulative regret (e.g. best baseline system).
    pub baseline_regret: Option<f64>,
    pub regret_slope_ratio: f64,
    /// Recent slopes below this are never flagged, whatever the ratio.
    pub min_regret_slope: f64,
    /// Rolling window for the switch rate.
    pub switch_window: usize,
    pub switch_rate_std: f64,
    pub reward_var_ratio: f64,
    pub recovery_ratio: f64,
    pub recovery_floor: f64,
    pub absolute_regret_ratio: f64,
}

impl Default for ChallengerConfig {
    fn default() -> Self {
        Self {
            window_size: 1000,
            drift_step: None,
            baseline_regret: None,
            regret_slope_ratio: 1.2,
            min_regret_slope: 0.01,
            switch_window: 100,
            switch_rate_std: 0.15,
            reward_var_ratio: 1.15,
            recovery_ratio: 2.0,
            recovery_floor: 0.05,
            absolute_regret_ratio: 1.3,
        }
    }
}

impl ChallengerConfig {
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(Error::InvalidConfig(msg));
        if self.window_size == 0 {
            return bad("challenger window_size must be positive".into());
        }
        if self.switch_window == 0 {
            return bad("challenger switch_window must be positive".into());
        }
        for (name, ratio) in [
            ("regret_slope_ratio", self.regret_slope_ratio),
            ("reward_var_ratio", self.reward_var_ratio),
            ("recovery_ratio", self.recovery_ratio),
            ("absolute_regret_ratio", self.absolute_regret_ratio),
        ] {
            if !(ratio > 0.0) {
                return bad(format!("challenger {name} {ratio} must be > 0"));
            }
        }
        for (name, floor) in [
            ("min_regret_slope", self.min_regret_slope),
            ("switch_rate_std", self.switch_rate_std),
            ("recovery_floor", self.recovery_floor),
        ] {
            if !(floor >= 0.0) {
                return bad(format!("challenger {name} {floor} must be >= 0"));
            }
        }
        if let Some(b) = self.baseline_regret {
            if !(b.is_finite() && b >= 0.0) {
                return bad(format!("challenger baseline_regret {b} must be finite and >= 0"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrainKind {
    RegretSlopeIncreasing,
    SwitchRateUnstable,
    RewardVarianceSpike,
    PostDriftRecoverySlow,
    AbsoluteRegretHigh,
}

impl StrainKind {
    pub const ALL: [StrainKind; 5] = [
        StrainKind::RegretSlopeIncreasing,
        StrainKind::SwitchRateUnstable,
        StrainKind::RewardVarianceSpike,
        StrainKind::PostDriftRecoverySlow,
        StrainKind::AbsoluteRegretHigh,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrainKind::RegretSlopeIncreasing => "regret_slope_increasing",
            StrainKind::SwitchRateUnstable => "switch_rate_unstable",
            StrainKind::RewardVarianceSpike => "reward_variance_spike",
            StrainKind::PostDriftRecoverySlow => "post_drift_recovery_slow",
            StrainKind::AbsoluteRegretHigh => "absolute_regret_high",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            StrainKind::SwitchRateUnstable | StrainKind::RewardVarianceSpike => Severity::Medium,
            _ => Severity::High,
        }
    }
}

impl std::fmt::Display for StrainKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
}

/// Raw statistics and flags.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StrainSignals {
    pub regret_slope_early: f64,
    pub regret_slope_recent: f64,
    pub regret_slope_increasing: bool,
    pub switch_rate_mean: f64,
    pub switch_rate_std: f64,
    pub switch_rate_unstable: bool,
    pub reward_var_early: f64,
    pub reward_var_recent: f64,
    pub reward_variance_spike: bool,
    pub pre_drift_regret_mean: Option<f64>,
    pub post_drift_regret_mean: Option<f64>,
    pub post_drift_recovery_slow: bool,
    pub cum_regret: f64,
    pub regret_vs_baseline: Option<f64>,
    pub absolute_regret_high: bool,
}

/// A flag or a scalar in the flattened signal map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Flag(bool),
    Scalar(f64),
}

impl StrainSignals {
    /// Signals that fired, in a stable order.
    pub fn positive(&self) -> Vec<StrainKind> {
        [
            (self.regret_slope_increasing, StrainKind::RegretSlopeIncreasing),
            (self.switch_rate_unstable, StrainKind::SwitchRateUnstable),
            (self.reward_variance_spike, StrainKind::RewardVarianceSpike),
            (self.post_drift_recovery_slow, StrainKind::PostDriftRecoverySlow),
            (self.absolute_regret_high, StrainKind::AbsoluteRegretHigh),
        ]
        .into_iter()
        .filter_map(|(on, kind)| on.then_some(kind))
        .collect()
    }

    pub fn positive_count(&self) -> usize {
        self.positive().len()
    }

    /// Name → value view. Statistics that could not be computed are omitted.
    pub fn to_map(&self) -> BTreeMap<&'static str, SignalValue> {
        use SignalValue::{Flag, Scalar};
        let mut m = BTreeMap::from([
            ("regret_slope_early", Scalar(self.regret_slope_early)),
            ("regret_slope_recent", Scalar(self.regret_slope_recent)),
            ("regret_slope_increasing", Flag(self.regret_slope_increasing)),
            ("switch_rate_mean", Scalar(self.switch_rate_mean)),
            ("switch_rate_std", Scalar(self.switch_rate_std)),
            ("switch_rate_unstable", Flag(self.switch_rate_unstable)),
            ("reward_var_early", Scalar(self.reward_var_early)),
            ("reward_var_recent", Scalar(self.reward_var_recent)),
            ("reward_variance_spike", Flag(self.reward_variance_spike)),
            ("post_drift_recovery_slow", Flag(self.post_drift_recovery_slow)),
            ("cum_regret", Scalar(self.cum_regret)),
            ("absolute_regret_high", Flag(self.absolute_regret_high)),
        ]);
        if let Some(x) = self.pre_drift_regret_mean {
            m.insert("pre_drift_regret_mean", Scalar(x));
        }
        if let Some(x) = self.post_drift_regret_mean {
            m.insert("post_drift_regret_mean", Scalar(x));
        }
        if let Some(x) = self.regret_vs_baseline {
            m.insert("regret_vs_baseline", Scalar(x));
        }
        m
    }
}

/// Human-readable explanation of one positive signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub signal: StrainKind,
    pub severity: Severity,
    pub message: String,
}

impl std::fmt::Display for Critique {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.signal, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    Epsilon,
    Gamma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
}

/// Advisory tuning hint for the next generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSuggestion {
    pub parameter: Parameter,
    pub direction: Direction,
    pub values: Vec<f64>,
    pub reason: String,
}

/// Output of one challenge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StrainAnalysis {
    pub system: String,
    pub signals: StrainSignals,
    pub critiques: Vec<Critique>,
    pub suggestions: Vec<ParameterSuggestion>,
}

impl StrainAnalysis {
    pub fn strain_count(&self) -> usize {
        self.signals.positive_count()
    }

    pub fn critique_messages(&self) -> Vec<String> {
        self.critiques.iter().map(ToString::to_string).collect()
    }
}

/// Fraction of `analyses` in which each signal fired. Every kind has an entry;
/// all rates are `0.0` for an empty slice.
pub fn signal_rates(analyses: &[StrainAnalysis]) -> BTreeMap<StrainKind, f64> {
    StrainKind::ALL
        .into_iter()
        .map(|kind| {
            let fired = analyses
                .iter()
                .filter(|a| a.signals.positive().contains(&kind))
                .count();
            let rate = if analyses.is_empty() {
                0.0
            } else {
                fired as f64 / analyses.len() as f64
            };
            (kind, rate)
        })
        .collect()
}

/// Stateless strain detector.
#[derive(Debug, Clone, Default)]
pub struct Challenger {
    cfg: ChallengerConfig,
}

impl Challenger {
    pub fn new(cfg: ChallengerConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ChallengerConfig {
        &self.cfg
    }

    /// Analyse one trajectory.
    pub fn analyse(&self, traj: &Trajectory) -> StrainAnalysis {
        let signals = self.signals(traj.rows());
        let critiques = self.critiques(&signals, traj.len());
        let suggestions = suggest(traj.system(), &signals);
        StrainAnalysis {
            system: traj.system().to_string(),
            signals,
            critiques,
            suggestions,
        }
    }

    /// Analyse several systems' trajectories side by side.
    ///
    /// Without a configured `baseline_regret`, the lowest final cumulative regret
    /// among `trajs` becomes the baseline for all of them.
    pub fn analyse_many(&self, trajs: &[Trajectory]) -> Vec<StrainAnalysis> {
        let mut cfg = self.cfg.clone();
        if cfg.baseline_regret.is_none() {
            cfg.baseline_regret = trajs
                .iter()
                .filter(|t| !t.is_empty())
                .map(Trajectory::cum_regret)
                .reduce(f64::min);
        }
        let c = Challenger::new(cfg);
        trajs.iter().map(|t| c.analyse(t)).collect()
    }

    fn signals(&self, rows: &[TrajectoryRow]) -> StrainSignals {
        let cfg = &self.cfg;
        let n = rows.len();
        let mut s = StrainSignals::default();
        if n == 0 {
            return s;
        }
        let window = cfg.window_size.max(1);
        let early = &rows[..window.min(n / 3)];
        let recent = &rows[n.saturating_sub(window)..];

        s.regret_slope_early = regret_slope(early);
        s.regret_slope_recent = regret_slope(recent);
        s.regret_slope_increasing = s.regret_slope_early > 0.0
            && s.regret_slope_recent > cfg.regret_slope_ratio * s.regret_slope_early
            && s.regret_slope_recent > cfg.min_regret_slope;

        let rolling = rolling_mean(
            &rows.iter().map(|r| f64::from(u8::from(r.switched))).collect::<Vec<_>>(),
            cfg.switch_window.clamp(1, n),
        );
        s.switch_rate_mean = mean(&rolling);
        s.switch_rate_std = sample_std(&rolling);
        s.switch_rate_unstable = s.switch_rate_std > cfg.switch_rate_std;

        s.reward_var_early = reward_variance(early);
        s.reward_var_recent = reward_variance(recent);
        s.reward_variance_spike = s.reward_var_early > 0.0
            && s.reward_var_recent > cfg.reward_var_ratio * s.reward_var_early;

        if let Some(d) = cfg.drift_step.filter(|&d| d < n) {
            let start = rows.partition_point(|r| r.t < d);
            let post = &rows[start..];
            let w = (window / 2).min(post.len());
            if w > 0 {
                let recovery = mean_regret(&post[..w]);
                let pre = &rows[start.saturating_sub(window)..start];
                let pre_mean = (!pre.is_empty()).then(|| mean_regret(pre));
                s.pre_drift_regret_mean = pre_mean;
                s.post_drift_regret_mean = Some(recovery);
                s.post_drift_recovery_slow = recovery > cfg.recovery_floor
                    && pre_mean.map_or(true, |p| recovery > cfg.recovery_ratio * p);
            }
        }

        s.cum_regret = rows[n - 1].cum_regret;
        if let Some(b) = cfg.baseline_regret.filter(|&b| b > 0.0) {
            let ratio = s.cum_regret / b;
            s.regret_vs_baseline = Some(ratio);
            s.absolute_regret_high = ratio > cfg.absolute_regret_ratio;
        }
        s
    }

    fn critiques(&self, s: &StrainSignals, n: usize) -> Vec<Critique> {
        let cfg = &self.cfg;
        let window = cfg.window_size.max(1);
        let early_len = window.min(n / 3);
        let recent_len = window.min(n);
        s.positive()
            .into_iter()
            .map(|kind| {
                let message = match kind {
                    StrainKind::RegretSlopeIncreasing => format!(
                        "cumulative regret slope rose from {:.4}/step over the first {} steps to {:.4}/step over the last {} steps ({:.2}x, threshold {:.2}x)",
                        s.regret_slope_early,
                        early_len,
                        s.regret_slope_recent,
                        recent_len,
                        s.regret_slope_recent / s.regret_slope_early.max(1e-12),
                        cfg.regret_slope_ratio,
                    ),
                    StrainKind::SwitchRateUnstable => format!(
                        "rolling {}-step switch rate has std {:.3} around mean {:.3} (threshold {:.3})",
                        cfg.switch_window.clamp(1, n.max(1)),
                        s.switch_rate_std,
                        s.switch_rate_mean,
                        cfg.switch_rate_std,
                    ),
                    StrainKind::RewardVarianceSpike => format!(
                        "reward variance rose from {:.4} over the first {} steps to {:.4} over the last {} steps (threshold {:.2}x)",
                        s.reward_var_early,
                        early_len,
                        s.reward_var_recent,
                        recent_len,
                        cfg.reward_var_ratio,
                    ),
                    StrainKind::PostDriftRecoverySlow => format!(
                        "mean regret {:.4} over the first {} steps after drift at t={} exceeds {:.2}x the pre-drift mean {:.4} (floor {:.3})",
                        s.post_drift_regret_mean.unwrap_or(f64::NAN),
                        window / 2,
                        cfg.drift_step.unwrap_or_default(),
                        cfg.recovery_ratio,
                        s.pre_drift_regret_mean.unwrap_or(0.0),
                        cfg.recovery_floor,
                    ),
                    StrainKind::AbsoluteRegretHigh => format!(
                        "cumulative regret {:.2} over {} steps is {:.2}x the baseline {:.2} (threshold {:.2}x)",
                        s.cum_regret,
                        n,
                        s.regret_vs_baseline.unwrap_or(f64::NAN),
                        cfg.baseline_regret.unwrap_or(f64::NAN),
                        cfg.absolute_regret_ratio,
                    ),
                };
                Critique {
                    signal: kind,
                    severity: kind.severity(),
                    message,
                }
            })
            .collect()
    }
}

/// Exploration hints keyed on the system that produced the trajectory.
fn suggest(system: &str, s: &StrainSignals) -> Vec<ParameterSuggestion> {
    let (parameter, high_switch, low_switch, down, up, drift_up) = match system {
        "epsilon_greedy" => (
            Parameter::Epsilon,
            0.2,
            0.05,
            vec![0.05, 0.07, 0.08],
            vec![0.15, 0.20, 0.25],
            vec![0.15, 0.20],
        ),
        "iai_selector" => (
            Parameter::Gamma,
            0.4,
            0.1,
            vec![0.01, 0.02, 0.03],
            vec![0.08, 0.10, 0.15],
            vec![0.08, 0.10],
        ),
        _ => return Vec::new(),
    };

    let mut out = Vec::new();
    let sw = s.switch_rate_mean;
    // Epsilon-greedy only over-explores if regret is also still climbing.
    let over_explores = match parameter {
        Parameter::Epsilon => sw > high_switch && s.regret_slope_recent > 0.05,
        Parameter::Gamma => sw > high_switch,
    };
    if over_explores {
        out.push(ParameterSuggestion {
            parameter,
            direction: Direction::Decrease,
            values: down,
            reason: format!(
                "high switching rate ({sw:.3}) with regret slope {:.3} suggests over-exploration",
                s.regret_slope_recent
            ),
        });
    } else if sw < low_switch && s.regret_slope_increasing {
        out.push(ParameterSuggestion {
            parameter,
            direction: Direction::Increase,
            values: up,
            reason: format!(
                "low switching rate ({sw:.3}) with increasing regret suggests under-exploration"
            ),
        });
    }
    if s.post_drift_recovery_slow {
        out.push(ParameterSuggestion {
            parameter,
            direction: Direction::Increase,
            values: drift_up,
            reason: format!(
                "slow post-drift recovery (regret {:.3}) suggests more exploration after a change",
                s.post_drift_regret_mean.unwrap_or_default()
            ),
        });
    }
    out
}

fn mean_regret(rows: &[TrajectoryRow]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().map(|r| r.inst_regret).sum::<f64>() / rows.len() as f64
}

/// Least-squares slope of cumulative regret against `t`.
fn regret_slope(rows: &[TrajectoryRow]) -> f64 {
    if rows.len() < 2 {
        return 0.0;
    }
    let n = rows.len() as f64;
    let mx = rows.iter().map(|r| r.t as f64).sum::<f64>() / n;
    let my = rows.iter().map(|r| r.cum_regret).sum::<f64>() / n;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for r in rows {
        let dx = r.t as f64 - mx;
        sxy += dx * (r.cum_regret - my);
        sxx += dx * dx;
    }
    if sxx <= 0.0 {
        0.0
    } else {
        sxy / sxx
    }
}

fn reward_variance(rows: &[TrajectoryRow]) -> f64 {
    sample_variance(&rows.iter().map(|r| f64::from(r.reward)).collect::<Vec<_>>())
}

/// Means of every full length-`w` window, oldest first.
fn rolling_mean(xs: &[f64], w: usize) -> Vec<f64> {
    if w == 0 || xs.len() < w {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(xs.len() - w + 1);
    let mut sum: f64 = xs[..w].iter().sum();
    out.push(sum / w as f64);
    for i in w..xs.len() {
        sum += xs[i] - xs[i - w];
        out.push(sum / w as f64);
    }
    out
}

fn sample_variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64
}

fn sample_std(xs: &[f64]) -> f64 {
    sample_variance(xs).max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Trajectory with per-step regret `regret(t)` and arm `arm(t)`; reward is 1
    /// exactly when regret is zero.
    fn synth(
        n: usize,
        regret: impl Fn(usize) -> f64,
        arm: impl Fn(usize) -> usize,
    ) -> Trajectory {
        synth_named("ucb1", n, regret, arm)
    }

    fn synth_named(
        system: &str,
        n: usize,
        regret: impl Fn(usize) -> f64,
        arm: impl Fn(usize) -> usize,
    ) -> Trajectory {
        let mut tr = Trajectory::new(system);
        for t in 0..n {
            let r = regret(t);
            tr.push_step(t, arm(t), 1, r);
        }
        tr
    }

    fn cfg() -> ChallengerConfig {
        ChallengerConfig {
            window_size: 200,
            drift_step: Some(1000),
            ..ChallengerConfig::default()
        }
    }

    #[test]
    fn worsening_regret_after_drift_raises_strain() {
        let tr = synth(
            2000,
            |t| if t < 1000 { 0.01 } else { 0.1 + 0.4 * (t - 1000) as f64 / 1000.0 },
            |_| 0,
        );
        let a = Challenger::new(cfg()).analyse(&tr);
        assert!(a.strain_count() >= 1, "signals={:?}", a.signals);
        assert!(a.signals.regret_slope_increasing);
        assert!(a.signals.post_drift_recovery_slow);
        assert!(!a.critiques.is_empty());
        assert!(a.critique_messages()[0].contains("regret_slope_increasing"));
    }

    #[test]
    fn flat_low_regret_trajectory_has_no_strain() {
        let tr = synth(2000, |_| 0.01, |_| 0);
        let a = Challenger::new(cfg()).analyse(&tr);
        assert_eq!(a.strain_count(), 0, "signals={:?}", a.signals);
        assert!(a.critiques.is_empty());
        assert!((a.signals.post_drift_regret_mean.unwrap() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn erratic_switching_is_flagged() {
        // Switch every step for the first half, never in the second.
        let tr = synth(1000, |_| 0.0, |t| if t < 500 { t % 2 } else { 0 });
        let a = Challenger::new(ChallengerConfig::default()).analyse(&tr);
        assert!(a.signals.switch_rate_unstable, "std={}", a.signals.switch_rate_std);
        assert!(a
            .critiques
            .iter()
            .any(|c| c.signal == StrainKind::SwitchRateUnstable && c.severity == Severity::Medium));
    }

    #[test]
    fn baseline_comparison_uses_ratio_threshold() {
        let tr = synth(100, |_| 0.2, |_| 0);
        let c = Challenger::new(ChallengerConfig {
            baseline_regret: Some(10.0),
            ..ChallengerConfig::default()
        });
        let a = c.analyse(&tr);
        assert!((a.signals.regret_vs_baseline.unwrap() - 2.0).abs() < 1e-9);
        assert!(a.signals.absolute_regret_high);
    }

    #[test]
    fn analyse_many_uses_best_system_as_baseline() {
        let good = synth(100, |_| 0.05, |_| 0);
        let bad = synth_named("epsilon_greedy", 100, |_| 0.2, |_| 0);
        let out = Challenger::default().analyse_many(&[good, bad]);
        assert!(!out[0].signals.absolute_regret_high);
        assert!(out[1].signals.absolute_regret_high);
        assert_eq!(out[1].system, "epsilon_greedy");
    }

    #[test]
    fn empty_trajectory_is_quiet() {
        let a = Challenger::default().analyse(&Trajectory::new("x"));
        assert_eq!(a.strain_count(), 0);
        assert!(a.critiques.is_empty());
    }

    #[test]
    fn analysis_is_pure() {
        let tr = synth(1500, |t| (t % 7) as f64 / 20.0, |t| t % 3);
        let c = Challenger::new(cfg());
        let before = tr.clone();
        assert_eq!(c.analyse(&tr), c.analyse(&tr));
        assert_eq!(tr, before);
    }

    #[test]
    fn slow_recovery_suggests_more_exploration_for_epsilon_greedy() {
        let regret = |t: usize| if t < 1000 { 0.0 } else { 0.3 };
        let tr = synth_named("epsilon_greedy", 2000, regret, |_| 0);
        let a = Challenger::new(cfg()).analyse(&tr);
        assert!(a.signals.post_drift_recovery_slow);
        assert!(a
            .suggestions
            .iter()
            .any(|s| s.parameter == Parameter::Epsilon && s.direction == Direction::Increase));
    }

    #[test]
    fn signal_map_omits_uncomputed_statistics() {
        let tr = synth(50, |_| 0.0, |_| 0);
        let a = Challenger::default().analyse(&tr);
        let m = a.signals.to_map();
        assert!(!m.contains_key("post_drift_regret_mean"));
        assert_eq!(m["absolute_regret_high"], SignalValue::Flag(false));
    }

    #[test]
    fn validate_rejects_unusable_thresholds() {
        ChallengerConfig::default().validate().unwrap();
        let with = |edit: fn(&mut ChallengerConfig)| {
            let mut c = ChallengerConfig::default();
            edit(&mut c);
            c
        };
        for cfg in [
            with(|c| c.regret_slope_ratio = f64::NAN),
            with(|c| c.recovery_ratio = -1.0),
            with(|c| c.switch_rate_std = -0.1),
            with(|c| c.switch_window = 0),
            with(|c| c.baseline_regret = Some(f64::NAN)),
        ] {
            assert!(cfg.validate().unwrap_err().is_configuration(), "{cfg:?}");
        }
    }

    #[test]
    fn signal_rates_cover_every_kind() {
        let mut slow = StrainAnalysis::default();
        slow.signals.post_drift_recovery_slow = true;
        slow.signals.regret_slope_increasing = true;
        let mut jumpy = StrainAnalysis::default();
        jumpy.signals.regret_slope_increasing = true;
        let quiet = StrainAnalysis::default();
        let rates = signal_rates(&[slow, jumpy, quiet.clone(), quiet]);
        assert_eq!(rates.len(), StrainKind::ALL.len());
        assert_eq!(rates[&StrainKind::RegretSlopeIncreasing], 0.5);
        assert_eq!(rates[&StrainKind::PostDriftRecoverySlow], 0.25);
        assert_eq!(rates[&StrainKind::AbsoluteRegretHigh], 0.0);
        assert!(signal_rates(&[]).values().all(|&r| r == 0.0));
    }

    #[test]
    fn rolling_mean_matches_naive() {
        let xs = [1.0, 0.0, 1.0, 1.0, 0.0];
        assert_eq!(rolling_mean(&xs, 2), vec![0.5, 0.5, 1.0, 0.5]);
        assert!(rolling_mean(&xs, 6).is_empty());
    }
}
