//! Judgment collaborator: the opaque accept/reject step after the numeric gate.
//!
//! A [`Judge`] may be slow, fail, or panic. [`judge_with_timeout`] runs it on a
//! worker thread and turns every failure mode into a deterministic reject, so the
//! orchestrator's control flow never depends on the collaborator behaving.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::challenger::{ParameterSuggestion, StrainAnalysis, StrainKind};
use crate::policy::PolicyConfig;

/// How demanding the judgment step is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    Strict,
    #[default]
    Balanced,
    Permissive,
}

impl std::str::FromStr for Strictness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Strictness::Strict),
            "balanced" => Ok(Strictness::Balanced),
            "permissive" => Ok(Strictness::Permissive),
            other => Err(format!(
                "unknown strictness {other:?} (expected strict, balanced or permissive)"
            )),
        }
    }
}

impl std::fmt::Display for Strictness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Strictness::Strict => "strict",
            Strictness::Balanced => "balanced",
            Strictness::Permissive => "permissive",
        })
    }
}

/// What the judge sees about one candidate generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub generation: usize,
    pub candidate: PolicyConfig,
    /// Mean final cumulative regret over successful seeds.
    pub candidate_regret: f64,
    /// Mean positive strain signals per successful seed.
    pub candidate_strain: f64,
    pub incumbent_regret: Option<f64>,
    pub incumbent_strain: Option<f64>,
    pub baseline_regret: Option<f64>,
    /// Fraction of successful seeds on which each strain signal fired.
    pub signal_rates: BTreeMap<StrainKind, f64>,
    /// The challenger's full analysis of each successful seed, in run order.
    pub analyses: Vec<StrainAnalysis>,
    /// Critique lines from the challenger, all seeds.
    pub critiques: Vec<String>,
    pub suggestions: Vec<ParameterSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    pub accept: bool,
    pub reason: String,
}

impl Judgment {
    pub fn accept(reason: impl Into<String>) -> Self {
        Self {
            accept: true,
            reason: reason.into(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            accept: false,
            reason: reason.into(),
        }
    }

    /// The fallback decision when the collaborator could not answer.
    pub fn unavailable(err: &JudgmentError) -> Self {
        Self::reject(format!("unavailable: {err}"))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JudgmentError {
    #[error("judge could not be reached: {0}")]
    Unavailable(String),
    #[error("judge did not answer within {0:?}")]
    TimedOut(Duration),
    #[error("judge reply could not be parsed: {0}")]
    Unparseable(String),
}

/// The decision collaborator.
pub trait Judge: Send + Sync {
    fn judge(&self, evidence: &Evidence, strictness: Strictness) -> Result<Judgment, JudgmentError>;
}

impl<F> Judge for F
where
    F: Fn(&Evidence, Strictness) -> Result<Judgment, JudgmentError> + Send + Sync,
{
    fn judge(
        &self,
        evidence: &Evidence,
        strictness: Strictness,
    ) -> Result<Judgment, JudgmentError> {
        self(evidence, strictness)
    }
}

/// Run `judge` on a worker thread, waiting at most `timeout`.
///
/// A judge that overruns is left to finish on its own thread; its late answer is
/// dropped.
pub fn try_judge_with_timeout(
    judge: Arc<dyn Judge>,
    evidence: &Evidence,
    strictness: Strictness,
    timeout: Duration,
) -> Result<Judgment, JudgmentError> {
    let (tx, rx) = mpsc::channel();
    let evidence = evidence.clone();
    thread::Builder::new()
        .name("iai-judge".to_string())
        .spawn(move || {
            let out = panic::catch_unwind(AssertUnwindSafe(|| judge.judge(&evidence, strictness)));
            let _ = tx.send(out);
        })
        .map_err(|e| JudgmentError::Unavailable(e.to_string()))?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(res)) => res,
        Ok(Err(payload)) => Err(JudgmentError::Unavailable(format!(
            "judge panicked: {}",
            panic_message(payload.as_ref())
        ))),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(JudgmentError::TimedOut(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(JudgmentError::Unavailable(
            "judge worker exited without answering".to_string(),
        )),
    }
}

/// Like [`try_judge_with_timeout`], with every failure mapped to a reject.
pub fn judge_with_timeout(
    judge: Arc<dyn Judge>,
    evidence: &Evidence,
    strictness: Strictness,
    timeout: Duration,
) -> Judgment {
    try_judge_with_timeout(judge, evidence, strictness, timeout)
        .unwrap_or_else(|e| Judgment::unavailable(&e))
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Deterministic judge comparing candidate regret to the incumbent's.
///
/// Accepts when `candidate_regret / incumbent_regret` is at most the limit for
/// the requested strictness. Under [`Strictness::Strict`] the candidate must also
/// not carry more strain than the incumbent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdJudge {
    pub strict: f64,
    pub balanced: f64,
    pub permissive: f64,
}

impl Default for ThresholdJudge {
    fn default() -> Self {
        Self {
            strict: 0.95,
            balanced: 1.0,
            permissive: 1.5,
        }
    }
}

impl ThresholdJudge {
    pub fn limit(&self, strictness: Strictness) -> f64 {
        match strictness {
            Strictness::Strict => self.strict,
            Strictness::Balanced => self.balanced,
            Strictness::Permissive => self.permissive,
        }
    }
}

impl Judge for ThresholdJudge {
    fn judge(&self, ev: &Evidence, strictness: Strictness) -> Result<Judgment, JudgmentError> {
        let Some(inc) = ev.incumbent_regret else {
            return Ok(Judgment::accept("no incumbent to compare against"));
        };
        let ratio = if inc > 0.0 {
            ev.candidate_regret / inc
        } else if ev.candidate_regret <= 0.0 {
            1.0
        } else {
            f64::INFINITY
        };
        let limit = self.limit(strictness);
        if !(ratio <= limit) {
            return Ok(Judgment::reject(format!(
                "regret ratio {ratio:.3} vs incumbent exceeds {strictness} limit {limit:.2}"
            )));
        }
        if strictness == Strictness::Strict {
            let inc_strain = ev.incumbent_strain.unwrap_or(0.0);
            if ev.candidate_strain > inc_strain {
                return Ok(Judgment::reject(format!(
                    "strain {:.2} above incumbent {:.2}",
                    ev.candidate_strain, inc_strain
                )));
            }
        }
        Ok(Judgment::accept(format!(
            "regret ratio {ratio:.3} within {strictness} limit {limit:.2}"
        )))
    }
}

#[derive(Deserialize)]
struct Reply {
    verdict: String,
    #[serde(default)]
    rationale: String,
}

/// Parse a textual verdict: a JSON object with `verdict` and `rationale`,
/// optionally wrapped in a markdown code fence.
///
/// Only `ACCEPT` accepts. `REJECT`, `MODIFY` and `NO_CHANGE` all reject.
pub fn parse_verdict(text: &str) -> Result<Judgment, JudgmentError> {
    let body = strip_fence(text.trim());
    let reply: Reply =
        serde_json::from_str(body).map_err(|e| JudgmentError::Unparseable(e.to_string()))?;
    let verdict = reply.verdict.trim().to_ascii_uppercase();
    let accept = match verdict.as_str() {
        "ACCEPT" => true,
        "REJECT" | "MODIFY" | "NO_CHANGE" => false,
        other => {
            return Err(JudgmentError::Unparseable(format!(
                "unknown verdict {other:?}"
            )))
        }
    };
    let reason = if reply.rationale.trim().is_empty() {
        verdict.to_ascii_lowercase()
    } else {
        reply.rationale
    };
    Ok(Judgment { accept, reason })
}

fn strip_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Adapts a text-producing collaborator (e.g. a remote model) into a [`Judge`]
/// by parsing its reply with [`parse_verdict`].
pub struct TextJudge<F> {
    ask: F,
}

impl<F> TextJudge<F>
where
    F: Fn(&Evidence, Strictness) -> Result<String, JudgmentError> + Send + Sync,
{
    pub fn new(ask: F) -> Self {
        Self { ask }
    }
}

impl<F> Judge for TextJudge<F>
where
    F: Fn(&Evidence, Strictness) -> Result<String, JudgmentError> + Send + Sync,
{
    fn judge(
        &self,
        evidence: &Evidence,
        strictness: Strictness,
    ) -> Result<Judgment, JudgmentError> {
        parse_verdict(&(self.ask)(evidence, strictness)?)
    }
}
