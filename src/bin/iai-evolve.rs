//! `iai-evolve`: run the policy evolution loop from the command line.
//!
//! Loads an optional JSON [`HarnessConfig`], applies flag overrides, evolves with
//! the built-in [`ThresholdJudge`], and optionally writes every trajectory as
//! JSONL and the final lineage as JSON.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use iai_bandit::{HarnessConfig, JsonlSink, Orchestrator, Strictness, ThresholdJudge};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "iai-evolve")]
#[command(about = "Evolve bandit policy configurations under a drifting environment")]
#[command(version)]
struct Cli {
    /// JSON configuration file (missing fields take defaults)
    #[arg(long, env = "IAI_EVOLVE_CONFIG")]
    config: Option<PathBuf>,

    /// Arm count
    #[arg(long)]
    k: Option<usize>,

    /// Exploration rate of the initial candidate and the epsilon-greedy baseline
    #[arg(long)]
    epsilon: Option<f64>,

    /// Challenger window length
    #[arg(long)]
    window_size: Option<usize>,

    /// Step at which the environment drifts
    #[arg(long)]
    drift_step: Option<usize>,

    /// Run without drift (overrides --drift-step and the config file)
    #[arg(long, default_value_t = false)]
    no_drift: bool,

    /// Evaluator step ceiling
    #[arg(long)]
    max_steps: Option<usize>,

    /// Steps per run
    #[arg(long)]
    n_steps: Option<usize>,

    /// Seeds per generation
    #[arg(long)]
    n_runs: Option<usize>,

    #[arg(long)]
    n_generations: Option<usize>,

    /// strict, balanced or permissive
    #[arg(long)]
    strictness: Option<Strictness>,

    /// Stop after this many consecutive rejections
    #[arg(long)]
    patience: Option<usize>,

    #[arg(long, env = "IAI_EVOLVE_SEED")]
    seed: Option<u64>,

    /// Evaluate seeds one at a time
    #[arg(long, default_value_t = false)]
    sequential: bool,

    /// Skip the baseline systems
    #[arg(long, default_value_t = false)]
    no_baseline: bool,

    /// Write every trajectory row here as JSON lines
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write the final report here as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

impl Cli {
    fn harness_config(&self) -> anyhow::Result<HarnessConfig> {
        let mut cfg = match &self.config {
            Some(path) => HarnessConfig::from_path(path)?,
            None => HarnessConfig::default(),
        };
        if let Some(k) = self.k {
            cfg.k = k;
        }
        if let Some(e) = self.epsilon {
            cfg.epsilon = e;
        }
        if let Some(w) = self.window_size {
            cfg.window_size = w;
        }
        if let Some(d) = self.drift_step {
            cfg.drift_step = Some(d);
        }
        if self.no_drift {
            cfg.drift_step = None;
        }
        if let Some(m) = self.max_steps {
            cfg.max_steps = Some(m);
        }
        if let Some(n) = self.n_steps {
            cfg.n_steps = n;
        }
        if let Some(n) = self.n_runs {
            cfg.n_runs = n;
        }
        if let Some(n) = self.n_generations {
            cfg.n_generations = n;
        }
        if let Some(s) = self.strictness {
            cfg.strictness = s;
        }
        if let Some(p) = self.patience {
            cfg.patience = Some(p);
        }
        if let Some(s) = self.seed {
            cfg.seed = s;
        }
        if self.sequential {
            cfg.parallel = false;
        }
        if self.no_baseline {
            cfg.run_baseline = false;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "iai_bandit=info,iai_evolve=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let cfg = cli.harness_config().context("invalid configuration")?;
    info!(
        k = cfg.k,
        n_steps = cfg.n_steps,
        n_runs = cfg.n_runs,
        n_generations = cfg.n_generations,
        drift_step = ?cfg.drift_step,
        strictness = %cfg.strictness,
        seed = cfg.seed,
        "configuration loaded"
    );

    let mut orchestrator = Orchestrator::new(cfg, Arc::new(ThresholdJudge::default()))?;
    if let Some(path) = &cli.out {
        let file = File::create(path)
            .with_context(|| format!("cannot create {}", path.display()))?;
        orchestrator = orchestrator.with_sink(JsonlSink::new(BufWriter::new(file)));
    }

    let report = orchestrator.run();

    for g in report.lineage.generations() {
        info!(
            generation = g.index,
            system = g.config.name(),
            config = ?g.config,
            mean_regret = g.score.mean_regret,
            mean_strain = g.score.mean_strain,
            seeds_ok = g.score.seeds_ok,
            accepted = g.accepted,
            reason = %g.reason,
            "lineage"
        );
    }
    match report.best() {
        Some(best) => info!(
            generation = best.index,
            config = ?best.config,
            mean_regret = best.score.mean_regret,
            "best configuration"
        ),
        None => info!("no generation was accepted"),
    }

    if let Some(path) = &cli.report {
        let file = File::create(path)
            .with_context(|| format!("cannot create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)
            .context("cannot write report")?;
    }
    Ok(())
}
