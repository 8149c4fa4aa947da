use iai_bandit::{
    make_drift_pair, summarize, BernoulliBandit, Challenger, ChallengerConfig, Evaluator,
    FixedPolicy, Policy, StrainKind, ThompsonSampling, Trajectory, Ucb1, ViolationKind,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

const K: usize = 5;
const DRIFT: usize = 500;
const STEPS: usize = 1000;

fn drifting_env(seed: u64) -> BernoulliBandit {
    let mut rng = StdRng::seed_from_u64(seed);
    let pair = make_drift_pair(K, &mut rng);
    BernoulliBandit::with_rng(pair.pre.means, Some(pair.post.means), Some(DRIFT), rng).unwrap()
}

fn run_named<P: Policy>(mut policy: P, name: &str, seed: u64) -> Trajectory {
    let mut env = drifting_env(seed);
    policy.reset(env.k(), StdRng::seed_from_u64(seed + 1));
    Evaluator::new(STEPS).run(&mut policy, &mut env, STEPS, name)
}

#[test]
fn ucb1_and_thompson_stay_within_bounds_across_drift() {
    for (traj, name) in [
        (run_named(Ucb1::new(), "ucb1", 2024), "ucb1"),
        (run_named(ThompsonSampling::new(), "thompson", 2024), "thompson"),
    ] {
        let s = summarize(&traj, Some(DRIFT)).unwrap();
        assert_eq!(s.system, name);
        assert_eq!(s.steps, STEPS);
        assert!(s.cum_reward <= STEPS as u64);
        assert!(s.cum_regret >= 0.0);

        // Both post-drift windows are measured: 500 post-drift steps, 25-step window.
        let recovery = s.post_drift_regret_mean_5pct.unwrap();
        let all = s.post_drift_regret_mean_all.unwrap();
        assert!(recovery.is_finite() && all.is_finite());
        let manual: f64 =
            traj.rows()[DRIFT..DRIFT + 25].iter().map(|r| r.inst_regret).sum::<f64>() / 25.0;
        assert!((recovery - manual).abs() < 1e-12);
    }
}

#[test]
fn stale_fixed_arm_pays_regret_only_after_drift() {
    // Arm 0 wins before the drift and loses to arm 1 after it.
    let pre = vec![0.9, 0.1, 0.2, 0.3, 0.4];
    let post = vec![0.1, 0.9, 0.2, 0.3, 0.4];
    let mut env = BernoulliBandit::with_drift(pre, post, DRIFT, 99).unwrap();
    let mut policy = FixedPolicy::new(0);
    policy.reset(env.k(), StdRng::seed_from_u64(100));
    let stale = Evaluator::new(STEPS).run(&mut policy, &mut env, STEPS, "fixed");
    assert_eq!(stale.len(), STEPS);

    let rows = stale.rows();
    assert!(rows[..DRIFT].iter().all(|r| r.inst_regret == 0.0));
    assert!(rows[DRIFT..].iter().all(|r| (r.inst_regret - 0.8).abs() < 1e-9));

    let s = summarize(&stale, Some(DRIFT)).unwrap();
    assert!((s.post_drift_regret_mean_all.unwrap() - 0.8).abs() < 1e-9);
    assert!((s.post_drift_regret_mean_5pct.unwrap() - 0.8).abs() < 1e-9);
    assert!((s.cum_regret - 0.8 * (STEPS - DRIFT) as f64).abs() < 1e-6);
}

#[test]
fn budget_exhaustion_at_five_hundred() {
    let mut env = drifting_env(1);
    let mut p = ThompsonSampling::new();
    p.reset(K, StdRng::seed_from_u64(1));
    let mut ev = Evaluator::new(500);
    let traj = ev.run(&mut p, &mut env, 1000, "thompson");
    assert_eq!(traj.len(), 500);
    let budget: Vec<_> = ev
        .violations()
        .iter()
        .filter(|v| v.kind == ViolationKind::BudgetExhaustion)
        .collect();
    assert_eq!(budget.len(), 1);
    assert_eq!(budget[0].t, 500);
    assert_eq!(budget[0].system, "thompson");
}

struct MinusOne;

impl Policy for MinusOne {
    fn name(&self) -> &str {
        "minus_one"
    }
    fn reset(&mut self, _k: usize, _rng: StdRng) {}
    fn select_arm(&mut self, t: usize) -> isize {
        if t == 0 {
            -1
        } else {
            0
        }
    }
    fn update(&mut self, _arm: usize, _reward: u8) {}
}

#[test]
fn negative_arm_is_clipped_to_zero_and_run_completes() {
    let mut env = drifting_env(5);
    let mut ev = Evaluator::unbounded();
    let traj = ev.run(&mut MinusOne, &mut env, STEPS, "minus_one");
    assert_eq!(traj.len(), STEPS);
    assert_eq!(traj.rows()[0].arm, 0);
    assert_eq!(ev.violations().len(), 1);
    assert_eq!(ev.violations()[0].kind, ViolationKind::InvalidAction);
    assert_eq!(ev.violations()[0].t, 0);
}

#[test]
fn challenger_separates_stale_and_adaptive_runs() {
    let cfg = ChallengerConfig {
        window_size: 200,
        drift_step: Some(DRIFT),
        ..ChallengerConfig::default()
    };
    let c = Challenger::new(cfg);

    // Synthetic stale run: perfect before the drift, regret climbing after it.
    let worsening = Trajectory::from_steps(
        "stale",
        (0..STEPS).map(|t| {
            let r = if t < DRIFT { 0.0 } else { 0.2 + 0.3 * (t - DRIFT) as f64 / DRIFT as f64 };
            (t, 0, u8::from(t < DRIFT), r)
        }),
    );
    let a = c.analyse(&worsening);
    assert!(a.strain_count() >= 1);
    assert!(!a.critiques.is_empty());
    assert!(a.signals.positive().contains(&StrainKind::PostDriftRecoverySlow));

    let flat = Trajectory::from_steps("steady", (0..STEPS).map(|t| (t, 0, 1, 0.005)));
    let a = c.analyse(&flat);
    assert_eq!(a.strain_count(), 0);
    assert!(a.critiques.is_empty());
}
