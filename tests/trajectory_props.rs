//! Property tests for environment and trajectory invariants.

use iai_bandit::{
    make_drift_pair, make_random_bandit, BernoulliBandit, Evaluator, Policy, PolicyConfig,
    Trajectory,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn families() -> impl Strategy<Value = PolicyConfig> {
    prop_oneof![
        (0.0f64..=1.0).prop_map(|epsilon| PolicyConfig::EpsilonGreedy { epsilon }),
        Just(PolicyConfig::Thompson),
        (0.1f64..3.0).prop_map(|exploration| PolicyConfig::Ucb1 { exploration }),
        (0.01f64..0.3).prop_map(|gamma| PolicyConfig::Selector { gamma }),
    ]
}

fn run(config: &PolicyConfig, k: usize, drift: usize, steps: usize, seed: u64) -> Trajectory {
    let mut env_rng = StdRng::seed_from_u64(seed);
    let pair = make_drift_pair(k, &mut env_rng);
    let mut env =
        BernoulliBandit::with_rng(pair.pre.means, Some(pair.post.means), Some(drift), env_rng)
            .unwrap();
    let mut policy = config.build().unwrap();
    policy.reset(k, StdRng::seed_from_u64(seed ^ 0xA5A5));
    Evaluator::unbounded().run(&mut *policy, &mut env, steps, config.name())
}

proptest! {
    /// `true_means` switches exactly at `drift_step`, and is constant on each side.
    #[test]
    fn drift_is_a_hard_switch(k in 1usize..8, drift in 0usize..200, seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let pair = make_drift_pair(k, &mut rng);
        let env = BernoulliBandit::with_drift(
            pair.pre.means.clone(),
            pair.post.means.clone(),
            drift,
            seed,
        )
        .unwrap();
        for t in [0, drift.saturating_sub(1), drift, drift + 1, drift + 10_000] {
            let want = if t < drift { &pair.pre.means } else { &pair.post.means };
            prop_assert_eq!(env.true_means(t), want.as_slice());
        }
    }

    /// The generated best arm beats every other arm by at least the gap.
    #[test]
    fn generated_bandit_has_one_dominant_arm(k in 2usize..10, seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let b = make_random_bandit(k, &mut rng, 0.1);
        for (i, &m) in b.means.iter().enumerate() {
            prop_assert!((0.0..=0.95).contains(&m));
            if i != b.best {
                prop_assert!(b.means[b.best] - m >= 0.1 - 1e-12);
            }
        }
    }

    /// Cumulative columns are running sums and the switch flag tracks arm changes.
    #[test]
    fn trajectory_reconstructs(
        config in families(),
        k in 1usize..6,
        drift in 0usize..300,
        steps in 1usize..300,
        seed in any::<u64>(),
    ) {
        let traj = run(&config, k, drift, steps, seed);
        prop_assert_eq!(traj.len(), steps);

        let mut regret = 0.0;
        let mut reward = 0u64;
        let mut prev_cum = 0.0;
        for (i, row) in traj.rows().iter().enumerate() {
            prop_assert_eq!(row.t, i);
            prop_assert!(row.arm < k);
            prop_assert!(row.inst_regret >= 0.0);
            regret += row.inst_regret;
            reward += u64::from(row.reward);
            prop_assert!((row.cum_regret - regret).abs() < 1e-9);
            prop_assert!(row.cum_regret >= prev_cum);
            prop_assert_eq!(row.cum_reward, reward);
            let expect_switch = i > 0 && traj.rows()[i - 1].arm != row.arm;
            prop_assert_eq!(row.switched, expect_switch);
            prev_cum = row.cum_regret;
        }
    }

    /// Same seed pair, same configuration: bit-identical trajectories.
    #[test]
    fn runs_are_reproducible(config in families(), seed in any::<u64>()) {
        let a = run(&config, 4, 100, 200, seed);
        let b = run(&config, 4, 100, 200, seed);
        prop_assert_eq!(a, b);
    }
}
