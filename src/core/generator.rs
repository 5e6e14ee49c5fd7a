//! Investment generator: turns a fund configuration into a portfolio of
//! independently drawn investments.
//!
//! Every slot draws, in order: stage, check size, entry valuation, future
//! rounds, breakout indicator(s), exit tier roll and exit value. The order is
//! fixed so that a seeded stream always yields the same portfolio.

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

use super::error::{Result, SimulationError};
use super::types::{
    BreakoutDraw, ExitMixture, ExitTier, FundConfig, Investment, SmallExitModel, Stage, ValueRange,
};
use super::validate::validate_fund_config;

const BREAKOUT_EXTRA_ROUNDS: u32 = 1;
const BREAKOUT_EXTRA_PERIODS: u32 = 2;

/// Number of portfolio slots: fund size over the mean of the stages' maximum checks.
pub fn portfolio_size(config: &FundConfig) -> usize {
    (config.fund_size / config.average_check_size()).floor() as usize
}

/// Draws a full portfolio. An undersized fund yields an empty vector.
pub fn generate(config: &FundConfig, rng: &mut impl Rng) -> Result<Vec<Investment>> {
    validate_fund_config(config)?;

    let stages = WeightedIndex::new([config.stage_mix.seed_weight, config.stage_mix.pre_seed_weight])
        .map_err(|e| SimulationError::configuration(format!("stage_mix: {e}")))?;

    let count = portfolio_size(config);
    let mut investments = Vec::with_capacity(count);
    for _ in 0..count {
        investments.push(draw_investment(config, &stages, rng));
    }
    Ok(investments)
}

fn draw_investment(
    config: &FundConfig,
    stages: &WeightedIndex<f64>,
    rng: &mut impl Rng,
) -> Investment {
    let stage = if stages.sample(rng) == 0 {
        Stage::Seed
    } else {
        Stage::PreSeed
    };
    let stage_cfg = config.stage(stage);

    let check_size = uniform(rng, stage_cfg.check_size);
    let entry_valuation = uniform(rng, stage_cfg.valuation);
    let rounds = rng.gen_range(stage_cfg.rounds.min..=stage_cfg.rounds.max);
    let is_breakout = draw_breakout(config, stage, rng);

    let roll = rng.r#gen::<f64>() * 100.0;
    let (exit_tier, exit_valuation) = if is_breakout {
        (ExitTier::Large, uniform(rng, config.exits.large))
    } else {
        draw_exit(&config.exits, roll, entry_valuation, rng)
    };

    let (future_rounds, exit_time) = if is_breakout {
        (
            rounds + BREAKOUT_EXTRA_ROUNDS,
            rounds + 1 + BREAKOUT_EXTRA_PERIODS,
        )
    } else {
        (rounds, rounds + 1)
    };

    Investment {
        stage,
        check_size,
        entry_valuation,
        future_rounds,
        dilution_rate: stage_cfg.dilution_per_round,
        is_breakout,
        exit_tier,
        exit_valuation,
        exit_time,
    }
}

fn draw_breakout(config: &FundConfig, stage: Stage, rng: &mut impl Rng) -> bool {
    match config.breakout_draw {
        BreakoutDraw::EitherStage => {
            // Both indicators are drawn for every slot, whatever its stage.
            let seed_hit = bernoulli(rng, config.seed.breakout_probability);
            let pre_seed_hit = bernoulli(rng, config.pre_seed.breakout_probability);
            seed_hit || pre_seed_hit
        }
        BreakoutDraw::OwnStage => bernoulli(rng, config.stage(stage).breakout_probability),
    }
}

fn draw_exit(
    exits: &ExitMixture,
    roll: f64,
    entry_valuation: f64,
    rng: &mut impl Rng,
) -> (ExitTier, f64) {
    if roll < exits.small_probability {
        let value = match exits.small {
            SmallExitModel::EntryMultiple(multiple) => entry_valuation * uniform(rng, multiple),
            SmallExitModel::Absolute(range) => uniform(rng, range),
        };
        (ExitTier::Small, value)
    } else if roll < exits.small_probability + exits.medium_probability() {
        (ExitTier::Medium, uniform(rng, exits.medium))
    } else {
        (ExitTier::Large, uniform(rng, exits.large))
    }
}

fn uniform(rng: &mut impl Rng, range: ValueRange) -> f64 {
    if range.max > range.min {
        rng.gen_range(range.min..range.max)
    } else {
        range.min
    }
}

fn bernoulli(rng: &mut impl Rng, percent: f64) -> bool {
    rng.r#gen::<f64>() < percent / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{RoundsRange, StageMix};
    use crate::core::validate::MAX_ROUNDS;
    use proptest::prelude::{any, prop_assert, prop_assert_eq, proptest};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn degenerate_seed_only_config() -> FundConfig {
        let mut config = FundConfig::default();
        config.fund_size = 10_000_000.0;
        config.max_recycling = 0.0;
        config.stage_mix = StageMix {
            seed_weight: 1.0,
            pre_seed_weight: 0.0,
        };
        config.seed.check_size = ValueRange::new(500_000.0, 500_000.0);
        config.seed.dilution_per_round = 0.0;
        config.seed.rounds = RoundsRange::new(0, 0);
        config.seed.breakout_probability = 0.0;
        config.pre_seed = config.seed;
        config
    }

    #[test]
    fn portfolio_size_uses_mean_of_maximum_checks() {
        let config = FundConfig::default();
        // (600k + 300k) / 2 = 450k; 10M / 450k = 22.2
        assert_eq!(portfolio_size(&config), 22);

        let mut rng = StdRng::seed_from_u64(1);
        let investments = generate(&config, &mut rng).expect("valid config");
        assert_eq!(investments.len(), 22);
    }

    #[test]
    fn degenerate_seed_only_fund_places_twenty_identical_checks() {
        let config = degenerate_seed_only_config();
        let mut rng = StdRng::seed_from_u64(9);
        let investments = generate(&config, &mut rng).expect("valid config");

        assert_eq!(investments.len(), 20);
        for inv in &investments {
            assert_eq!(inv.stage, Stage::Seed);
            assert_eq!(inv.check_size, 500_000.0);
            assert_eq!(inv.future_rounds, 0);
            assert_eq!(inv.exit_time, 1);
            assert!(!inv.is_breakout);
        }
    }

    #[test]
    fn undersized_fund_generates_empty_portfolio() {
        let mut config = FundConfig::default();
        config.fund_size = 100_000.0;
        let mut rng = StdRng::seed_from_u64(3);
        let investments = generate(&config, &mut rng).expect("valid config");
        assert!(investments.is_empty());
    }

    #[test]
    fn forced_breakout_lands_every_exit_in_large_tier() {
        let mut config = FundConfig::default();
        config.seed.breakout_probability = 100.0;
        config.pre_seed.breakout_probability = 100.0;
        let mut rng = StdRng::seed_from_u64(17);

        let investments = generate(&config, &mut rng).expect("valid config");
        assert!(!investments.is_empty());
        for inv in &investments {
            let rounds = config.stage(inv.stage).rounds;
            let rounds_before = inv.future_rounds - 1;
            assert!(inv.is_breakout);
            assert_eq!(inv.exit_tier, ExitTier::Large);
            assert!(config.exits.large.contains(inv.exit_valuation));
            assert!((rounds.min..=rounds.max).contains(&rounds_before));
            assert_eq!(inv.exit_time, rounds_before + 3);
        }
    }

    #[test]
    fn either_stage_breakout_fires_for_pre_seed_slots_on_seed_probability() {
        let mut config = FundConfig::default();
        config.seed.breakout_probability = 100.0;
        config.pre_seed.breakout_probability = 0.0;
        config.fund_size = 50_000_000.0;
        let mut rng = StdRng::seed_from_u64(23);

        let investments = generate(&config, &mut rng).expect("valid config");
        assert!(investments.iter().any(|inv| inv.stage == Stage::PreSeed));
        assert!(investments.iter().all(|inv| inv.is_breakout));
    }

    #[test]
    fn own_stage_breakout_only_uses_slot_probability() {
        let mut config = FundConfig::default();
        config.breakout_draw = BreakoutDraw::OwnStage;
        config.seed.breakout_probability = 100.0;
        config.pre_seed.breakout_probability = 0.0;
        config.fund_size = 50_000_000.0;
        let mut rng = StdRng::seed_from_u64(23);

        let investments = generate(&config, &mut rng).expect("valid config");
        assert!(investments.iter().any(|inv| inv.stage == Stage::PreSeed));
        for inv in &investments {
            assert_eq!(inv.is_breakout, inv.stage == Stage::Seed);
        }
    }

    #[test]
    fn small_tier_marks_up_entry_valuation() {
        let mut config = FundConfig::default();
        config.exits.small_probability = 100.0;
        config.exits.large_probability = 0.0;
        config.seed.breakout_probability = 0.0;
        config.pre_seed.breakout_probability = 0.0;
        let mut rng = StdRng::seed_from_u64(5);

        for inv in generate(&config, &mut rng).expect("valid config") {
            assert_eq!(inv.exit_tier, ExitTier::Small);
            let multiple = inv.exit_valuation / inv.entry_valuation;
            assert!((1.0..2.0).contains(&multiple), "multiple {multiple}");
        }
    }

    #[test]
    fn absolute_small_tier_draws_from_currency_range() {
        let mut config = FundConfig::default();
        config.exits.small_probability = 100.0;
        config.exits.large_probability = 0.0;
        config.exits.small = SmallExitModel::Absolute(ValueRange::new(1e6, 2e6));
        config.seed.breakout_probability = 0.0;
        config.pre_seed.breakout_probability = 0.0;
        let mut rng = StdRng::seed_from_u64(6);

        for inv in generate(&config, &mut rng).expect("valid config") {
            assert!((1e6..2e6).contains(&inv.exit_valuation));
        }
    }

    #[test]
    fn medium_only_mixture_never_draws_other_tiers() {
        let mut config = FundConfig::default();
        config.exits.small_probability = 0.0;
        config.exits.large_probability = 0.0;
        config.seed.breakout_probability = 0.0;
        config.pre_seed.breakout_probability = 0.0;
        let mut rng = StdRng::seed_from_u64(8);

        for inv in generate(&config, &mut rng).expect("valid config") {
            assert_eq!(inv.exit_tier, ExitTier::Medium);
            assert!(config.exits.medium.contains(inv.exit_valuation));
        }
    }

    #[test]
    fn same_seed_generates_same_portfolio() {
        let config = FundConfig::default();
        let first = generate(&config, &mut StdRng::seed_from_u64(77)).expect("valid config");
        let second = generate(&config, &mut StdRng::seed_from_u64(77)).expect("valid config");
        assert_eq!(first, second);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = FundConfig::default();
        config.exits.small_probability = 90.0;
        config.exits.large_probability = 20.0;
        let err = generate(&config, &mut StdRng::seed_from_u64(1)).expect_err("must reject");
        assert!(err.is_configuration());
    }

    #[test]
    fn round_limit_breakouts_stay_in_range() {
        let mut config = FundConfig::default();
        config.seed.rounds = RoundsRange::new(MAX_ROUNDS, MAX_ROUNDS);
        config.pre_seed.rounds = config.seed.rounds;
        config.seed.breakout_probability = 100.0;
        let mut rng = StdRng::seed_from_u64(31);

        for inv in generate(&config, &mut rng).expect("valid config") {
            assert_eq!(inv.future_rounds, MAX_ROUNDS + 1);
            assert_eq!(inv.exit_time, MAX_ROUNDS + 3);
        }

        config.seed.rounds = RoundsRange::new(u32::MAX, u32::MAX);
        let err = generate(&config, &mut rng).expect_err("must reject");
        assert!(err.is_configuration());
    }

    proptest! {
        #[test]
        fn prop_generated_investments_respect_stage_ranges(
            seed in any::<u64>(),
            fund_mm in 1u32..60,
            seed_dilution in 0.0f64..100.0,
            breakout in 0.0f64..100.0,
        ) {
            let mut config = FundConfig::default();
            config.fund_size = fund_mm as f64 * 1e6;
            config.seed.dilution_per_round = seed_dilution;
            config.seed.breakout_probability = breakout;
            let mut rng = StdRng::seed_from_u64(seed);

            let investments = generate(&config, &mut rng).expect("valid config");
            prop_assert_eq!(investments.len(), portfolio_size(&config));

            for inv in &investments {
                let stage = config.stage(inv.stage);
                prop_assert!(inv.exit_time >= 1);
                prop_assert!(stage.check_size.contains(inv.check_size));
                prop_assert!(stage.valuation.contains(inv.entry_valuation));
                prop_assert_eq!(inv.dilution_rate, stage.dilution_per_round);
                let extra = if inv.is_breakout { 1 } else { 0 };
                prop_assert!(inv.future_rounds >= stage.rounds.min + extra);
                prop_assert!(inv.future_rounds <= stage.rounds.max + extra);
                prop_assert_eq!(inv.exit_time, inv.future_rounds + 1 + extra);
                prop_assert!(inv.exit_valuation >= 0.0);
            }
        }
    }
}
