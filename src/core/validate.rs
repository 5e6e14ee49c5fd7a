use tracing::warn;

use super::error::{Result, SimulationError};
use super::types::{BatchConfig, ExitMixture, FundConfig, SmallExitModel, StageConfig, ValueRange};

/// Upper bound on future financing rounds per stage.
pub const MAX_ROUNDS: u32 = 1_000;
/// Upper bound on portfolio slots, `fund_size / average check`.
pub const MAX_PORTFOLIO_SIZE: usize = 100_000;

/// Checks every field of a fund configuration. Runs before any random draw.
pub fn validate_fund_config(config: &FundConfig) -> Result<()> {
    if !config.fund_size.is_finite() || config.fund_size <= 0.0 {
        return Err(SimulationError::configuration("fund_size must be > 0"));
    }

    if !config.max_recycling.is_finite() || config.max_recycling < 0.0 {
        return Err(SimulationError::configuration("max_recycling must be >= 0"));
    }

    check_percent("recycling_rate", config.recycling_rate)?;

    validate_stage("seed", &config.seed)?;
    validate_stage("pre_seed", &config.pre_seed)?;

    if config.average_check_size() <= 0.0 {
        return Err(SimulationError::configuration(
            "at least one stage must have a maximum check size > 0",
        ));
    }
    let slots = config.fund_size / config.average_check_size();
    if slots > MAX_PORTFOLIO_SIZE as f64 {
        return Err(SimulationError::configuration(format!(
            "fund_size allows {slots:.0} investments at the average check size, \
             more than the supported {MAX_PORTFOLIO_SIZE}"
        )));
    }

    let mix = config.stage_mix;
    for (name, weight) in [
        ("stage_mix.seed_weight", mix.seed_weight),
        ("stage_mix.pre_seed_weight", mix.pre_seed_weight),
    ] {
        if !weight.is_finite() || weight < 0.0 {
            return Err(SimulationError::configuration(format!(
                "{name} must be >= 0"
            )));
        }
    }
    if mix.seed_weight + mix.pre_seed_weight <= 0.0 {
        return Err(SimulationError::configuration(
            "stage_mix weights cannot both be zero",
        ));
    }

    validate_exits(&config.exits)
}

pub fn validate_batch_config(batch: &BatchConfig) -> Result<()> {
    if batch.num_simulations == 0 {
        return Err(SimulationError::configuration("num_simulations must be > 0"));
    }
    Ok(())
}

fn validate_stage(stage: &str, cfg: &StageConfig) -> Result<()> {
    check_range(&format!("{stage}.valuation"), cfg.valuation)?;
    if cfg.valuation.min <= 0.0 {
        return Err(SimulationError::configuration(format!(
            "{stage}.valuation minimum must be > 0"
        )));
    }
    check_range(&format!("{stage}.check_size"), cfg.check_size)?;
    check_percent(&format!("{stage}.dilution_per_round"), cfg.dilution_per_round)?;
    if cfg.rounds.min > cfg.rounds.max {
        return Err(SimulationError::configuration(format!(
            "{stage}.rounds minimum cannot exceed maximum"
        )));
    }
    if cfg.rounds.max > MAX_ROUNDS {
        return Err(SimulationError::configuration(format!(
            "{stage}.rounds maximum must be <= {MAX_ROUNDS}"
        )));
    }
    check_percent(
        &format!("{stage}.breakout_probability"),
        cfg.breakout_probability,
    )?;
    Ok(())
}

/// Logs stages whose ranges allow a check larger than the entry valuation.
/// Not an error: ownership above 100% is unusual but computable.
pub fn warn_on_oversized_checks(config: &FundConfig) -> usize {
    let mut flagged = 0;
    for (stage, cfg) in [("seed", &config.seed), ("pre_seed", &config.pre_seed)] {
        if cfg.check_size.max > cfg.valuation.min {
            warn!(
                stage,
                check_max = cfg.check_size.max,
                valuation_min = cfg.valuation.min,
                "check size can exceed entry valuation; ownership above 100% is possible"
            );
            flagged += 1;
        }
    }
    flagged
}

fn validate_exits(exits: &ExitMixture) -> Result<()> {
    check_percent("exits.small_probability", exits.small_probability)?;
    check_percent("exits.large_probability", exits.large_probability)?;
    if exits.small_probability + exits.large_probability > 100.0 {
        return Err(SimulationError::configuration(format!(
            "small and large exit probabilities sum to {}, which exceeds 100",
            exits.small_probability + exits.large_probability
        )));
    }

    match exits.small {
        SmallExitModel::EntryMultiple(range) => check_range("exits.small multiple", range)?,
        SmallExitModel::Absolute(range) => check_range("exits.small", range)?,
    }
    check_range("exits.medium", exits.medium)?;
    check_range("exits.large", exits.large)
}

fn check_range(name: &str, range: ValueRange) -> Result<()> {
    if !range.min.is_finite() || !range.max.is_finite() {
        return Err(SimulationError::configuration(format!(
            "{name} bounds must be finite"
        )));
    }
    if range.min < 0.0 {
        return Err(SimulationError::configuration(format!(
            "{name} minimum must be >= 0"
        )));
    }
    if range.min > range.max {
        return Err(SimulationError::configuration(format!(
            "{name} minimum cannot exceed maximum"
        )));
    }
    Ok(())
}

fn check_percent(name: &str, value: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(SimulationError::configuration(format!(
            "{name} must be between 0 and 100"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RoundsRange;

    fn expect_config_error(config: &FundConfig, needle: &str) {
        let err = validate_fund_config(config).expect_err("config must be rejected");
        assert!(err.is_configuration(), "unexpected error kind: {err}");
        assert!(
            err.to_string().contains(needle),
            "expected `{needle}` in `{err}`"
        );
    }

    #[test]
    fn default_config_is_valid() {
        validate_fund_config(&FundConfig::default()).expect("defaults are valid");
    }

    #[test]
    fn rejects_zero_fund_size() {
        let mut config = FundConfig::default();
        config.fund_size = 0.0;
        expect_config_error(&config, "fund_size");
    }

    #[test]
    fn rejects_negative_recycling_cap() {
        let mut config = FundConfig::default();
        config.max_recycling = -1.0;
        expect_config_error(&config, "max_recycling");
    }

    #[test]
    fn rejects_explicit_tiers_above_one_hundred() {
        let mut config = FundConfig::default();
        config.exits.small_probability = 90.0;
        config.exits.large_probability = 20.0;
        expect_config_error(&config, "exceeds 100");
    }

    #[test]
    fn accepts_explicit_tiers_summing_to_exactly_one_hundred() {
        let mut config = FundConfig::default();
        config.exits.small_probability = 70.0;
        config.exits.large_probability = 30.0;
        validate_fund_config(&config).expect("medium tier may be empty");
        assert_eq!(config.exits.medium_probability(), 0.0);
    }

    #[test]
    fn rejects_inverted_ranges() {
        let mut config = FundConfig::default();
        config.seed.check_size = ValueRange::new(600_000.0, 400_000.0);
        expect_config_error(&config, "seed.check_size");

        let mut config = FundConfig::default();
        config.pre_seed.rounds = RoundsRange::new(4, 2);
        expect_config_error(&config, "pre_seed.rounds");

        let mut config = FundConfig::default();
        config.exits.large = ValueRange::new(2e9, 1e9);
        expect_config_error(&config, "exits.large");
    }

    #[test]
    fn rejects_out_of_range_percentages() {
        let mut config = FundConfig::default();
        config.seed.dilution_per_round = 101.0;
        expect_config_error(&config, "seed.dilution_per_round");

        let mut config = FundConfig::default();
        config.pre_seed.breakout_probability = -5.0;
        expect_config_error(&config, "pre_seed.breakout_probability");

        let mut config = FundConfig::default();
        config.recycling_rate = f64::NAN;
        expect_config_error(&config, "recycling_rate");
    }

    #[test]
    fn rejects_round_counts_above_limit() {
        let mut config = FundConfig::default();
        config.seed.rounds = RoundsRange::new(3_000_000_000, 3_000_000_000);
        expect_config_error(&config, "seed.rounds maximum");

        let mut config = FundConfig::default();
        config.pre_seed.rounds = RoundsRange::new(0, MAX_ROUNDS + 1);
        expect_config_error(&config, "pre_seed.rounds maximum");

        let mut config = FundConfig::default();
        config.pre_seed.rounds = RoundsRange::new(MAX_ROUNDS, MAX_ROUNDS);
        validate_fund_config(&config).expect("limit itself is allowed");
    }

    #[test]
    fn rejects_funds_with_too_many_slots() {
        let mut config = FundConfig::default();
        config.fund_size = 1e300;
        expect_config_error(&config, "fund_size");

        // 450k average check: 1e9 $MM over HTTP.
        let mut config = FundConfig::default();
        config.fund_size = 1e15;
        expect_config_error(&config, "fund_size");

        let mut config = FundConfig::default();
        config.fund_size = 450_000.0 * MAX_PORTFOLIO_SIZE as f64;
        validate_fund_config(&config).expect("limit itself is allowed");
    }

    #[test]
    fn rejects_zero_valuation_minimum() {
        let mut config = FundConfig::default();
        config.pre_seed.valuation = ValueRange::new(0.0, 8e6);
        expect_config_error(&config, "pre_seed.valuation");
    }

    #[test]
    fn rejects_zero_stage_weights() {
        let mut config = FundConfig::default();
        config.stage_mix.seed_weight = 0.0;
        config.stage_mix.pre_seed_weight = 0.0;
        expect_config_error(&config, "stage_mix");
    }

    #[test]
    fn rejects_zero_check_maxima() {
        let mut config = FundConfig::default();
        config.seed.check_size = ValueRange::new(0.0, 0.0);
        config.pre_seed.check_size = ValueRange::new(0.0, 0.0);
        expect_config_error(&config, "maximum check size");
    }

    #[test]
    fn oversized_checks_are_flagged_but_valid() {
        assert_eq!(warn_on_oversized_checks(&FundConfig::default()), 0);

        let mut config = FundConfig::default();
        config.pre_seed.check_size = ValueRange::new(150_000.0, 9_000_000.0);
        validate_fund_config(&config).expect("oversized checks are not an error");
        assert_eq!(warn_on_oversized_checks(&config), 1);
    }

    #[test]
    fn rejects_zero_simulations() {
        let batch = BatchConfig {
            num_simulations: 0,
            ..BatchConfig::default()
        };
        let err = validate_batch_config(&batch).expect_err("must reject");
        assert!(err.to_string().contains("num_simulations"));
    }
}
