use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use super::error::{Result, SimulationError};
use super::generator::generate;
use super::types::{
    BatchConfig, BatchResult, BatchSummary, FundConfig, HistogramBin, Investment,
    InvestmentOutcome, PortfolioRun, SimulationResult,
};
use super::validate::{validate_batch_config, validate_fund_config, warn_on_oversized_checks};

/// Seed stream for the N summary runs of a batch.
pub const RUN_STREAM: u32 = 0;
/// Seed stream for the detail sample run, kept apart from the summary runs.
pub const SAMPLE_STREAM: u32 = 1;

pub fn simulate(config: &FundConfig, rng: &mut impl Rng) -> Result<SimulationResult> {
    simulate_detailed(config, rng).map(|run| run.result)
}

pub fn simulate_seeded(config: &FundConfig, seed: u64) -> Result<SimulationResult> {
    let mut rng = StdRng::seed_from_u64(seed);
    simulate(config, &mut rng)
}

/// Runs one portfolio and keeps every investment's ownership and proceeds.
pub fn simulate_detailed(config: &FundConfig, rng: &mut impl Rng) -> Result<PortfolioRun> {
    let investments = generate(config, rng)?;
    if investments.is_empty() {
        return Err(SimulationError::empty_portfolio(
            config.fund_size,
            config.average_check_size(),
        ));
    }

    let investments = investments
        .into_iter()
        .map(evaluate_investment)
        .collect::<Vec<_>>();
    let result = aggregate(config, &investments)?;

    Ok(PortfolioRun {
        result,
        investments,
    })
}

/// Applies compounding dilution and values the remaining stake at exit.
pub fn evaluate_investment(investment: Investment) -> InvestmentOutcome {
    let ownership_entry = investment.check_size / investment.entry_valuation;
    let retained_per_round = 1.0 - investment.dilution_rate / 100.0;
    let ownership_exit =
        ownership_entry * retained_per_round.powf(f64::from(investment.future_rounds));

    InvestmentOutcome {
        investment,
        ownership_entry,
        ownership_exit,
        expected_value: ownership_exit * investment.exit_valuation,
    }
}

fn aggregate(config: &FundConfig, outcomes: &[InvestmentOutcome]) -> Result<SimulationResult> {
    let total_distributed = outcomes.iter().map(|o| o.expected_value).sum::<f64>();
    let recycled_amount =
        (total_distributed * config.recycling_rate / 100.0).min(config.max_recycling);
    let total_paid_in = config.fund_size + recycled_amount;

    if total_paid_in <= 0.0 {
        return Err(SimulationError::division_domain(
            "moic: total paid-in capital is zero",
        ));
    }
    let moic = total_distributed / total_paid_in;

    let mean_exit_time = outcomes
        .iter()
        .map(|o| o.investment.exit_time as f64)
        .sum::<f64>()
        / outcomes.len() as f64;
    let irr = annualized_irr(moic, mean_exit_time)?;

    Ok(SimulationResult {
        total_paid_in,
        total_distributed,
        recycled_amount,
        moic,
        irr,
        mean_exit_time,
        num_investments: outcomes.len(),
    })
}

/// `(moic^(1/t) - 1) * 100`.
///
/// A MOIC of exactly zero is accepted and maps to -100: every position was
/// written off, and `0^(1/t)` is still a real root. Only a negative or
/// non-finite MOIC has no annualized rate and is a `DivisionDomain` error.
pub fn annualized_irr(moic: f64, mean_exit_time: f64) -> Result<f64> {
    if !moic.is_finite() || moic < 0.0 {
        return Err(SimulationError::division_domain(format!(
            "irr: moic {moic} has no real root"
        )));
    }
    if !mean_exit_time.is_finite() || mean_exit_time < 1.0 {
        return Err(SimulationError::division_domain(format!(
            "irr: mean exit time {mean_exit_time} is below one period"
        )));
    }
    Ok((moic.powf(1.0 / mean_exit_time) - 1.0) * 100.0)
}

/// Runs `num_simulations` independent portfolios plus an optional detail sample.
///
/// Run `i` draws from its own stream seeded with
/// `derive_seed(batch.seed, RUN_STREAM, i)`, so the output does not depend on
/// how rayon schedules the runs. Any failing run aborts the batch.
pub fn run_batch(config: &FundConfig, batch: &BatchConfig) -> Result<BatchResult> {
    validate_fund_config(config)?;
    validate_batch_config(batch)?;
    warn_on_oversized_checks(config);

    info!(
        runs = batch.num_simulations,
        seed = batch.seed,
        fund_size = config.fund_size,
        "starting simulation batch"
    );

    let results = (0..batch.num_simulations)
        .into_par_iter()
        .map(|run_id| simulate_seeded(config, derive_seed(batch.seed, RUN_STREAM, run_id)))
        .collect::<Result<Vec<_>>>()?;
    let summary = summarize(&results)?;

    let sample = if batch.include_sample {
        let mut rng = StdRng::seed_from_u64(derive_seed(batch.seed, SAMPLE_STREAM, 0));
        let run = simulate_detailed(config, &mut rng)?;
        debug!(
            investments = run.investments.len(),
            moic = run.result.moic,
            "sample run complete"
        );
        Some(run)
    } else {
        None
    };

    info!(
        mean_moic = summary.mean_moic,
        median_moic = summary.median_moic,
        mean_irr = summary.mean_irr,
        "simulation batch complete"
    );

    Ok(BatchResult {
        results,
        summary,
        sample,
    })
}

pub fn summarize(results: &[SimulationResult]) -> Result<BatchSummary> {
    if results.is_empty() {
        return Err(SimulationError::EmptyBatch);
    }

    let mut moics = results.iter().map(|r| r.moic).collect::<Vec<_>>();
    let mut irrs = results.iter().map(|r| r.irr).collect::<Vec<_>>();

    Ok(BatchSummary {
        runs: results.len(),
        mean_paid_in: mean_of(results, |r| r.total_paid_in),
        mean_distributed: mean_of(results, |r| r.total_distributed),
        mean_moic: mean_of(results, |r| r.moic),
        mean_irr: mean_of(results, |r| r.irr),
        mean_num_investments: mean_of(results, |r| r.num_investments as f64),
        p10_moic: percentile(&mut moics, 10.0),
        median_moic: percentile(&mut moics, 50.0),
        p90_moic: percentile(&mut moics, 90.0),
        p10_irr: percentile(&mut irrs, 10.0),
        median_irr: percentile(&mut irrs, 50.0),
    })
}

/// Equal-width MOIC bins spanning the observed minimum to maximum.
pub fn moic_histogram(results: &[SimulationResult], bins: usize) -> Vec<HistogramBin> {
    if results.is_empty() || bins == 0 {
        return Vec::new();
    }

    let lower = results.iter().map(|r| r.moic).fold(f64::INFINITY, f64::min);
    let upper = results
        .iter()
        .map(|r| r.moic)
        .fold(f64::NEG_INFINITY, f64::max);
    let width = (upper - lower) / bins as f64;

    let mut counts = vec![0_usize; bins];
    for result in results {
        let idx = if width > 0.0 {
            (((result.moic - lower) / width) as usize).min(bins - 1)
        } else {
            0
        };
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(idx, count)| HistogramBin {
            lower: lower + width * idx as f64,
            upper: if idx == bins - 1 {
                upper
            } else {
                lower + width * (idx + 1) as f64
            },
            count,
        })
        .collect()
}

fn mean_of(results: &[SimulationResult], field: impl Fn(&SimulationResult) -> f64) -> f64 {
    results.iter().map(field).sum::<f64>() / results.len() as f64
}

pub fn derive_seed(base_seed: u64, stream: u32, run_id: u32) -> u64 {
    let mixed = base_seed ^ ((stream as u64) << 32) ^ run_id as u64;
    splitmix64(mixed)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}
