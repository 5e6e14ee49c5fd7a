mod engine;
mod error;
mod generator;
mod types;
mod validate;

pub use engine::{
    RUN_STREAM, SAMPLE_STREAM, annualized_irr, derive_seed, evaluate_investment, moic_histogram,
    run_batch, simulate, simulate_detailed, simulate_seeded, summarize,
};
pub use error::{Result, SimulationError};
pub use generator::{generate, portfolio_size};
pub use types::{
    BatchConfig, BatchResult, BatchSummary, BreakoutDraw, ExitMixture, ExitTier, FundConfig,
    HistogramBin, Investment, InvestmentOutcome, PortfolioRun, RoundsRange, SimulationResult,
    SmallExitModel, Stage, StageConfig, StageMix, ValueRange,
};
pub use validate::{
    MAX_PORTFOLIO_SIZE, MAX_ROUNDS, validate_batch_config, validate_fund_config,
    warn_on_oversized_checks,
};
