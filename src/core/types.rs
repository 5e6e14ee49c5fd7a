use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Seed,
    PreSeed,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitTier {
    Small,
    Medium,
    Large,
}

/// How breakout indicators are drawn for each portfolio slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BreakoutDraw {
    /// One Seed-probability and one Pre-Seed-probability draw for every slot, OR-ed.
    EitherStage,
    /// A single draw at the slot's own stage probability.
    OwnStage,
}

/// Closed currency range. Draws are uniform on `[min, max)`, or `min` when degenerate.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Inclusive range of future financing rounds.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RoundsRange {
    pub min: u32,
    pub max: u32,
}

impl RoundsRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StageConfig {
    pub valuation: ValueRange,
    pub check_size: ValueRange,
    /// Percent of ownership lost per future round, 0-100.
    pub dilution_per_round: f64,
    pub rounds: RoundsRange,
    /// Percent chance of a breakout draw firing, 0-100.
    pub breakout_probability: f64,
}

/// Relative weights of the stage draw. Need not sum to anything in particular.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StageMix {
    pub seed_weight: f64,
    pub pre_seed_weight: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SmallExitModel {
    /// Exit at entry valuation times a multiple drawn from the range.
    EntryMultiple(ValueRange),
    /// Exit at a currency value drawn from the range.
    Absolute(ValueRange),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ExitMixture {
    /// Percent, 0-100.
    pub small_probability: f64,
    /// Percent, 0-100. The medium tier takes whatever small and large leave.
    pub large_probability: f64,
    pub small: SmallExitModel,
    pub medium: ValueRange,
    pub large: ValueRange,
}

impl ExitMixture {
    pub fn medium_probability(&self) -> f64 {
        100.0 - self.small_probability - self.large_probability
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FundConfig {
    pub fund_size: f64,
    pub max_recycling: f64,
    /// Percent of distributions recycled before the `max_recycling` cap.
    pub recycling_rate: f64,
    pub seed: StageConfig,
    pub pre_seed: StageConfig,
    pub stage_mix: StageMix,
    pub breakout_draw: BreakoutDraw,
    pub exits: ExitMixture,
}

impl FundConfig {
    pub fn stage(&self, stage: Stage) -> &StageConfig {
        match stage {
            Stage::Seed => &self.seed,
            Stage::PreSeed => &self.pre_seed,
        }
    }

    /// Mean of the two stages' maximum check sizes; sets the portfolio size.
    pub fn average_check_size(&self) -> f64 {
        (self.seed.check_size.max + self.pre_seed.check_size.max) / 2.0
    }
}

impl Default for FundConfig {
    fn default() -> Self {
        Self {
            fund_size: 10_000_000.0,
            max_recycling: 2_000_000.0,
            recycling_rate: 20.0,
            seed: StageConfig {
                valuation: ValueRange::new(8_000_000.0, 15_000_000.0),
                check_size: ValueRange::new(400_000.0, 600_000.0),
                dilution_per_round: 20.0,
                rounds: RoundsRange::new(2, 5),
                breakout_probability: 10.0,
            },
            pre_seed: StageConfig {
                valuation: ValueRange::new(6_000_000.0, 8_000_000.0),
                check_size: ValueRange::new(150_000.0, 300_000.0),
                dilution_per_round: 20.0,
                rounds: RoundsRange::new(2, 6),
                breakout_probability: 10.0,
            },
            stage_mix: StageMix {
                seed_weight: 60.0,
                pre_seed_weight: 40.0,
            },
            breakout_draw: BreakoutDraw::EitherStage,
            exits: ExitMixture {
                small_probability: 50.0,
                large_probability: 10.0,
                small: SmallExitModel::EntryMultiple(ValueRange::new(1.0, 2.0)),
                medium: ValueRange::new(20_000_000.0, 50_000_000.0),
                large: ValueRange::new(1_000_000_000.0, 2_000_000_000.0),
            },
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Investment {
    pub stage: Stage,
    pub check_size: f64,
    pub entry_valuation: f64,
    /// Rounds still to be raised before exit, including the breakout round.
    pub future_rounds: u32,
    pub dilution_rate: f64,
    pub is_breakout: bool,
    pub exit_tier: ExitTier,
    pub exit_valuation: f64,
    pub exit_time: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentOutcome {
    #[serde(flatten)]
    pub investment: Investment,
    pub ownership_entry: f64,
    pub ownership_exit: f64,
    pub expected_value: f64,
}

impl InvestmentOutcome {
    pub fn exit_multiple(&self) -> f64 {
        self.expected_value / self.investment.check_size
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub total_paid_in: f64,
    pub total_distributed: f64,
    pub recycled_amount: f64,
    pub moic: f64,
    pub irr: f64,
    pub mean_exit_time: f64,
    pub num_investments: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioRun {
    pub result: SimulationResult,
    pub investments: Vec<InvestmentOutcome>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BatchConfig {
    pub num_simulations: u32,
    pub seed: u64,
    pub include_sample: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            num_simulations: 20,
            seed: 42,
            include_sample: true,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub runs: usize,
    pub mean_paid_in: f64,
    pub mean_distributed: f64,
    pub mean_moic: f64,
    pub mean_irr: f64,
    pub mean_num_investments: f64,
    pub p10_moic: f64,
    pub median_moic: f64,
    pub p90_moic: f64,
    pub p10_irr: f64,
    pub median_irr: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BatchResult {
    pub results: Vec<SimulationResult>,
    pub summary: BatchSummary,
    pub sample: Option<PortfolioRun>,
}
