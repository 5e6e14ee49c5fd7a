use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::core::{
    BatchConfig, BatchResult, BatchSummary, BreakoutDraw, ExitMixture, FundConfig, HistogramBin,
    InvestmentOutcome, RoundsRange, SimulationError, SimulationResult, SmallExitModel,
    StageConfig, StageMix, ValueRange, moic_histogram, run_batch, validate_fund_config,
};

const THOUSAND: f64 = 1e3;
const MILLION: f64 = 1e6;
const BILLION: f64 = 1e9;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliBreakoutDraw {
    EitherStage,
    OwnStage,
}

impl From<CliBreakoutDraw> for BreakoutDraw {
    fn from(value: CliBreakoutDraw) -> Self {
        match value {
            CliBreakoutDraw::EitherStage => BreakoutDraw::EitherStage,
            CliBreakoutDraw::OwnStage => BreakoutDraw::OwnStage,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliSmallExitModel {
    EntryMultiple,
    Absolute,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiBreakoutDraw {
    #[serde(alias = "eitherStage", alias = "either_stage", alias = "either")]
    EitherStage,
    #[serde(alias = "ownStage", alias = "own_stage", alias = "own")]
    OwnStage,
}

impl From<ApiBreakoutDraw> for CliBreakoutDraw {
    fn from(value: ApiBreakoutDraw) -> Self {
        match value {
            ApiBreakoutDraw::EitherStage => CliBreakoutDraw::EitherStage,
            ApiBreakoutDraw::OwnStage => CliBreakoutDraw::OwnStage,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiSmallExitModel {
    #[serde(alias = "entryMultiple", alias = "entry_multiple", alias = "multiple")]
    EntryMultiple,
    Absolute,
}

impl From<ApiSmallExitModel> for CliSmallExitModel {
    fn from(value: ApiSmallExitModel) -> Self {
        match value {
            ApiSmallExitModel::EntryMultiple => CliSmallExitModel::EntryMultiple,
            ApiSmallExitModel::Absolute => CliSmallExitModel::Absolute,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    fund_size: Option<f64>,
    simulations: Option<u32>,
    seed: Option<u64>,
    max_recycling: Option<f64>,
    recycling_rate: Option<f64>,

    seed_valuation_min: Option<f64>,
    seed_valuation_max: Option<f64>,
    seed_check_min: Option<f64>,
    seed_check_max: Option<f64>,
    seed_dilution: Option<f64>,
    seed_rounds_min: Option<u32>,
    seed_rounds_max: Option<u32>,
    seed_breakout: Option<f64>,

    preseed_valuation_min: Option<f64>,
    preseed_valuation_max: Option<f64>,
    preseed_check_min: Option<f64>,
    preseed_check_max: Option<f64>,
    preseed_dilution: Option<f64>,
    preseed_rounds_min: Option<u32>,
    preseed_rounds_max: Option<u32>,
    preseed_breakout: Option<f64>,

    seed_weight: Option<f64>,
    preseed_weight: Option<f64>,
    breakout_draw: Option<ApiBreakoutDraw>,

    small_probability: Option<f64>,
    large_probability: Option<f64>,
    small_exit_model: Option<ApiSmallExitModel>,
    small_multiple_min: Option<f64>,
    small_multiple_max: Option<f64>,
    small_exit_min: Option<f64>,
    small_exit_max: Option<f64>,
    medium_exit_min: Option<f64>,
    medium_exit_max: Option<f64>,
    large_exit_min: Option<f64>,
    large_exit_max: Option<f64>,

    histogram_bins: Option<usize>,
    include_sample: Option<bool>,
}

#[derive(Parser, Debug)]
#[command(
    name = "vcsim",
    about = "Monte Carlo VC fund estimator (Seed + Pre-Seed portfolio, dilution, tiered exits)"
)]
struct Cli {
    #[arg(long, default_value_t = 10.0, help = "Total fund size ($MM)")]
    fund_size_mm: f64,
    #[arg(long, default_value_t = 20)]
    simulations: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value_t = 2.0, help = "Max recycling ($MM)")]
    max_recycling_mm: f64,
    #[arg(
        long,
        default_value_t = 20.0,
        help = "Share of distributions recycled before the cap, in percent"
    )]
    recycling_rate: f64,

    #[arg(long, default_value_t = 8.0, help = "Seed entry valuation minimum ($MM)")]
    seed_valuation_min_mm: f64,
    #[arg(long, default_value_t = 15.0, help = "Seed entry valuation maximum ($MM)")]
    seed_valuation_max_mm: f64,
    #[arg(long, default_value_t = 400.0, help = "Seed check size minimum ($K)")]
    seed_check_min_k: f64,
    #[arg(long, default_value_t = 600.0, help = "Seed check size maximum ($K)")]
    seed_check_max_k: f64,
    #[arg(long, default_value_t = 20.0, help = "Seed dilution per round in percent")]
    seed_dilution: f64,
    #[arg(long, default_value_t = 2)]
    seed_rounds_min: u32,
    #[arg(long, default_value_t = 5)]
    seed_rounds_max: u32,
    #[arg(long, default_value_t = 10.0, help = "Seed breakout probability in percent")]
    seed_breakout_probability: f64,

    #[arg(long, default_value_t = 6.0, help = "Pre-Seed entry valuation minimum ($MM)")]
    preseed_valuation_min_mm: f64,
    #[arg(long, default_value_t = 8.0, help = "Pre-Seed entry valuation maximum ($MM)")]
    preseed_valuation_max_mm: f64,
    #[arg(long, default_value_t = 150.0, help = "Pre-Seed check size minimum ($K)")]
    preseed_check_min_k: f64,
    #[arg(long, default_value_t = 300.0, help = "Pre-Seed check size maximum ($K)")]
    preseed_check_max_k: f64,
    #[arg(
        long,
        default_value_t = 20.0,
        help = "Pre-Seed dilution per round in percent"
    )]
    preseed_dilution: f64,
    #[arg(long, default_value_t = 2)]
    preseed_rounds_min: u32,
    #[arg(long, default_value_t = 6)]
    preseed_rounds_max: u32,
    #[arg(
        long,
        default_value_t = 10.0,
        help = "Pre-Seed breakout probability in percent"
    )]
    preseed_breakout_probability: f64,

    #[arg(long, default_value_t = 60.0, help = "Relative weight of Seed slots")]
    seed_weight: f64,
    #[arg(long, default_value_t = 40.0, help = "Relative weight of Pre-Seed slots")]
    preseed_weight: f64,
    #[arg(
        long,
        value_enum,
        default_value_t = CliBreakoutDraw::EitherStage,
        help = "Breakout draws: both stage probabilities for every slot, or the slot's own stage only"
    )]
    breakout_draw: CliBreakoutDraw,

    #[arg(long, default_value_t = 50.0, help = "Probability of a small exit in percent")]
    small_exit_probability: f64,
    #[arg(long, default_value_t = 10.0, help = "Probability of a large exit in percent")]
    large_exit_probability: f64,
    #[arg(
        long,
        value_enum,
        default_value_t = CliSmallExitModel::EntryMultiple,
        help = "Small exits as a multiple of entry valuation, or as an absolute size"
    )]
    small_exit_model: CliSmallExitModel,
    #[arg(long, default_value_t = 1.0)]
    small_multiple_min: f64,
    #[arg(long, default_value_t = 2.0)]
    small_multiple_max: f64,
    #[arg(
        long,
        default_value_t = 1.0,
        help = "Small exit size minimum ($MM), used with --small-exit-model=absolute"
    )]
    small_exit_min_mm: f64,
    #[arg(
        long,
        default_value_t = 2.0,
        help = "Small exit size maximum ($MM), used with --small-exit-model=absolute"
    )]
    small_exit_max_mm: f64,
    #[arg(long, default_value_t = 20.0, help = "Medium exit size minimum ($MM)")]
    medium_exit_min_mm: f64,
    #[arg(long, default_value_t = 50.0, help = "Medium exit size maximum ($MM)")]
    medium_exit_max_mm: f64,
    #[arg(long, default_value_t = 1.0, help = "Large exit size minimum ($B)")]
    large_exit_min_bn: f64,
    #[arg(long, default_value_t = 2.0, help = "Large exit size maximum ($B)")]
    large_exit_max_bn: f64,

    #[arg(long, default_value_t = 15, help = "Bins in the MOIC distribution")]
    histogram_bins: usize,
    #[arg(long, help = "Skip the per-investment sample run")]
    no_sample: bool,
}

#[derive(Debug)]
struct RunRequest {
    config: FundConfig,
    batch: BatchConfig,
    histogram_bins: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SampleInvestment {
    #[serde(flatten)]
    outcome: InvestmentOutcome,
    exit_multiple: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SampleResponse {
    result: SimulationResult,
    investments: Vec<SampleInvestment>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    seed: u64,
    simulations: u32,
    medium_exit_probability: f64,
    summary: BatchSummary,
    runs: Vec<SimulationResult>,
    histogram: Vec<HistogramBin>,
    sample: Option<SampleResponse>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_request(cli: Cli) -> Result<RunRequest, String> {
    if cli.simulations == 0 {
        return Err("--simulations must be > 0".to_string());
    }

    if !cli.fund_size_mm.is_finite() || cli.fund_size_mm <= 0.0 {
        return Err("--fund-size-mm must be > 0".to_string());
    }

    if !cli.max_recycling_mm.is_finite() || cli.max_recycling_mm < 0.0 {
        return Err("--max-recycling-mm must be >= 0".to_string());
    }

    if cli.histogram_bins == 0 {
        return Err("--histogram-bins must be > 0".to_string());
    }

    for (min_name, min, max_name, max) in [
        (
            "--seed-valuation-min-mm",
            cli.seed_valuation_min_mm,
            "--seed-valuation-max-mm",
            cli.seed_valuation_max_mm,
        ),
        (
            "--seed-check-min-k",
            cli.seed_check_min_k,
            "--seed-check-max-k",
            cli.seed_check_max_k,
        ),
        (
            "--preseed-valuation-min-mm",
            cli.preseed_valuation_min_mm,
            "--preseed-valuation-max-mm",
            cli.preseed_valuation_max_mm,
        ),
        (
            "--preseed-check-min-k",
            cli.preseed_check_min_k,
            "--preseed-check-max-k",
            cli.preseed_check_max_k,
        ),
        (
            "--small-exit-min-mm",
            cli.small_exit_min_mm,
            "--small-exit-max-mm",
            cli.small_exit_max_mm,
        ),
        (
            "--medium-exit-min-mm",
            cli.medium_exit_min_mm,
            "--medium-exit-max-mm",
            cli.medium_exit_max_mm,
        ),
        (
            "--large-exit-min-bn",
            cli.large_exit_min_bn,
            "--large-exit-max-bn",
            cli.large_exit_max_bn,
        ),
    ] {
        if min > max {
            return Err(format!("{min_name} must be <= {max_name}"));
        }
    }

    let small = match cli.small_exit_model {
        CliSmallExitModel::EntryMultiple => SmallExitModel::EntryMultiple(ValueRange::new(
            cli.small_multiple_min,
            cli.small_multiple_max,
        )),
        CliSmallExitModel::Absolute => SmallExitModel::Absolute(ValueRange::new(
            cli.small_exit_min_mm * MILLION,
            cli.small_exit_max_mm * MILLION,
        )),
    };

    let config = FundConfig {
        fund_size: cli.fund_size_mm * MILLION,
        max_recycling: cli.max_recycling_mm * MILLION,
        recycling_rate: cli.recycling_rate,
        seed: StageConfig {
            valuation: ValueRange::new(
                cli.seed_valuation_min_mm * MILLION,
                cli.seed_valuation_max_mm * MILLION,
            ),
            check_size: ValueRange::new(
                cli.seed_check_min_k * THOUSAND,
                cli.seed_check_max_k * THOUSAND,
            ),
            dilution_per_round: cli.seed_dilution,
            rounds: RoundsRange::new(cli.seed_rounds_min, cli.seed_rounds_max),
            breakout_probability: cli.seed_breakout_probability,
        },
        pre_seed: StageConfig {
            valuation: ValueRange::new(
                cli.preseed_valuation_min_mm * MILLION,
                cli.preseed_valuation_max_mm * MILLION,
            ),
            check_size: ValueRange::new(
                cli.preseed_check_min_k * THOUSAND,
                cli.preseed_check_max_k * THOUSAND,
            ),
            dilution_per_round: cli.preseed_dilution,
            rounds: RoundsRange::new(cli.preseed_rounds_min, cli.preseed_rounds_max),
            breakout_probability: cli.preseed_breakout_probability,
        },
        stage_mix: StageMix {
            seed_weight: cli.seed_weight,
            pre_seed_weight: cli.preseed_weight,
        },
        breakout_draw: cli.breakout_draw.into(),
        exits: ExitMixture {
            small_probability: cli.small_exit_probability,
            large_probability: cli.large_exit_probability,
            small,
            medium: ValueRange::new(
                cli.medium_exit_min_mm * MILLION,
                cli.medium_exit_max_mm * MILLION,
            ),
            large: ValueRange::new(
                cli.large_exit_min_bn * BILLION,
                cli.large_exit_max_bn * BILLION,
            ),
        },
    };
    validate_fund_config(&config).map_err(|e| e.to_string())?;

    Ok(RunRequest {
        config,
        batch: BatchConfig {
            num_simulations: cli.simulations,
            seed: cli.seed,
            include_sample: !cli.no_sample,
        },
        histogram_bins: cli.histogram_bins,
    })
}

/// Parses flags (the first item is treated as the program name), runs one batch
/// and prints the JSON response to stdout.
pub fn run_cli<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let request = build_request(Cli::parse_from(args))?;
    let response = run_request(&request).map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&response)
        .map_err(|e| format!("failed to serialize response: {e}"))?;
    println!("{json}");
    Ok(())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "vcsim HTTP API listening");
    info!("Local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    debug!(
        runs = request.batch.num_simulations,
        seed = request.batch.seed,
        "simulate request"
    );

    let outcome = tokio::task::spawn_blocking(move || run_request(&request)).await;
    match outcome {
        Ok(Ok(response)) => json_response(StatusCode::OK, response),
        Ok(Err(err)) => error_response(status_for(&err), &err.to_string()),
        Err(join_err) => {
            error!(error = %join_err, "simulation task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Simulation failed")
        }
    }
}

fn run_request(request: &RunRequest) -> Result<SimulateResponse, SimulationError> {
    let output = run_batch(&request.config, &request.batch)?;
    Ok(build_simulate_response(request, output))
}

fn status_for(err: &SimulationError) -> StatusCode {
    if err.is_configuration() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn request_from_json(json: &str) -> Result<RunRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    request_from_payload(payload)
}

fn request_from_payload(payload: SimulatePayload) -> Result<RunRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.fund_size {
        cli.fund_size_mm = v;
    }
    if let Some(v) = payload.simulations {
        cli.simulations = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }
    if let Some(v) = payload.max_recycling {
        cli.max_recycling_mm = v;
    }
    if let Some(v) = payload.recycling_rate {
        cli.recycling_rate = v;
    }

    if let Some(v) = payload.seed_valuation_min {
        cli.seed_valuation_min_mm = v;
    }
    if let Some(v) = payload.seed_valuation_max {
        cli.seed_valuation_max_mm = v;
    }
    if let Some(v) = payload.seed_check_min {
        cli.seed_check_min_k = v;
    }
    if let Some(v) = payload.seed_check_max {
        cli.seed_check_max_k = v;
    }
    if let Some(v) = payload.seed_dilution {
        cli.seed_dilution = v;
    }
    if let Some(v) = payload.seed_rounds_min {
        cli.seed_rounds_min = v;
    }
    if let Some(v) = payload.seed_rounds_max {
        cli.seed_rounds_max = v;
    }
    if let Some(v) = payload.seed_breakout {
        cli.seed_breakout_probability = v;
    }

    if let Some(v) = payload.preseed_valuation_min {
        cli.preseed_valuation_min_mm = v;
    }
    if let Some(v) = payload.preseed_valuation_max {
        cli.preseed_valuation_max_mm = v;
    }
    if let Some(v) = payload.preseed_check_min {
        cli.preseed_check_min_k = v;
    }
    if let Some(v) = payload.preseed_check_max {
        cli.preseed_check_max_k = v;
    }
    if let Some(v) = payload.preseed_dilution {
        cli.preseed_dilution = v;
    }
    if let Some(v) = payload.preseed_rounds_min {
        cli.preseed_rounds_min = v;
    }
    if let Some(v) = payload.preseed_rounds_max {
        cli.preseed_rounds_max = v;
    }
    if let Some(v) = payload.preseed_breakout {
        cli.preseed_breakout_probability = v;
    }

    if let Some(v) = payload.seed_weight {
        cli.seed_weight = v;
    }
    if let Some(v) = payload.preseed_weight {
        cli.preseed_weight = v;
    }
    if let Some(v) = payload.breakout_draw {
        cli.breakout_draw = v.into();
    }

    if let Some(v) = payload.small_probability {
        cli.small_exit_probability = v;
    }
    if let Some(v) = payload.large_probability {
        cli.large_exit_probability = v;
    }
    if let Some(v) = payload.small_exit_model {
        cli.small_exit_model = v.into();
    }
    if let Some(v) = payload.small_multiple_min {
        cli.small_multiple_min = v;
    }
    if let Some(v) = payload.small_multiple_max {
        cli.small_multiple_max = v;
    }
    if let Some(v) = payload.small_exit_min {
        cli.small_exit_min_mm = v;
    }
    if let Some(v) = payload.small_exit_max {
        cli.small_exit_max_mm = v;
    }
    if let Some(v) = payload.medium_exit_min {
        cli.medium_exit_min_mm = v;
    }
    if let Some(v) = payload.medium_exit_max {
        cli.medium_exit_max_mm = v;
    }
    if let Some(v) = payload.large_exit_min {
        cli.large_exit_min_bn = v;
    }
    if let Some(v) = payload.large_exit_max {
        cli.large_exit_max_bn = v;
    }

    if let Some(v) = payload.histogram_bins {
        cli.histogram_bins = v;
    }
    if let Some(v) = payload.include_sample {
        cli.no_sample = !v;
    }

    build_request(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        fund_size_mm: 10.0,
        simulations: 20,
        seed: 42,
        max_recycling_mm: 2.0,
        recycling_rate: 20.0,
        seed_valuation_min_mm: 8.0,
        seed_valuation_max_mm: 15.0,
        seed_check_min_k: 400.0,
        seed_check_max_k: 600.0,
        seed_dilution: 20.0,
        seed_rounds_min: 2,
        seed_rounds_max: 5,
        seed_breakout_probability: 10.0,
        preseed_valuation_min_mm: 6.0,
        preseed_valuation_max_mm: 8.0,
        preseed_check_min_k: 150.0,
        preseed_check_max_k: 300.0,
        preseed_dilution: 20.0,
        preseed_rounds_min: 2,
        preseed_rounds_max: 6,
        preseed_breakout_probability: 10.0,
        seed_weight: 60.0,
        preseed_weight: 40.0,
        breakout_draw: CliBreakoutDraw::EitherStage,
        small_exit_probability: 50.0,
        large_exit_probability: 10.0,
        small_exit_model: CliSmallExitModel::EntryMultiple,
        small_multiple_min: 1.0,
        small_multiple_max: 2.0,
        small_exit_min_mm: 1.0,
        small_exit_max_mm: 2.0,
        medium_exit_min_mm: 20.0,
        medium_exit_max_mm: 50.0,
        large_exit_min_bn: 1.0,
        large_exit_max_bn: 2.0,
        histogram_bins: 15,
        no_sample: false,
    }
}

fn build_simulate_response(request: &RunRequest, output: BatchResult) -> SimulateResponse {
    let histogram = moic_histogram(&output.results, request.histogram_bins);
    let sample = output.sample.map(|run| SampleResponse {
        result: run.result,
        investments: run
            .investments
            .into_iter()
            .map(|outcome| SampleInvestment {
                exit_multiple: outcome.exit_multiple(),
                outcome,
            })
            .collect(),
    });

    SimulateResponse {
        seed: request.batch.seed,
        simulations: request.batch.num_simulations,
        medium_exit_probability: request.config.exits.medium_probability(),
        summary: output.summary,
        runs: output.results,
        histogram,
        sample,
    }
}
