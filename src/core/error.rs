//! Error types for the fund simulator.

use thiserror::Error;

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, SimulationError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// The fund or batch configuration is invalid. Raised before any random draw.
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    /// The fund is too small to place a single check.
    #[error(
        "Empty portfolio: fund size {fund_size} buys no checks at an average check size of {average_check}"
    )]
    EmptyPortfolio { fund_size: f64, average_check: f64 },

    /// A ratio or fractional power was taken outside its domain.
    #[error("Division domain error in {context}")]
    DivisionDomain { context: String },

    /// Summary statistics were requested over zero runs.
    #[error("No simulation results to summarize")]
    EmptyBatch,
}

impl SimulationError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn empty_portfolio(fund_size: f64, average_check: f64) -> Self {
        Self::EmptyPortfolio {
            fund_size,
            average_check,
        }
    }

    pub fn division_domain(context: impl Into<String>) -> Self {
        Self::DivisionDomain {
            context: context.into(),
        }
    }

    /// Configuration errors apply to every run; the rest come from a run's draws.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}
