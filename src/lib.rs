//! Monte Carlo estimator for venture fund outcomes.
//!
//! [`core`] synthesizes Seed and Pre-Seed portfolios, dilutes each position
//! through its future rounds, draws tiered exits and reduces many runs to
//! MOIC / IRR statistics. [`api`] wraps it in a CLI and an HTTP JSON API.

pub mod api;
pub mod core;
