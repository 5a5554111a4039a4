use crate::config::FitterConfig;
use crate::optimizer::MinimizeOptions;
use serde::Serialize;

/// Log-parameters beyond this magnitude are treated as a runaway estimate.
pub(crate) const MAX_ABS_LOG_PARAM: f64 = 30.0;

/// Optimizers start every log-parameter here.
pub(crate) const INITIAL_LOG_PARAM: f64 = 0.1;

/// Times are rescaled so the largest lands here before fitting.
pub(crate) const SCALE_TARGET: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitDiagnostics {
    pub customers: usize,
    pub iterations: usize,
    pub gradient_norm: f64,
    /// Penalized negative mean log-likelihood at the optimum (scaled data).
    pub objective: f64,
    pub penalizer: f64,
}

pub(crate) fn out_of_bounds(log_params: &[f64]) -> bool {
    log_params.iter().any(|v| v.abs() > MAX_ABS_LOG_PARAM)
}

pub(crate) fn minimize_options(config: &FitterConfig) -> MinimizeOptions {
    MinimizeOptions {
        max_iterations: config.max_iterations,
        gradient_tolerance: config.tolerance,
    }
}

pub(crate) fn scale_factor(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(0.0_f64, f64::max);
    if max > 0.0 {
        SCALE_TARGET / max
    } else {
        1.0
    }
}

#[path = "fitters/beta_geo.rs"]
pub mod beta_geo;

pub use beta_geo::{BetaGeoFitter, BetaGeoModel, BetaGeoParams};

#[path = "fitters/gamma_gamma.rs"]
pub mod gamma_gamma;

pub use gamma_gamma::{frequency_monetary_correlation, GammaGammaFitter, GammaGammaModel, GammaGammaParams};
