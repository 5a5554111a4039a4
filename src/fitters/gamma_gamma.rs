use super::{
    minimize_options, out_of_bounds, scale_factor, FitDiagnostics, INITIAL_LOG_PARAM,
    MAX_ABS_LOG_PARAM,
};
use crate::config::FitterConfig;
use crate::error::{CltvError, Result};
use crate::models::CustomerProfile;
use crate::optimizer::{minimize, MinimizeError, MinimizeOptions};
use log::info;
use serde::Serialize;
use statrs::function::gamma::ln_gamma;
use statrs::statistics::Statistics;

const MODEL: &str = "Gamma-Gamma";

/// Spend per transaction is Gamma(p, nu); nu varies across customers as Gamma(q, v).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GammaGammaParams {
    pub p: f64,
    pub q: f64,
    pub v: f64,
}

impl GammaGammaParams {
    fn from_log(log_params: &[f64]) -> Self {
        Self {
            p: log_params[0].exp(),
            q: log_params[1].exp(),
            v: log_params[2].exp(),
        }
    }

    fn as_array(&self) -> [f64; 3] {
        [self.p, self.q, self.v]
    }

    fn mean_log_likelihood(&self, frequency: &[f64], monetary: &[f64]) -> f64 {
        let GammaGammaParams { p, q, v } = *self;
        let shared = -ln_gamma(q) + q * v.ln();
        let total: f64 = frequency
            .iter()
            .zip(monetary)
            .map(|(&x, &m)| {
                let px = p * x;
                ln_gamma(px + q) - ln_gamma(px)
                    + (px - 1.0) * m.ln()
                    + px * x.ln()
                    - (px + q) * (x * m + v).ln()
            })
            .sum();
        shared + total / frequency.len() as f64
    }
}

#[derive(Debug, Clone)]
pub struct GammaGammaFitter {
    penalizer: f64,
    options: MinimizeOptions,
}

impl GammaGammaFitter {
    pub fn new(config: &FitterConfig) -> Self {
        Self {
            penalizer: config.penalizer,
            options: minimize_options(config),
        }
    }

    /// Penalized maximum-likelihood fit on (frequency, average spend).
    pub fn fit(&self, frequency: &[u32], monetary: &[f64]) -> Result<GammaGammaModel> {
        validate_observations(frequency, monetary)?;
        if let Some(position) = frequency.iter().position(|&x| x == 0) {
            return Err(CltvError::Precondition(format!(
                "{} fit needs at least one purchase per customer (row {} has {})",
                MODEL, position, frequency[position]
            )));
        }

        let scale = scale_factor(monetary);
        let x: Vec<f64> = frequency.iter().map(|&f| f as f64).collect();
        let scaled_monetary: Vec<f64> = monetary.iter().map(|m| m * scale).collect();
        let penalizer = self.penalizer;

        let objective = |log_params: &[f64]| {
            if out_of_bounds(log_params) {
                return f64::INFINITY;
            }
            let params = GammaGammaParams::from_log(log_params);
            let penalty: f64 = params.as_array().iter().map(|p| p * p).sum();
            -params.mean_log_likelihood(&x, &scaled_monetary) + penalizer * penalty
        };

        let minimum = minimize(objective, &[INITIAL_LOG_PARAM; 3], self.options).map_err(
            |error| match error {
                MinimizeError::NotConverged {
                    iterations,
                    gradient_norm,
                } => CltvError::NotConverged {
                    model: MODEL,
                    iterations,
                    gradient_norm,
                },
                MinimizeError::NonFiniteObjective(at) => CltvError::degenerate(
                    MODEL,
                    format!("log-likelihood is not finite at log-parameters {:?}", at),
                ),
            },
        )?;

        if let Some(log_param) = minimum.x.iter().find(|v| v.abs() >= MAX_ABS_LOG_PARAM - 1.0) {
            return Err(CltvError::degenerate(
                MODEL,
                format!("log-parameter {:.2} diverged", log_param),
            ));
        }

        let mut params = GammaGammaParams::from_log(&minimum.x);
        params.v /= scale;

        info!(
            "{} fitted on {} customers in {} iterations: p={:.4}, q={:.4}, v={:.4}",
            MODEL,
            frequency.len(),
            minimum.iterations,
            params.p,
            params.q,
            params.v
        );

        let mut model = GammaGammaModel::from_params(params)?;
        model.diagnostics = Some(FitDiagnostics {
            customers: frequency.len(),
            iterations: minimum.iterations,
            gradient_norm: minimum.gradient_norm,
            objective: minimum.value,
            penalizer,
        });
        Ok(model)
    }
}

#[derive(Debug, Clone)]
pub struct GammaGammaModel {
    params: GammaGammaParams,
    diagnostics: Option<FitDiagnostics>,
}

impl GammaGammaModel {
    /// Requires q > 1, otherwise the population mean spend does not exist.
    pub fn from_params(params: GammaGammaParams) -> Result<Self> {
        if params
            .as_array()
            .iter()
            .any(|value| !value.is_finite() || *value <= 0.0)
        {
            return Err(CltvError::degenerate(
                MODEL,
                format!("parameters must be positive and finite ({:?})", params),
            ));
        }
        if params.q <= 1.0 {
            return Err(CltvError::degenerate(
                MODEL,
                format!("q = {:.4} leaves the mean spend undefined", params.q),
            ));
        }
        Ok(Self {
            params,
            diagnostics: None,
        })
    }

    pub fn params(&self) -> GammaGammaParams {
        self.params
    }

    pub fn diagnostics(&self) -> Option<&FitDiagnostics> {
        self.diagnostics.as_ref()
    }

    pub fn population_mean(&self) -> f64 {
        let GammaGammaParams { p, q, v } = self.params;
        v * p / (q - 1.0)
    }

    /// Posterior mean spend per transaction: a frequency-weighted blend of the
    /// customer's observed average and the population mean.
    pub fn conditional_expected_average_profit(&self, frequency: u32, monetary: f64) -> Result<f64> {
        if !monetary.is_finite() || monetary < 0.0 {
            return Err(CltvError::Precondition(format!(
                "{} needs a non-negative finite average spend (value: {})",
                MODEL, monetary
            )));
        }
        let GammaGammaParams { p, q, .. } = self.params;
        let px = p * frequency as f64;
        let weight = px / (px + q - 1.0);
        Ok((1.0 - weight) * self.population_mean() + weight * monetary)
    }

    pub fn expected_average_values(&self, profiles: &[CustomerProfile]) -> Result<Vec<f64>> {
        profiles
            .iter()
            .map(|profile| {
                self.conditional_expected_average_profit(profile.frequency, profile.monetary_avg)
            })
            .collect()
    }

    pub fn log_likelihood(&self, frequency: &[u32], monetary: &[f64]) -> Result<f64> {
        validate_observations(frequency, monetary)?;
        let x: Vec<f64> = frequency.iter().map(|&f| f as f64).collect();
        Ok(self.params.mean_log_likelihood(&x, monetary))
    }
}

/// Pearson correlation between frequency and average spend. The monetary model
/// assumes the two are independent. `None` when either column is constant.
pub fn frequency_monetary_correlation(profiles: &[CustomerProfile]) -> Option<f64> {
    if profiles.len() < 2 {
        return None;
    }
    let frequency: Vec<f64> = profiles.iter().map(|p| p.frequency as f64).collect();
    let monetary: Vec<f64> = profiles.iter().map(|p| p.monetary_avg).collect();
    let denominator = frequency.iter().std_dev() * monetary.iter().std_dev();
    if !denominator.is_finite() || denominator == 0.0 {
        return None;
    }
    let correlation = frequency.iter().covariance(monetary.iter()) / denominator;
    correlation.is_finite().then_some(correlation)
}

fn validate_observations(frequency: &[u32], monetary: &[f64]) -> Result<()> {
    if frequency.is_empty() {
        return Err(CltvError::Precondition(format!(
            "{} needs at least one customer",
            MODEL
        )));
    }
    if frequency.len() != monetary.len() {
        return Err(CltvError::Precondition(format!(
            "{} inputs differ in length (frequency {}, monetary {})",
            MODEL,
            frequency.len(),
            monetary.len()
        )));
    }
    if let Some(row) = monetary.iter().position(|m| !m.is_finite() || *m <= 0.0) {
        return Err(CltvError::Precondition(format!(
            "{} needs positive average spend (row {}: {})",
            MODEL, row, monetary[row]
        )));
    }
    Ok(())
}
