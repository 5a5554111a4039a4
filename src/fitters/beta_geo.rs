use super::{
    minimize_options, out_of_bounds, scale_factor, FitDiagnostics, INITIAL_LOG_PARAM,
    MAX_ABS_LOG_PARAM,
};
use crate::config::FitterConfig;
use crate::error::{CltvError, Result};
use crate::models::{CustomerProfile, TimeUnit};
use crate::optimizer::{minimize, MinimizeError, MinimizeOptions};
use crate::special::ln_hyp2f1;
use log::info;
use serde::Serialize;
use statrs::function::gamma::ln_gamma;

const MODEL: &str = "BG/NBD";

/// Population parameters: Gamma(r, alpha) purchase rates, Beta(a, b) dropout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BetaGeoParams {
    pub r: f64,
    pub alpha: f64,
    pub a: f64,
    pub b: f64,
}

impl BetaGeoParams {
    fn from_log(log_params: &[f64]) -> Self {
        Self {
            r: log_params[0].exp(),
            alpha: log_params[1].exp(),
            a: log_params[2].exp(),
            b: log_params[3].exp(),
        }
    }

    fn as_array(&self) -> [f64; 4] {
        [self.r, self.alpha, self.a, self.b]
    }

    /// Mean log-likelihood of the observations under these parameters.
    fn mean_log_likelihood(&self, frequency: &[f64], recency: &[f64], tenure: &[f64]) -> f64 {
        let r = self.r;
        let alpha = self.alpha;
        let a = self.a;
        let b = self.b;
        let shared = -ln_gamma(r) + r * alpha.ln() + ln_gamma(a + b) - ln_gamma(b);
        let ln_a = a.ln();

        let mut total = 0.0;
        for ((&x, &t_x), &t) in frequency.iter().zip(recency).zip(tenure) {
            let a1_a2 = ln_gamma(r + x) + ln_gamma(b + x) - ln_gamma(a + b + x);
            let alive = -(r + x) * (alpha + t).ln();
            let mixture = if x > 0.0 {
                let dropped = ln_a - (b + x - 1.0).ln() - (r + x) * (alpha + t_x).ln();
                let max = alive.max(dropped);
                max + ((alive - max).exp() + (dropped - max).exp()).ln()
            } else {
                alive
            };
            total += a1_a2 + mixture;
        }
        shared + total / frequency.len() as f64
    }
}

#[derive(Debug, Clone)]
pub struct BetaGeoFitter {
    penalizer: f64,
    options: MinimizeOptions,
}

impl BetaGeoFitter {
    pub fn new(config: &FitterConfig) -> Self {
        Self {
            penalizer: config.penalizer,
            options: minimize_options(config),
        }
    }

    /// Penalized maximum-likelihood fit on (frequency, recency, tenure).
    pub fn fit(
        &self,
        frequency: &[u32],
        recency: &[f64],
        tenure: &[f64],
        time_unit: TimeUnit,
    ) -> Result<BetaGeoModel> {
        validate_observations(frequency, recency, tenure)?;
        if let Some(position) = frequency.iter().position(|&x| x <= 1) {
            return Err(CltvError::Precondition(format!(
                "{} fit needs frequency > 1 for every customer (row {} has {})",
                MODEL, position, frequency[position]
            )));
        }

        let scale = scale_factor(tenure);
        let x: Vec<f64> = frequency.iter().map(|&f| f as f64).collect();
        let scaled_recency: Vec<f64> = recency.iter().map(|t_x| t_x * scale).collect();
        let scaled_tenure: Vec<f64> = tenure.iter().map(|t| t * scale).collect();
        let penalizer = self.penalizer;

        let objective = |log_params: &[f64]| {
            if out_of_bounds(log_params) {
                return f64::INFINITY;
            }
            let params = BetaGeoParams::from_log(log_params);
            let penalty: f64 = params.as_array().iter().map(|p| p * p).sum();
            -params.mean_log_likelihood(&x, &scaled_recency, &scaled_tenure)
                + penalizer * penalty
        };

        let minimum = minimize(objective, &[INITIAL_LOG_PARAM; 4], self.options).map_err(
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

        let mut params = BetaGeoParams::from_log(&minimum.x);
        params.alpha /= scale;

        info!(
            "{} fitted on {} customers in {} iterations: r={:.4}, alpha={:.4}, a={:.4}, b={:.4}",
            MODEL,
            frequency.len(),
            minimum.iterations,
            params.r,
            params.alpha,
            params.a,
            params.b
        );

        let mut model = BetaGeoModel::from_params(params, time_unit)?;
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

/// Fitted BG/NBD model. Immutable once built.
#[derive(Debug, Clone)]
pub struct BetaGeoModel {
    params: BetaGeoParams,
    time_unit: TimeUnit,
    diagnostics: Option<FitDiagnostics>,
}

impl BetaGeoModel {
    pub fn from_params(params: BetaGeoParams, time_unit: TimeUnit) -> Result<Self> {
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
        if (params.a - 1.0).abs() < 1e-9 {
            return Err(CltvError::degenerate(
                MODEL,
                "a = 1 leaves the conditional expectation undefined",
            ));
        }
        Ok(Self {
            params,
            time_unit,
            diagnostics: None,
        })
    }

    pub fn params(&self) -> BetaGeoParams {
        self.params
    }

    pub fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    pub fn diagnostics(&self) -> Option<&FitDiagnostics> {
        self.diagnostics.as_ref()
    }

    /// Expected number of purchases in the next `t` periods for one customer.
    pub fn predict(&self, t: f64, frequency: u32, recency: f64, tenure: f64) -> Result<f64> {
        if !t.is_finite() || t < 0.0 {
            return Err(CltvError::Config(format!(
                "prediction horizon must be a non-negative number (value: {})",
                t
            )));
        }
        validate_observations(&[frequency], &[recency], &[tenure])?;
        if t == 0.0 {
            return Ok(0.0);
        }

        let BetaGeoParams { r, alpha, a, b } = self.params;
        let x = frequency as f64;
        let hyp_a = r + x;
        let hyp_b = b + x;
        let hyp_c = a + b + x - 1.0;
        let z = t / (alpha + tenure + t);

        let ln_hyp = ln_hyp2f1(hyp_a, hyp_b, hyp_c, z).ok_or_else(|| {
            CltvError::degenerate(
                MODEL,
                format!(
                    "hypergeometric term did not converge (a={}, b={}, c={}, z={})",
                    hyp_a, hyp_b, hyp_c, z
                ),
            )
        })?;

        let first_term = (a + b + x - 1.0) / (a - 1.0);
        let second_term =
            1.0 - (ln_hyp + (r + x) * ((alpha + tenure) / (alpha + tenure + t)).ln()).exp();
        let denominator = if frequency > 0 {
            1.0 + (a / (b + x - 1.0)) * ((alpha + tenure) / (alpha + recency)).powf(r + x)
        } else {
            1.0
        };

        let expected = first_term * second_term / denominator;
        if !expected.is_finite() {
            return Err(CltvError::degenerate(
                MODEL,
                format!(
                    "expected purchases not finite for frequency={}, recency={}, tenure={}",
                    frequency, recency, tenure
                ),
            ));
        }
        Ok(expected.max(0.0))
    }

    pub fn predict_all(&self, t: f64, profiles: &[CustomerProfile]) -> Result<Vec<f64>> {
        profiles
            .iter()
            .map(|profile| {
                self.predict(t, profile.frequency, profile.recency, profile.tenure)
            })
            .collect()
    }

    /// Mean (unpenalized) log-likelihood of observations in model time units.
    pub fn log_likelihood(&self, frequency: &[u32], recency: &[f64], tenure: &[f64]) -> Result<f64> {
        validate_observations(frequency, recency, tenure)?;
        let x: Vec<f64> = frequency.iter().map(|&f| f as f64).collect();
        Ok(self.params.mean_log_likelihood(&x, recency, tenure))
    }
}

fn validate_observations(frequency: &[u32], recency: &[f64], tenure: &[f64]) -> Result<()> {
    if frequency.is_empty() {
        return Err(CltvError::Precondition(format!(
            "{} needs at least one customer",
            MODEL
        )));
    }
    if frequency.len() != recency.len() || frequency.len() != tenure.len() {
        return Err(CltvError::Precondition(format!(
            "{} inputs differ in length (frequency {}, recency {}, tenure {})",
            MODEL,
            frequency.len(),
            recency.len(),
            tenure.len()
        )));
    }
    for (row, (&t_x, &t)) in recency.iter().zip(tenure).enumerate() {
        if !t_x.is_finite() || !t.is_finite() || t_x < 0.0 || t_x > t {
            return Err(CltvError::Precondition(format!(
                "{} needs 0 <= recency <= tenure (row {}: recency {}, tenure {})",
                MODEL, row, t_x, t
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FitterConfig;

    fn paper_model() -> BetaGeoModel {
        BetaGeoModel::from_params(
            BetaGeoParams {
                r: 0.243,
                alpha: 4.414,
                a: 0.793,
                b: 2.426,
            },
            TimeUnit::Week,
        )
        .unwrap()
    }

    fn sample_observations() -> (Vec<u32>, Vec<f64>, Vec<f64>) {
        let mut frequency = Vec::new();
        let mut recency = Vec::new();
        let mut tenure = Vec::new();
        for i in 0..240_u32 {
            let t = 20.0 + (i % 40) as f64 * 2.5;
            let x = 2 + (i * 7) % 11;
            let share = (1 + (i * 13) % 16) as f64 / 17.0;
            frequency.push(x);
            recency.push((t * share * 7.0).trunc() / 7.0);
            tenure.push(t);
        }
        (frequency, recency, tenure)
    }

    #[test]
    fn reproduces_published_conditional_expectation() {
        let expected = paper_model().predict(39.0, 2, 30.43, 38.86).unwrap();
        assert!((expected - 1.226).abs() < 1e-3, "got {}", expected);
    }

    #[test]
    fn predicts_every_profile() {
        let profiles: Vec<CustomerProfile> = [(2, 30.43, 38.86), (7, 10.0, 40.0)]
            .iter()
            .enumerate()
            .map(|(i, &(frequency, recency, tenure))| CustomerProfile {
                customer_id: format!("c{}", i),
                recency,
                tenure,
                frequency,
                monetary_avg: 10.0,
            })
            .collect();
        let model = paper_model();
        let expected = model.predict_all(39.0, &profiles).unwrap();
        assert_eq!(expected.len(), 2);
        assert_eq!(expected[0], model.predict(39.0, 2, 30.43, 38.86).unwrap());
    }

    #[test]
    fn zero_horizon_predicts_nothing() {
        assert_eq!(paper_model().predict(0.0, 5, 10.0, 20.0).unwrap(), 0.0);
    }

    #[test]
    fn prediction_is_monotonic_in_horizon() {
        let model = paper_model();
        for (x, t_x, t) in [(2, 30.43, 38.86), (9, 1.0, 50.0), (25, 49.0, 52.0)] {
            let mut previous = 0.0;
            for horizon in [1.0, 4.0, 12.0, 24.0, 52.0, 104.0] {
                let expected = model.predict(horizon, x, t_x, t).unwrap();
                assert!(expected >= previous, "x={} horizon={}", x, horizon);
                previous = expected;
            }
        }
    }

    #[test]
    fn recent_customers_expect_more_purchases() {
        let model = paper_model();
        let recent = model.predict(12.0, 6, 48.0, 50.0).unwrap();
        let lapsed = model.predict(12.0, 6, 5.0, 50.0).unwrap();
        assert!(recent > lapsed);
    }

    #[test]
    fn rejects_invalid_parameters() {
        let params = BetaGeoParams {
            r: 0.5,
            alpha: -1.0,
            a: 0.5,
            b: 2.0,
        };
        assert!(BetaGeoModel::from_params(params, TimeUnit::Week).is_err());
        let params = BetaGeoParams {
            r: 0.5,
            alpha: 1.0,
            a: 1.0,
            b: 2.0,
        };
        assert!(BetaGeoModel::from_params(params, TimeUnit::Week).is_err());
    }

    #[test]
    fn rejects_recency_beyond_tenure() {
        let result = paper_model().predict(12.0, 3, 30.0, 20.0);
        assert!(matches!(result, Err(CltvError::Precondition(_))));
    }

    #[test]
    fn fit_requires_repeat_customers() {
        let fitter = BetaGeoFitter::new(&FitterConfig::with_penalizer(0.001));
        let result = fitter.fit(&[3, 1], &[2.0, 0.0], &[10.0, 10.0], TimeUnit::Week);
        assert!(matches!(result, Err(CltvError::Precondition(_))));
        let result = fitter.fit(&[], &[], &[], TimeUnit::Week);
        assert!(matches!(result, Err(CltvError::Precondition(_))));
        let result = fitter.fit(&[3], &[2.0, 1.0], &[10.0], TimeUnit::Week);
        assert!(matches!(result, Err(CltvError::Precondition(_))));
    }

    #[test]
    fn fit_converges_and_improves_likelihood() {
        let (frequency, recency, tenure) = sample_observations();
        let fitter = BetaGeoFitter::new(&FitterConfig::with_penalizer(0.001));
        let model = fitter
            .fit(&frequency, &recency, &tenure, TimeUnit::Week)
            .unwrap();

        let params = model.params();
        for value in [params.r, params.alpha, params.a, params.b] {
            assert!(value.is_finite() && value > 0.0);
        }
        assert_eq!(model.time_unit(), TimeUnit::Week);
        let diagnostics = model.diagnostics().unwrap();
        assert_eq!(diagnostics.customers, frequency.len());

        let fitted = model.log_likelihood(&frequency, &recency, &tenure).unwrap();
        let baseline = BetaGeoModel::from_params(
            BetaGeoParams {
                r: 1.1,
                alpha: 1.1,
                a: 1.1,
                b: 1.1,
            },
            TimeUnit::Week,
        )
        .unwrap()
        .log_likelihood(&frequency, &recency, &tenure)
        .unwrap();
        assert!(fitted.is_finite());
        assert!(fitted > baseline);

        let predictions: Vec<f64> = (0..frequency.len())
            .map(|i| model.predict(12.0, frequency[i], recency[i], tenure[i]).unwrap())
            .collect();
        assert!(predictions.iter().all(|p| p.is_finite() && *p >= 0.0));
    }

    #[test]
    fn fit_is_deterministic() {
        let (frequency, recency, tenure) = sample_observations();
        let fitter = BetaGeoFitter::new(&FitterConfig::with_penalizer(0.001));
        let first = fitter
            .fit(&frequency, &recency, &tenure, TimeUnit::Week)
            .unwrap();
        let second = fitter
            .fit(&frequency, &recency, &tenure, TimeUnit::Week)
            .unwrap();
        assert_eq!(first.params(), second.params());
    }

    #[test]
    fn same_day_repeat_buyers_make_the_fit_degenerate() {
        // Zero recency with repeat purchases lets the likelihood grow without bound as alpha -> 0.
        let (frequency, mut recency, tenure) = sample_observations();
        for t_x in recency.iter_mut().step_by(10) {
            *t_x = 0.0;
        }
        let fitter = BetaGeoFitter::new(&FitterConfig::with_penalizer(0.001));
        let result = fitter.fit(&frequency, &recency, &tenure, TimeUnit::Week);
        assert!(matches!(
            result,
            Err(CltvError::DegenerateFit { .. }) | Err(CltvError::NotConverged { .. })
        ));
    }

    #[test]
    fn iteration_cap_is_reported() {
        let (frequency, recency, tenure) = sample_observations();
        let config = FitterConfig {
            penalizer: 0.001,
            max_iterations: 1,
            tolerance: 1e-12,
        };
        let result = BetaGeoFitter::new(&config).fit(&frequency, &recency, &tenure, TimeUnit::Week);
        assert!(matches!(result, Err(CltvError::NotConverged { .. })));
    }
}
