use crate::config::CltvConfig;
use crate::error::{CltvError, Result};
use crate::fitters::{BetaGeoModel, GammaGammaModel};
use crate::models::CustomerProfile;

/// Discounted expected value of one customer over `config.months` months.
///
/// Each month contributes the expected spend per transaction times the
/// purchases the BG/NBD model places inside that month, discounted by
/// `(1 + discount_rate)^month`.
pub fn customer_lifetime_value(
    purchases: &BetaGeoModel,
    spend: &GammaGammaModel,
    profile: &CustomerProfile,
    config: &CltvConfig,
) -> Result<f64> {
    check_horizon(purchases, config)?;
    let adjusted_value =
        spend.conditional_expected_average_profit(profile.frequency, profile.monetary_avg)?;
    lifetime_value_with(purchases, profile, adjusted_value, config)
}

pub fn lifetime_values(
    purchases: &BetaGeoModel,
    spend: &GammaGammaModel,
    profiles: &[CustomerProfile],
    config: &CltvConfig,
) -> Result<Vec<f64>> {
    check_horizon(purchases, config)?;
    profiles
        .iter()
        .map(|profile| customer_lifetime_value(purchases, spend, profile, config))
        .collect()
}

fn lifetime_value_with(
    purchases: &BetaGeoModel,
    profile: &CustomerProfile,
    adjusted_value: f64,
    config: &CltvConfig,
) -> Result<f64> {
    let factor = config.time_unit.periods_per_month();
    let mut total = 0.0;
    let mut previous = 0.0;
    for month in 1..=config.months {
        let periods = month as f64 * factor;
        let cumulative =
            purchases.predict(periods, profile.frequency, profile.recency, profile.tenure)?;
        let expected_transactions = cumulative - previous;
        total += adjusted_value * expected_transactions
            / (1.0 + config.discount_rate).powi(month as i32);
        previous = cumulative;
    }
    Ok(total)
}

fn check_horizon(purchases: &BetaGeoModel, config: &CltvConfig) -> Result<()> {
    if purchases.time_unit() != config.time_unit {
        return Err(CltvError::Config(format!(
            "CLTV is requested per {} but the purchase model was fitted per {}",
            config.time_unit,
            purchases.time_unit()
        )));
    }
    if config.months == 0 {
        return Err(CltvError::Config(
            "CLTV horizon must cover at least one month".to_string(),
        ));
    }
    if !config.discount_rate.is_finite() || config.discount_rate < 0.0 {
        return Err(CltvError::Config(format!(
            "discount rate must be a non-negative number (value: {})",
            config.discount_rate
        )));
    }
    Ok(())
}
