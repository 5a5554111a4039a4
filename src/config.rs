use crate::error::{CltvError, Result};
use crate::models::TimeUnit;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Quantile cutoffs and multiplier for the one-sided outlier clamp
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierConfig {
    pub lower_quantile: f64,
    pub upper_quantile: f64,
    pub iqr_multiplier: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            lower_quantile: 0.01,
            upper_quantile: 0.99,
            iqr_multiplier: 1.5,
        }
    }
}

/// What to do with customers whose total spend or total order count is zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroActivityPolicy {
    Exclude,
    Keep,
}

impl ZeroActivityPolicy {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "exclude" => Ok(Self::Exclude),
            "keep" => Ok(Self::Keep),
            other => Err(CltvError::Config(format!(
                "ZERO_ACTIVITY_POLICY must be exclude or keep (value: {})",
                other
            ))),
        }
    }
}

/// Penalized maximum-likelihood settings for one model
#[derive(Debug, Clone, PartialEq)]
pub struct FitterConfig {
    pub penalizer: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl FitterConfig {
    pub fn with_penalizer(penalizer: f64) -> Self {
        Self {
            penalizer,
            max_iterations: 1_000,
            tolerance: 1e-7,
        }
    }
}

/// Horizon, unit and discounting of the combined lifetime value
#[derive(Debug, Clone, PartialEq)]
pub struct CltvConfig {
    pub months: u32,
    pub time_unit: TimeUnit,
    pub discount_rate: f64,
}

impl Default for CltvConfig {
    fn default() -> Self {
        Self {
            months: 6,
            time_unit: TimeUnit::Week,
            discount_rate: 0.01,
        }
    }
}

/// Everything a pipeline run depends on besides the input table
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub analysis_date: NaiveDate,
    pub outliers: OutlierConfig,
    pub zero_activity: ZeroActivityPolicy,
    pub beta_geo: FitterConfig,
    pub gamma_gamma: FitterConfig,
    /// Sales projection horizons in weeks
    pub sales_horizons: Vec<u32>,
    pub cltv: CltvConfig,
    pub segment_count: usize,
}

impl PipelineConfig {
    pub fn new(analysis_date: NaiveDate) -> Self {
        Self {
            analysis_date,
            outliers: OutlierConfig::default(),
            zero_activity: ZeroActivityPolicy::Exclude,
            beta_geo: FitterConfig::with_penalizer(0.001),
            gamma_gamma: FitterConfig::with_penalizer(0.01),
            sales_horizons: vec![12, 24],
            cltv: CltvConfig::default(),
            segment_count: 4,
        }
    }

    /// Apply string overrides (e.g. from `--set KEY=VALUE`) on top of this config
    pub fn with_settings(mut self, settings: &HashMap<String, String>) -> Result<Self> {
        if let Some(raw) = optional_setting(settings, "ANALYSIS_DATE") {
            self.analysis_date = parse_setting_date("ANALYSIS_DATE", raw)?;
        }
        if let Some(raw) = optional_setting(settings, "OUTLIER_LOWER_QUANTILE") {
            self.outliers.lower_quantile =
                parse_setting_f64("OUTLIER_LOWER_QUANTILE", raw, Some(0.0), Some(1.0))?;
        }
        if let Some(raw) = optional_setting(settings, "OUTLIER_UPPER_QUANTILE") {
            self.outliers.upper_quantile =
                parse_setting_f64("OUTLIER_UPPER_QUANTILE", raw, Some(0.0), Some(1.0))?;
        }
        if let Some(raw) = optional_setting(settings, "OUTLIER_IQR_MULTIPLIER") {
            self.outliers.iqr_multiplier =
                parse_setting_f64("OUTLIER_IQR_MULTIPLIER", raw, Some(0.0), None)?;
        }
        if let Some(raw) = optional_setting(settings, "ZERO_ACTIVITY_POLICY") {
            self.zero_activity = ZeroActivityPolicy::parse(raw)?;
        }
        if let Some(raw) = optional_setting(settings, "BETA_GEO_PENALIZER") {
            self.beta_geo.penalizer =
                parse_setting_f64("BETA_GEO_PENALIZER", raw, Some(0.0), None)?;
        }
        if let Some(raw) = optional_setting(settings, "GAMMA_GAMMA_PENALIZER") {
            self.gamma_gamma.penalizer =
                parse_setting_f64("GAMMA_GAMMA_PENALIZER", raw, Some(0.0), None)?;
        }
        if let Some(raw) = optional_setting(settings, "FIT_MAX_ITERATIONS") {
            let max_iterations = parse_setting_usize("FIT_MAX_ITERATIONS", raw, 1)?;
            self.beta_geo.max_iterations = max_iterations;
            self.gamma_gamma.max_iterations = max_iterations;
        }
        if let Some(raw) = optional_setting(settings, "FIT_TOLERANCE") {
            let tolerance = parse_setting_f64("FIT_TOLERANCE", raw, Some(0.0), None)?;
            self.beta_geo.tolerance = tolerance;
            self.gamma_gamma.tolerance = tolerance;
        }
        if let Some(raw) = optional_setting(settings, "SALES_HORIZONS") {
            self.sales_horizons = parse_setting_u32_list("SALES_HORIZONS", raw)?;
        }
        if let Some(raw) = optional_setting(settings, "CLTV_MONTHS") {
            self.cltv.months = parse_setting_usize("CLTV_MONTHS", raw, 1)? as u32;
        }
        if let Some(raw) = optional_setting(settings, "CLTV_TIME_UNIT") {
            self.cltv.time_unit = raw.parse()?;
        }
        if let Some(raw) = optional_setting(settings, "DISCOUNT_RATE") {
            self.cltv.discount_rate = parse_setting_f64("DISCOUNT_RATE", raw, Some(0.0), None)?;
        }
        if let Some(raw) = optional_setting(settings, "SEGMENT_COUNT") {
            self.segment_count = parse_setting_usize("SEGMENT_COUNT", raw, 2)?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let outliers = &self.outliers;
        if !(0.0..=1.0).contains(&outliers.lower_quantile)
            || !(0.0..=1.0).contains(&outliers.upper_quantile)
        {
            return Err(CltvError::Config(format!(
                "outlier quantiles must lie in [0, 1] (lower: {}, upper: {})",
                outliers.lower_quantile, outliers.upper_quantile
            )));
        }
        if outliers.lower_quantile >= outliers.upper_quantile {
            return Err(CltvError::Config(format!(
                "outlier lower quantile ({}) must be below the upper quantile ({})",
                outliers.lower_quantile, outliers.upper_quantile
            )));
        }
        if !outliers.iqr_multiplier.is_finite() || outliers.iqr_multiplier < 0.0 {
            return Err(CltvError::Config(format!(
                "IQR multiplier must be a non-negative number (value: {})",
                outliers.iqr_multiplier
            )));
        }
        for (label, fitter) in [("BG/NBD", &self.beta_geo), ("Gamma-Gamma", &self.gamma_gamma)] {
            if !fitter.penalizer.is_finite() || fitter.penalizer < 0.0 {
                return Err(CltvError::Config(format!(
                    "{} penalizer must be a non-negative number (value: {})",
                    label, fitter.penalizer
                )));
            }
            if fitter.max_iterations == 0 {
                return Err(CltvError::Config(format!(
                    "{} fit needs at least one iteration",
                    label
                )));
            }
            if !fitter.tolerance.is_finite() || fitter.tolerance <= 0.0 {
                return Err(CltvError::Config(format!(
                    "{} tolerance must be positive (value: {})",
                    label, fitter.tolerance
                )));
            }
        }
        if self.sales_horizons.is_empty() {
            return Err(CltvError::Config(
                "at least one sales horizon is required".to_string(),
            ));
        }
        if self.sales_horizons.contains(&0) {
            return Err(CltvError::Config(
                "sales horizons must be positive".to_string(),
            ));
        }
        if self.cltv.months == 0 {
            return Err(CltvError::Config(
                "CLTV horizon must cover at least one month".to_string(),
            ));
        }
        if !self.cltv.discount_rate.is_finite() || self.cltv.discount_rate < 0.0 {
            return Err(CltvError::Config(format!(
                "discount rate must be a non-negative number (value: {})",
                self.cltv.discount_rate
            )));
        }
        if !(2..=26).contains(&self.segment_count) {
            return Err(CltvError::Config(format!(
                "segment count must be between 2 and 26 (value: {})",
                self.segment_count
            )));
        }
        Ok(())
    }
}

/// Split `KEY=VALUE` pairs into a settings map
pub fn parse_setting_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<HashMap<String, String>> {
    let mut settings = HashMap::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let Some((key, value)) = pair.split_once('=') else {
            return Err(CltvError::Config(format!(
                "setting must be KEY=VALUE (value: {})",
                pair
            )));
        };
        settings.insert(key.trim().to_ascii_uppercase(), value.trim().to_string());
    }
    Ok(settings)
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

pub fn parse_setting_date(key: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        CltvError::Config(format!(
            "Setting {} must be a date in YYYY-MM-DD format (value: {})",
            key, raw
        ))
    })
}

fn parse_setting_f64(key: &str, raw: &str, min: Option<f64>, max: Option<f64>) -> Result<f64> {
    let value = raw
        .parse::<f64>()
        .map_err(|_| CltvError::Config(format!("Setting {} must be a number (value: {})", key, raw)))?;
    if !value.is_finite() {
        return Err(CltvError::Config(format!(
            "Setting {} must be finite (value: {})",
            key, raw
        )));
    }
    if let Some(min_value) = min {
        if value < min_value {
            return Err(CltvError::Config(format!(
                "Setting {} must be >= {} (value: {})",
                key, min_value, raw
            )));
        }
    }
    if let Some(max_value) = max {
        if value > max_value {
            return Err(CltvError::Config(format!(
                "Setting {} must be <= {} (value: {})",
                key, max_value, raw
            )));
        }
    }
    Ok(value)
}

fn parse_setting_usize(key: &str, raw: &str, min: usize) -> Result<usize> {
    let value = raw.parse::<usize>().map_err(|_| {
        CltvError::Config(format!(
            "Setting {} must be a non-negative integer (value: {})",
            key, raw
        ))
    })?;
    if value < min {
        return Err(CltvError::Config(format!(
            "Setting {} must be >= {} (value: {})",
            key, min, raw
        )));
    }
    Ok(value)
}

fn parse_setting_u32_list(key: &str, raw: &str) -> Result<Vec<u32>> {
    let trimmed = raw.trim().trim_matches(|c| c == '[' || c == ']');
    let mut values = Vec::new();

    for part in trimmed.split(|c: char| c == ',' || c.is_whitespace()) {
        let entry = part.trim();
        if entry.is_empty() {
            continue;
        }
        let value = entry.parse::<u32>().map_err(|_| {
            CltvError::Config(format!(
                "Setting {} must be a list of positive integers (value: {})",
                key, raw
            ))
        })?;
        values.push(value);
    }

    if values.is_empty() {
        return Err(CltvError::Config(format!(
            "Setting {} must contain at least one number (value: {})",
            key, raw
        )));
    }

    Ok(values)
}
