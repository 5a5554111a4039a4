//! One-sided quantile clamp for the order count and spend columns.

use crate::config::OutlierConfig;
use crate::error::{CltvError, Result};
use crate::models::CustomerRecord;
use log::info;
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampColumn {
    OrderNumTotalEverOnline,
    OrderNumTotalEverOffline,
    CustomerValueTotalEverOffline,
    CustomerValueTotalEverOnline,
}

impl ClampColumn {
    pub const ALL: [ClampColumn; 4] = [
        ClampColumn::OrderNumTotalEverOnline,
        ClampColumn::OrderNumTotalEverOffline,
        ClampColumn::CustomerValueTotalEverOffline,
        ClampColumn::CustomerValueTotalEverOnline,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::OrderNumTotalEverOnline => "order_num_total_ever_online",
            Self::OrderNumTotalEverOffline => "order_num_total_ever_offline",
            Self::CustomerValueTotalEverOffline => "customer_value_total_ever_offline",
            Self::CustomerValueTotalEverOnline => "customer_value_total_ever_online",
        }
    }

    pub fn value(self, record: &CustomerRecord) -> f64 {
        match self {
            Self::OrderNumTotalEverOnline => record.order_num_total_ever_online,
            Self::OrderNumTotalEverOffline => record.order_num_total_ever_offline,
            Self::CustomerValueTotalEverOffline => record.customer_value_total_ever_offline,
            Self::CustomerValueTotalEverOnline => record.customer_value_total_ever_online,
        }
    }

    fn value_mut(self, record: &mut CustomerRecord) -> &mut f64 {
        match self {
            Self::OrderNumTotalEverOnline => &mut record.order_num_total_ever_online,
            Self::OrderNumTotalEverOffline => &mut record.order_num_total_ever_offline,
            Self::CustomerValueTotalEverOffline => &mut record.customer_value_total_ever_offline,
            Self::CustomerValueTotalEverOnline => &mut record.customer_value_total_ever_online,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub lower_quantile_value: f64,
    pub upper_quantile_value: f64,
    /// Reported only; values below it are never touched.
    pub lower_limit: f64,
    pub upper_limit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClampReport {
    pub column: ClampColumn,
    pub thresholds: Thresholds,
    pub clamped: usize,
}

/// Linear-interpolation empirical quantile (`h = (n - 1) q`).
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    Some(quantile_sorted(&sorted, q))
}

pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let position = (sorted.len() - 1) as f64 * q;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

pub fn outlier_thresholds(values: &[f64], config: &OutlierConfig) -> Result<Thresholds> {
    if values.iter().any(|value| !value.is_finite()) {
        return Err(CltvError::Input(
            "outlier thresholds need finite values".to_string(),
        ));
    }
    let (Some(q1), Some(q3)) = (
        quantile(values, config.lower_quantile),
        quantile(values, config.upper_quantile),
    ) else {
        return Err(CltvError::Input(
            "outlier thresholds need a non-empty column".to_string(),
        ));
    };
    let interquantile_range = q3 - q1;
    // Frequencies must stay integral downstream, hence the rounded limits.
    Ok(Thresholds {
        lower_quantile_value: q1,
        upper_quantile_value: q3,
        lower_limit: (q1 - config.iqr_multiplier * interquantile_range).round_ties_even(),
        upper_limit: (q3 + config.iqr_multiplier * interquantile_range).round_ties_even(),
    })
}

pub fn replace_with_thresholds(
    records: &mut [CustomerRecord],
    column: ClampColumn,
    config: &OutlierConfig,
) -> Result<ClampReport> {
    let values: Vec<f64> = records.iter().map(|record| column.value(record)).collect();
    let thresholds = outlier_thresholds(&values, config)?;

    let mut clamped = 0;
    for record in records.iter_mut() {
        let value = column.value_mut(record);
        if *value > thresholds.upper_limit {
            *value = thresholds.upper_limit;
            clamped += 1;
        }
    }

    Ok(ClampReport {
        column,
        thresholds,
        clamped,
    })
}

pub fn clamp_columns(
    records: &mut [CustomerRecord],
    config: &OutlierConfig,
) -> Result<Vec<ClampReport>> {
    let mut reports = Vec::with_capacity(ClampColumn::ALL.len());
    for column in ClampColumn::ALL {
        let report = replace_with_thresholds(records, column, config)?;
        info!(
            "Clamped {} value(s) of {} above {}",
            report.clamped,
            column.name(),
            report.thresholds.upper_limit
        );
        reports.push(report);
    }
    Ok(reports)
}
