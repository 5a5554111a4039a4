//! Channel totals and RFM features in weeks.

use crate::config::{PipelineConfig, ZeroActivityPolicy};
use crate::error::{CltvError, Result};
use crate::models::{CustomerProfile, CustomerRecord, TimeUnit};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::info;

const DAYS_PER_WEEK: f64 = 7.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub profiles: Vec<CustomerProfile>,
    pub time_unit: TimeUnit,
    pub excluded_zero_activity: usize,
    pub excluded_single_purchase: usize,
}

/// Parse an order date. Time of day, when present, is dropped.
pub fn parse_order_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, format) {
            return Some(timestamp.date());
        }
    }
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.date_naive())
        .ok()
}

/// Reject malformed rows before any modeling touches them.
pub fn validate_records(records: &[CustomerRecord]) -> Result<()> {
    for (row, record) in records.iter().enumerate() {
        let id = record.master_id.as_str();
        if id.trim().is_empty() {
            return Err(CltvError::invalid_record(row, id, "customer id is empty"));
        }
        for (name, value) in [
            ("order_num_total_ever_online", record.order_num_total_ever_online),
            ("order_num_total_ever_offline", record.order_num_total_ever_offline),
        ] {
            if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
                return Err(CltvError::invalid_record(
                    row,
                    id,
                    format!("{} must be a non-negative whole number (value: {})", name, value),
                ));
            }
        }
        for (name, value) in [
            ("customer_value_total_ever_online", record.customer_value_total_ever_online),
            ("customer_value_total_ever_offline", record.customer_value_total_ever_offline),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CltvError::invalid_record(
                    row,
                    id,
                    format!("{} must be a non-negative number (value: {})", name, value),
                ));
            }
        }
        let (first, last) = order_dates(row, record)?;
        if first > last {
            return Err(CltvError::invalid_record(
                row,
                id,
                format!("first order {} is after last order {}", first, last),
            ));
        }
    }
    Ok(())
}

pub fn derive_features(records: &[CustomerRecord], config: &PipelineConfig) -> Result<FeatureSet> {
    let analysis_date = config.analysis_date;
    let mut profiles = Vec::with_capacity(records.len());
    let mut excluded_zero_activity = 0;
    let mut excluded_single_purchase = 0;

    for (row, record) in records.iter().enumerate() {
        let (first, last) = order_dates(row, record)?;
        if last > analysis_date {
            return Err(CltvError::Config(format!(
                "analysis date {} precedes the last order of customer {} ({})",
                analysis_date, record.master_id, last
            )));
        }

        let order_num_total =
            record.order_num_total_ever_online + record.order_num_total_ever_offline;
        let customer_value_total =
            record.customer_value_total_ever_online + record.customer_value_total_ever_offline;

        if config.zero_activity == ZeroActivityPolicy::Exclude
            && (order_num_total == 0.0 || customer_value_total == 0.0)
        {
            excluded_zero_activity += 1;
            continue;
        }
        if order_num_total <= 1.0 {
            excluded_single_purchase += 1;
            continue;
        }
        if order_num_total > u32::MAX as f64 {
            return Err(CltvError::invalid_record(
                row,
                &record.master_id,
                format!("order count {} is out of range", order_num_total),
            ));
        }

        let recency_days = (last - first).num_days();
        let tenure_days = (analysis_date - first).num_days();
        profiles.push(CustomerProfile {
            customer_id: record.master_id.clone(),
            recency: recency_days as f64 / DAYS_PER_WEEK,
            tenure: tenure_days as f64 / DAYS_PER_WEEK,
            frequency: order_num_total as u32,
            monetary_avg: customer_value_total / order_num_total,
        });
    }

    info!(
        "Derived features for {} customers ({} zero-activity and {} single-purchase excluded)",
        profiles.len(),
        excluded_zero_activity,
        excluded_single_purchase
    );

    Ok(FeatureSet {
        profiles,
        time_unit: TimeUnit::Week,
        excluded_zero_activity,
        excluded_single_purchase,
    })
}

fn order_dates(row: usize, record: &CustomerRecord) -> Result<(NaiveDate, NaiveDate)> {
    let parse = |name: &str, raw: &str| {
        parse_order_date(raw).ok_or_else(|| {
            CltvError::invalid_record(
                row,
                &record.master_id,
                format!("{} is not a date (value: {:?})", name, raw),
            )
        })
    };
    Ok((
        parse("first_order_date", &record.first_order_date)?,
        parse("last_order_date", &record.last_order_date)?,
    ))
}
