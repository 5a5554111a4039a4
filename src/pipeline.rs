use crate::clv::customer_lifetime_value;
use crate::config::PipelineConfig;
use crate::error::{CltvError, Result};
use crate::features::{derive_features, validate_records};
use crate::fitters::{
    frequency_monetary_correlation, BetaGeoFitter, BetaGeoParams, FitDiagnostics,
    GammaGammaFitter, GammaGammaParams,
};
use crate::models::{CltvRecord, CustomerRecord, HorizonSales, TimeUnit};
use crate::outliers::{clamp_columns, ClampReport};
use crate::segmentation::{assign_segments, summarize_segments, SegmentSummary};
use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;

/// Above this |correlation| the Gamma-Gamma independence assumption is suspect.
pub const CORRELATION_WARNING_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Serialize)]
pub struct CltvReport {
    pub analysis_date: NaiveDate,
    pub time_unit: TimeUnit,
    pub input_customers: usize,
    pub excluded_zero_activity: usize,
    pub excluded_single_purchase: usize,
    pub clamps: Vec<ClampReport>,
    pub beta_geo: BetaGeoParams,
    pub beta_geo_fit: Option<FitDiagnostics>,
    pub gamma_gamma: GammaGammaParams,
    pub gamma_gamma_fit: Option<FitDiagnostics>,
    pub frequency_monetary_correlation: Option<f64>,
    pub cltv_months: u32,
    pub discount_rate: f64,
    pub segments: Vec<SegmentSummary>,
    pub records: Vec<CltvRecord>,
}

impl CltvReport {
    pub fn record(&self, customer_id: &str) -> Option<&CltvRecord> {
        self.records
            .iter()
            .find(|record| record.customer_id == customer_id)
    }
}

/// Run the whole pipeline on a snapshot of `records`. The caller's rows are
/// never modified; any failure aborts the run without partial output.
pub fn run_pipeline(records: &[CustomerRecord], config: &PipelineConfig) -> Result<CltvReport> {
    config.validate()?;
    if records.is_empty() {
        return Err(CltvError::Input("customer table is empty".to_string()));
    }
    validate_records(records)?;
    info!(
        "Running CLTV pipeline on {} customers (analysis date {})",
        records.len(),
        config.analysis_date
    );

    let mut snapshot = records.to_vec();
    let clamps = clamp_columns(&mut snapshot, &config.outliers)?;

    let features = derive_features(&snapshot, config)?;
    let profiles = features.profiles;
    if profiles.is_empty() {
        return Err(CltvError::Precondition(
            "no customers with more than one order remain after filtering".to_string(),
        ));
    }

    let frequency: Vec<u32> = profiles.iter().map(|p| p.frequency).collect();
    let recency: Vec<f64> = profiles.iter().map(|p| p.recency).collect();
    let tenure: Vec<f64> = profiles.iter().map(|p| p.tenure).collect();
    let monetary: Vec<f64> = profiles.iter().map(|p| p.monetary_avg).collect();

    let purchases =
        BetaGeoFitter::new(&config.beta_geo).fit(&frequency, &recency, &tenure, features.time_unit)?;

    let correlation = frequency_monetary_correlation(&profiles);
    match correlation {
        Some(value) if value.abs() > CORRELATION_WARNING_THRESHOLD => warn!(
            "Frequency and monetary value are correlated ({:.3}); Gamma-Gamma estimates may be biased",
            value
        ),
        Some(value) => info!("Frequency/monetary correlation {:.3}", value),
        None => warn!("Frequency/monetary correlation is undefined (constant column)"),
    }
    let spend = GammaGammaFitter::new(&config.gamma_gamma).fit(&frequency, &monetary)?;

    let mut cltv_records = Vec::with_capacity(profiles.len());
    for profile in profiles {
        let expected_sales = config
            .sales_horizons
            .iter()
            .map(|&periods| {
                purchases
                    .predict(
                        periods as f64,
                        profile.frequency,
                        profile.recency,
                        profile.tenure,
                    )
                    .map(|expected_purchases| HorizonSales {
                        periods,
                        expected_purchases,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let exp_average_value =
            spend.conditional_expected_average_profit(profile.frequency, profile.monetary_avg)?;
        let cltv = customer_lifetime_value(&purchases, &spend, &profile, &config.cltv)?;

        cltv_records.push(CltvRecord {
            customer_id: profile.customer_id,
            recency: profile.recency,
            tenure: profile.tenure,
            frequency: profile.frequency,
            monetary_avg: profile.monetary_avg,
            expected_sales,
            exp_average_value,
            cltv,
            segment: 'A',
        });
    }

    let values: Vec<f64> = cltv_records.iter().map(|record| record.cltv).collect();
    let segments = assign_segments(&values, config.segment_count)?;
    for (record, segment) in cltv_records.iter_mut().zip(segments) {
        record.segment = segment;
    }
    let summaries = summarize_segments(&cltv_records);
    for summary in &summaries {
        info!(
            "Segment {}: {} customers, mean CLTV {:.2} (range {:.2} to {:.2})",
            summary.segment, summary.customers, summary.mean_cltv, summary.min_cltv, summary.max_cltv
        );
    }

    Ok(CltvReport {
        analysis_date: config.analysis_date,
        time_unit: features.time_unit,
        input_customers: records.len(),
        excluded_zero_activity: features.excluded_zero_activity,
        excluded_single_purchase: features.excluded_single_purchase,
        clamps,
        beta_geo: purchases.params(),
        beta_geo_fit: purchases.diagnostics().cloned(),
        gamma_gamma: spend.params(),
        gamma_gamma_fit: spend.diagnostics().cloned(),
        frequency_monetary_correlation: correlation,
        cltv_months: config.cltv.months,
        discount_rate: config.cltv.discount_rate,
        segments: summaries,
        records: cltv_records,
    })
}
