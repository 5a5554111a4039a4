//! Equal-frequency segments over CLTV, labelled `A` (highest) downwards.

use crate::error::{CltvError, Result};
use crate::models::CltvRecord;
use crate::outliers::quantile_sorted;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::cmp::Ordering;

pub const MAX_SEGMENTS: usize = 26;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSummary {
    pub segment: char,
    pub customers: usize,
    pub mean_recency: f64,
    pub mean_tenure: f64,
    pub mean_frequency: f64,
    pub mean_monetary_avg: f64,
    pub mean_exp_average_value: f64,
    pub mean_cltv: f64,
    pub min_cltv: f64,
    pub max_cltv: f64,
}

pub fn segment_label(bin: usize, segments: usize) -> char {
    (b'A' + (segments - 1 - bin) as u8) as char
}

/// `segments + 1` edges at quantiles `0, 1/k, ..., 1`.
pub fn quantile_edges(values: &[f64], segments: usize) -> Result<Vec<f64>> {
    let fail = |message: String| CltvError::Segmentation {
        customers: values.len(),
        segments,
        message,
    };
    if !(2..=MAX_SEGMENTS).contains(&segments) {
        return Err(fail(format!("segment count must be between 2 and {}", MAX_SEGMENTS)));
    }
    if values.is_empty() {
        return Err(fail("no values to segment".to_string()));
    }
    if let Some(value) = values.iter().find(|value| !value.is_finite()) {
        return Err(fail(format!("value {} is not finite", value)));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let edges: Vec<f64> = (0..=segments)
        .map(|i| quantile_sorted(&sorted, i as f64 / segments as f64))
        .collect();

    if let Some(pair) = edges.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(fail(format!(
            "bin edges are not unique ({} repeats); too many customers share a value",
            pair[0]
        )));
    }
    Ok(edges)
}

/// Right-closed bins; the lowest bin also holds the minimum.
pub fn assign_segments(values: &[f64], segments: usize) -> Result<Vec<char>> {
    let edges = quantile_edges(values, segments)?;
    let inner = &edges[1..segments];
    Ok(values
        .iter()
        .map(|value| {
            let bin = inner.iter().take_while(|edge| *value > **edge).count();
            segment_label(bin, segments)
        })
        .collect())
}

/// Per-segment means, best segment first.
pub fn summarize_segments(records: &[CltvRecord]) -> Vec<SegmentSummary> {
    let mut labels: Vec<char> = records.iter().map(|record| record.segment).collect();
    labels.sort_unstable();
    labels.dedup();

    labels
        .into_iter()
        .map(|segment| {
            let members: Vec<&CltvRecord> = records
                .iter()
                .filter(|record| record.segment == segment)
                .collect();
            let column = |field: fn(&CltvRecord) -> f64| -> Vec<f64> {
                members.iter().map(|record| field(record)).collect()
            };
            let cltv = column(|record| record.cltv);
            SegmentSummary {
                segment,
                customers: members.len(),
                mean_recency: column(|record| record.recency).mean(),
                mean_tenure: column(|record| record.tenure).mean(),
                mean_frequency: column(|record| record.frequency as f64).mean(),
                mean_monetary_avg: column(|record| record.monetary_avg).mean(),
                mean_exp_average_value: column(|record| record.exp_average_value).mean(),
                mean_cltv: cltv.iter().mean(),
                min_cltv: cltv.iter().copied().fold(f64::INFINITY, f64::min),
                max_cltv: cltv.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            }
        })
        .collect()
}
