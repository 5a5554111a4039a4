use crate::commands::snapshot::{read_customer_records, write_json};
use crate::config::{parse_setting_pairs, PipelineConfig};
use crate::pipeline::run_pipeline;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::info;
use std::path::Path;

pub fn run(
    input: &Path,
    output: &Path,
    analysis_date: NaiveDate,
    settings: &[String],
) -> Result<()> {
    info!("Received run command for {}", input.display());
    let overrides = parse_setting_pairs(settings)?;
    let config = PipelineConfig::new(analysis_date)
        .with_settings(&overrides)
        .context("Invalid pipeline settings")?;

    let records = read_customer_records(input)?;
    info!("Loaded {} customer record(s)", records.len());

    let report = run_pipeline(&records, &config).context("CLTV pipeline failed")?;
    write_json(output, &report)?;
    info!(
        "Wrote CLTV for {} customer(s) to {}",
        report.records.len(),
        output.display()
    );
    Ok(())
}
