use crate::commands::snapshot::write_json;
use crate::synthetic::{simulate_customers, SimulationConfig};
use anyhow::{Context, Result};
use log::info;
use std::path::Path;

pub fn run(output: &Path, config: &SimulationConfig) -> Result<()> {
    info!(
        "Simulating {} customer(s) into {}",
        config.customers,
        output.display()
    );
    let records = simulate_customers(config).context("Simulation failed")?;
    write_json(output, &records)?;
    info!("Customer table written to {}", output.display());
    Ok(())
}
