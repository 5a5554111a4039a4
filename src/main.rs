use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use cltv::commands::{run, simulate};
use cltv::synthetic::SimulationConfig;
use log::info;
use std::path::PathBuf;

const DEFAULT_ANALYSIS_DATE: &str = "2021-06-01";

#[derive(Parser)]
#[command(name = "cltv")]
#[command(about = "Customer lifetime value estimation with BG/NBD and Gamma-Gamma models")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit both models on a customer table and write per-customer CLTV with segments
    Run {
        /// Customer table (JSON array of records)
        #[arg(short, long, value_name = "PATH")]
        input: PathBuf,
        /// Destination for the CLTV report
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,
        /// Reference date for tenure, YYYY-MM-DD
        #[arg(long, default_value = DEFAULT_ANALYSIS_DATE, value_parser = parse_date_arg)]
        analysis_date: NaiveDate,
        /// Setting override such as SEGMENT_COUNT=5 (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        settings: Vec<String>,
    },
    /// Generate a seeded synthetic customer table
    Simulate {
        /// Destination file for the table
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,
        /// Number of customers to draw
        #[arg(long, default_value_t = 500)]
        customers: usize,
        /// Random seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Last day of the simulated history, YYYY-MM-DD
        #[arg(long, default_value = DEFAULT_ANALYSIS_DATE, value_parser = parse_date_arg)]
        end_date: NaiveDate,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match cli.command {
        Commands::Run {
            input,
            output,
            analysis_date,
            settings,
        } => {
            run::run(&input, &output, analysis_date, &settings)?;
        }
        Commands::Simulate {
            output,
            customers,
            seed,
            end_date,
        } => {
            let config = SimulationConfig {
                customers,
                seed,
                end_date,
                ..SimulationConfig::default()
            };
            simulate::run(&output, &config)?;
        }
    }

    info!("Done");
    Ok(())
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("expected a date in YYYY-MM-DD format (value: {})", raw))
}
