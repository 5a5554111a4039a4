//! Seeded customer tables drawn from the BG/NBD and Gamma-Gamma processes.

use crate::error::{CltvError, Result};
use crate::models::CustomerRecord;
use chrono::{Duration, NaiveDate};
use log::info;
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::{Beta, Exp, Gamma};

const CHANNELS: [&str; 4] = ["Android App", "Ios App", "Desktop", "Mobile"];

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub customers: usize,
    pub seed: u64,
    /// Date the simulated history ends (the natural analysis date).
    pub end_date: NaiveDate,
    /// First orders are spread uniformly over this many days before `end_date`.
    pub history_days: u32,
    /// Purchase rates per week follow Gamma(shape, rate).
    pub purchase_shape: f64,
    pub purchase_rate: f64,
    /// Dropout probability after each purchase follows Beta(a, b).
    pub dropout_a: f64,
    pub dropout_b: f64,
    pub spend_p: f64,
    pub spend_q: f64,
    pub spend_v: f64,
    pub online_share: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            customers: 500,
            seed: 42,
            end_date: NaiveDate::from_ymd_opt(2021, 6, 1).unwrap_or(NaiveDate::MIN),
            history_days: 730,
            purchase_shape: 2.0,
            purchase_rate: 8.0,
            dropout_a: 0.8,
            dropout_b: 6.0,
            spend_p: 6.0,
            spend_q: 4.0,
            spend_v: 60.0,
            online_share: 0.6,
        }
    }
}

pub fn simulate_customers(config: &SimulationConfig) -> Result<Vec<CustomerRecord>> {
    if config.history_days == 0 {
        return Err(CltvError::Config(
            "simulation history must span at least one day".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&config.online_share) {
        return Err(CltvError::Config(format!(
            "online share must lie in [0, 1] (value: {})",
            config.online_share
        )));
    }
    let distribution_error =
        |name: &str| CltvError::Config(format!("invalid {} distribution parameters", name));
    let purchase_rates = Gamma::new(config.purchase_shape, config.purchase_rate)
        .map_err(|_| distribution_error("purchase rate"))?;
    let dropouts =
        Beta::new(config.dropout_a, config.dropout_b).map_err(|_| distribution_error("dropout"))?;
    let spend_rates =
        Gamma::new(config.spend_q, config.spend_v).map_err(|_| distribution_error("spend"))?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut records = Vec::with_capacity(config.customers);

    for index in 0..config.customers {
        let history = rng.gen_range(0..config.history_days) as i64;
        let first_order = config.end_date - Duration::days(history);
        let weekly_rate = purchase_rates.sample(&mut rng).max(f64::MIN_POSITIVE);
        let dropout = dropouts.sample(&mut rng);
        let waits = Exp::new(weekly_rate).map_err(|_| distribution_error("waiting time"))?;

        // Day offsets of every order; repeats land at least one day apart.
        let mut order_days = vec![0_i64];
        while rng.gen::<f64>() >= dropout {
            let wait_days = (waits.sample(&mut rng) * 7.0).floor().min(history as f64) as i64;
            let next = order_days[order_days.len() - 1] + 1 + wait_days;
            if next > history {
                break;
            }
            order_days.push(next);
        }

        let customer_rate = spend_rates.sample(&mut rng).max(f64::MIN_POSITIVE);
        let transaction_values =
            Gamma::new(config.spend_p, customer_rate).map_err(|_| distribution_error("spend"))?;
        let mut online = (0.0, 0.0);
        let mut offline = (0.0, 0.0);
        for _ in &order_days {
            let value = transaction_values.sample(&mut rng);
            let channel = if rng.gen::<f64>() < config.online_share {
                &mut online
            } else {
                &mut offline
            };
            channel.0 += 1.0;
            channel.1 += value;
        }

        let last_order = first_order + Duration::days(order_days[order_days.len() - 1]);
        records.push(CustomerRecord {
            master_id: format!("sim-{:05}", index),
            order_channel: Some(CHANNELS[rng.gen_range(0..CHANNELS.len())].to_string()),
            first_order_date: first_order.format("%Y-%m-%d").to_string(),
            last_order_date: last_order.format("%Y-%m-%d").to_string(),
            order_num_total_ever_online: online.0,
            order_num_total_ever_offline: offline.0,
            customer_value_total_ever_online: round_cents(online.1),
            customer_value_total_ever_offline: round_cents(offline.1),
        });
    }

    info!(
        "Simulated {} customers (seed {}, history ending {})",
        records.len(),
        config.seed,
        config.end_date
    );
    Ok(records)
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
