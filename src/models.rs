use crate::error::{CltvError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One row of the per-customer transaction summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub master_id: String,
    #[serde(default)]
    pub order_channel: Option<String>,
    pub first_order_date: String,
    pub last_order_date: String,
    pub order_num_total_ever_online: f64,
    pub order_num_total_ever_offline: f64,
    pub customer_value_total_ever_online: f64,
    pub customer_value_total_ever_offline: f64,
}

/// RFM features in model time units (weeks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub customer_id: String,
    pub recency: f64,
    pub tenure: f64,
    pub frequency: u32,
    pub monetary_avg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizonSales {
    pub periods: u32,
    pub expected_purchases: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CltvRecord {
    pub customer_id: String,
    pub recency: f64,
    pub tenure: f64,
    pub frequency: u32,
    pub monetary_avg: f64,
    pub expected_sales: Vec<HorizonSales>,
    pub exp_average_value: f64,
    pub cltv: f64,
    pub segment: char,
}

impl CltvRecord {
    pub fn expected_sales_for(&self, periods: u32) -> Option<f64> {
        self.expected_sales
            .iter()
            .find(|sales| sales.periods == periods)
            .map(|sales| sales.expected_purchases)
    }
}

/// Time unit of recency/tenure and of projection horizons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Hour,
    Day,
    Week,
    Month,
}

impl TimeUnit {
    /// Number of model periods in one month.
    pub fn periods_per_month(self) -> f64 {
        match self {
            Self::Hour => 30.0 * 24.0,
            Self::Day => 30.0,
            Self::Week => 4.345,
            Self::Month => 1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TimeUnit {
    type Err = CltvError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "h" | "hour" | "hours" => Ok(Self::Hour),
            "d" | "day" | "days" => Ok(Self::Day),
            "w" | "week" | "weeks" => Ok(Self::Week),
            "m" | "month" | "months" => Ok(Self::Month),
            other => Err(CltvError::Config(format!(
                "time unit must be one of hour, day, week, month (value: {})",
                other
            ))),
        }
    }
}
