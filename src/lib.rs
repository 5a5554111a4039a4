pub mod clv;
pub mod commands;
pub mod config;
pub mod error;
pub mod features;
pub mod fitters;
pub mod models;
pub mod optimizer;
pub mod outliers;
pub mod pipeline;
pub mod segmentation;
pub mod special;
pub mod synthetic;

pub use error::{CltvError, Result};
pub use pipeline::{run_pipeline, CltvReport};
