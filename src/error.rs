use thiserror::Error;

/// Failure taxonomy for a pipeline run. Every variant is fatal for the run.
#[derive(Debug, Clone, Error)]
pub enum CltvError {
    #[error("invalid record at row {row} (customer {customer_id}): {message}")]
    InvalidRecord {
        row: usize,
        customer_id: String,
        message: String,
    },
    #[error("invalid input: {0}")]
    Input(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("precondition violated: {0}")]
    Precondition(String),
    #[error(
        "{model} fit did not converge after {iterations} iterations (gradient norm {gradient_norm:.3e})"
    )]
    NotConverged {
        model: &'static str,
        iterations: usize,
        gradient_norm: f64,
    },
    #[error("{model} fit produced degenerate parameters: {message}")]
    DegenerateFit { model: &'static str, message: String },
    #[error("cannot split {customers} customers into {segments} quantile segments: {message}")]
    Segmentation {
        customers: usize,
        segments: usize,
        message: String,
    },
}

impl CltvError {
    pub(crate) fn invalid_record(
        row: usize,
        customer_id: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidRecord {
            row,
            customer_id: customer_id.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn degenerate(model: &'static str, message: impl Into<String>) -> Self {
        Self::DegenerateFit {
            model,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CltvError>;
