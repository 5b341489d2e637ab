//! Error types for the auto_forecast crate

use thiserror::Error;

/// Custom error types for the auto_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// The entity key matched no rows, or the matched series is empty or
    /// all-zero over its most recent months (discontinued model/plant)
    #[error("series unavailable: {0}")]
    SeriesUnavailable(String),

    /// The matched series is too short to build a single training window
    #[error("insufficient history: {actual} usable points, need at least {required}")]
    InsufficientHistory { actual: usize, required: usize },

    /// Cached artifacts exist but could not be read back
    #[error("cache load error: {0}")]
    CacheLoad(String),

    /// Training loss became non-finite; nothing from this run may be cached
    #[error("training diverged at epoch {epoch}")]
    TrainingDivergence { epoch: usize },

    /// Prediction or inverse-transform produced a non-finite value
    #[error("forecast numerical error: {0}")]
    ForecastNumerical(String),

    /// Error from invalid parameters
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Another request holds the training lock for this entity key
    #[error("model store busy: {0}")]
    StoreBusy(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from Polars operations
    #[error("polars error: {0}")]
    Polars(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<polars::prelude::PolarsError> for ForecastError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        ForecastError::Polars(err.to_string())
    }
}
