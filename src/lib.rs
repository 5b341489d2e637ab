//! # Auto Forecast
//!
//! A Rust library for forecasting monthly automotive production, sales
//! and export volumes with per-entity LSTM models.
//!
//! ## Features
//!
//! - Series extraction from wide per-brand tables (one row per region,
//!   car model or plant, one column per `YYYY-MM` month)
//! - Min-max scaling and sliding-window preparation for next-step
//!   supervised learning
//! - A single-layer LSTM trained per entity with early stopping by loss
//! - Autoregressive multi-step forecasting with calendar-month labels
//! - An on-disk model/scaler cache keyed by sanitized entity keys, with
//!   staleness detection and per-key training locks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use auto_forecast::{EntityKey, ForecastPipeline, ModelStore, TableLoader};
//!
//! fn main() -> auto_forecast::Result<()> {
//!     // Load a wide by-region export table
//!     let table = TableLoader::from_csv("data/processed/by-region.csv")?;
//!
//!     // Forecast the next 12 months for one region; the model is trained
//!     // on first use and cached under models/ afterwards
//!     let pipeline = ForecastPipeline::new(ModelStore::open("models")?);
//!     let outcome = pipeline.run(&table, &EntityKey::region("Germany"), 12)?;
//!
//!     for row in outcome.result.rows() {
//!         println!("{:04}-{:02}: {:.0}", row.year, row.month, row.value);
//!     }
//!     Ok(())
//! }
//! ```

pub mod data;
pub mod error;
pub mod forecast;
pub mod key;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod store;
pub mod train;

// Re-export commonly used types
pub use crate::data::{
    MonthlySeries, SeriesExtractor, SeriesPoint, TableLoader, TableSchema, YearMonth,
};
pub use crate::error::{ForecastError, Result};
pub use crate::forecast::{forecast, ForecastResult, ForecastRow};
pub use crate::key::EntityKey;
pub use crate::model::LstmNetwork;
pub use crate::pipeline::{ForecastOutcome, ForecastPipeline, ModelSource, PipelineConfig};
pub use crate::preprocess::{prepare, MinMaxScaler, TrainingData};
pub use crate::store::{CacheLookup, ModelArtifact, ModelStore};
pub use crate::train::{train, TrainingConfig, TrainingReport};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
