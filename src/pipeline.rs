//! The train-or-load forecasting pipeline exposed to the presentation
//! layer: series extraction, cache lookup, training on a miss, and the
//! autoregressive forecast itself

use crate::data::{ensure_recent_activity, MonthlySeries, SeriesExtractor, YearMonth};
use crate::error::{ForecastError, Result};
use crate::forecast::{forecast, ForecastResult};
use crate::key::EntityKey;
use crate::preprocess::prepare;
use crate::store::{CacheLookup, ModelArtifact, ModelStore};
use crate::train::{train, TrainingConfig};
use chrono::Utc;
use log::{info, warn};
use polars::prelude::DataFrame;

/// Pipeline parameters; training hyperparameters are nested
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Window length of past months used to predict the next one
    pub time_steps: usize,
    /// How many trailing months must show activity before training
    pub recent_window: usize,
    pub training: TrainingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            time_steps: 12,
            recent_window: 6,
            training: TrainingConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.time_steps == 0 {
            return Err(ForecastError::InvalidParameter(
                "time_steps must be positive".to_string(),
            ));
        }
        if self.recent_window == 0 {
            return Err(ForecastError::InvalidParameter(
                "recent_window must be positive".to_string(),
            ));
        }
        self.training.validate()
    }
}

/// Where the model used for a forecast came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    /// Loaded from the on-disk cache
    Cache,
    /// Trained during this call (the slow path; callers should show
    /// progress for it)
    Trained,
}

/// A forecast plus enough context for the caller to render it
#[derive(Debug, Clone)]
pub struct ForecastOutcome {
    pub result: ForecastResult,
    pub source: ModelSource,
    /// Last observed month of the series the forecast continues from
    pub last_observed: YearMonth,
}

/// End-to-end forecasting over wide tables with a persistent model cache.
///
/// Each call is synchronous and independent; a failure for one entity key
/// never touches another entity's cached artifacts.
#[derive(Debug)]
pub struct ForecastPipeline {
    extractor: SeriesExtractor,
    store: ModelStore,
    config: PipelineConfig,
}

impl ForecastPipeline {
    /// Pipeline with default extraction schema and parameters
    pub fn new(store: ModelStore) -> Self {
        Self {
            extractor: SeriesExtractor::new(),
            store,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(store: ModelStore, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            extractor: SeriesExtractor::new(),
            store,
            config,
        })
    }

    pub fn with_extractor(mut self, extractor: SeriesExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Forecast `horizon_months` ahead for one entity key.
    ///
    /// Extracts and validates the series, reuses the cached model when it
    /// is present and fresh, otherwise trains under the per-key lock and
    /// persists the new artifacts exactly once before forecasting.
    pub fn run(
        &self,
        table: &DataFrame,
        key: &EntityKey,
        horizon_months: usize,
    ) -> Result<ForecastOutcome> {
        let series = self.extractor.extract(table, key)?;
        ensure_recent_activity(&series, self.config.recent_window)?;
        let last_observed = series.last_month().ok_or_else(|| {
            ForecastError::SeriesUnavailable(format!("{} has an empty series", key))
        })?;

        let (artifact, scaler, source) = match self.store.lookup(key, last_observed)? {
            CacheLookup::Hit(artifact, scaler) if artifact.time_steps == self.config.time_steps => {
                (*artifact, scaler, ModelSource::Cache)
            }
            CacheLookup::Hit(artifact, _) => {
                warn!(
                    "cached model for {} uses {} time steps, expected {}; retraining",
                    key, artifact.time_steps, self.config.time_steps
                );
                self.train_and_save(key, &series, last_observed)?
            }
            CacheLookup::Miss | CacheLookup::Stale(_) => {
                self.train_and_save(key, &series, last_observed)?
            }
        };

        let result = forecast(
            &artifact.network,
            &series,
            horizon_months,
            &scaler,
            artifact.time_steps,
        )?;

        Ok(ForecastOutcome {
            result,
            source,
            last_observed,
        })
    }

    fn train_and_save(
        &self,
        key: &EntityKey,
        series: &MonthlySeries,
        last_observed: YearMonth,
    ) -> Result<(ModelArtifact, crate::preprocess::MinMaxScaler, ModelSource)> {
        let _lock = self.store.lock(key)?;

        // A competing request may have finished training while we waited.
        if let CacheLookup::Hit(artifact, scaler) = self.store.lookup(key, last_observed)? {
            if artifact.time_steps == self.config.time_steps {
                return Ok((*artifact, scaler, ModelSource::Cache));
            }
        }

        info!("training new model for {} (this can take a while)", key);
        let (data, scaler) = prepare(series, self.config.time_steps)?;
        let report = train(&data, &self.config.training)?;
        let artifact = ModelArtifact {
            network: report.network,
            time_steps: self.config.time_steps,
            last_observed,
            trained_at: Utc::now(),
            final_loss: report.final_loss,
            epochs_run: report.epochs_run,
        };
        self.store.save(key, &artifact, &scaler)?;
        Ok((artifact, scaler, ModelSource::Trained))
    }
}
