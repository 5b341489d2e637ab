//! Autoregressive multi-step forecasting.
//!
//! Each step feeds the model's own prediction back into the window, so
//! small early errors compound over the horizon; a few months is the
//! usefully accurate range for volatile series. That degradation is a
//! property of the method, not a defect.

use crate::data::{MonthlySeries, YearMonth};
use crate::error::{ForecastError, Result};
use crate::model::LstmNetwork;
use crate::preprocess::MinMaxScaler;

/// One forecast month on the original value scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastRow {
    pub year: i32,
    pub month: u32,
    pub value: f64,
}

/// Ordered forecast rows starting the month after the last observation.
///
/// Derived, never persisted by the core; export is the presentation
/// layer's concern.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    rows: Vec<ForecastRow>,
}

impl ForecastResult {
    pub fn rows(&self) -> &[ForecastRow] {
        &self.rows
    }

    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.value).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Forecast `horizon_months` ahead of the series end.
///
/// Seeds the recurrence with the scaled last `time_steps` observations,
/// then iterates, maintaining a fixed-length window. All predictions are
/// inverse-transformed at the end; a non-finite value anywhere fails the
/// request with `ForecastNumerical`.
pub fn forecast(
    network: &LstmNetwork,
    series: &MonthlySeries,
    horizon_months: usize,
    scaler: &MinMaxScaler,
    time_steps: usize,
) -> Result<ForecastResult> {
    if horizon_months == 0 {
        return Err(ForecastError::InvalidParameter(
            "horizon_months must be positive".to_string(),
        ));
    }
    let values = series.values();
    if values.len() < time_steps {
        return Err(ForecastError::InsufficientHistory {
            actual: values.len(),
            required: time_steps,
        });
    }
    let last_month = series.last_month().ok_or_else(|| {
        ForecastError::SeriesUnavailable("cannot forecast from an empty series".to_string())
    })?;

    let scaled = scaler.transform_all(&values);
    let mut window: Vec<f64> = scaled[scaled.len() - time_steps..].to_vec();

    let mut predictions = Vec::with_capacity(horizon_months);
    for step in 0..horizon_months {
        let pred = network.predict_window(&window);
        if !pred.is_finite() {
            return Err(ForecastError::ForecastNumerical(format!(
                "non-finite prediction at step {}",
                step + 1
            )));
        }
        predictions.push(pred);
        window.remove(0);
        window.push(pred);
    }

    let mut rows = Vec::with_capacity(horizon_months);
    let mut month = last_month;
    for pred in predictions {
        month = month.succ();
        let value = scaler.inverse_transform(pred);
        if !value.is_finite() {
            return Err(ForecastError::ForecastNumerical(format!(
                "non-finite value after inverse transform for {}",
                month
            )));
        }
        rows.push(ForecastRow {
            year: month.year,
            month: month.month,
            value,
        });
    }

    Ok(ForecastResult { rows })
}
