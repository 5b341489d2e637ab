//! Min-max scaling and supervised window preparation

use crate::data::MonthlySeries;
use crate::error::{ForecastError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Min-max normalization fitted to one training series.
///
/// Fitted once per training run, persisted beside the model, and never
/// refit on forecast-only calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    data_min: f64,
    data_max: f64,
}

impl MinMaxScaler {
    /// Fit the scaler to the observed value range
    pub fn fit(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "cannot fit a scaler to an empty series".to_string(),
            ));
        }
        let data_min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let data_max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if !data_min.is_finite() || !data_max.is_finite() {
            return Err(ForecastError::ForecastNumerical(
                "series contains non-finite values".to_string(),
            ));
        }
        Ok(Self { data_min, data_max })
    }

    fn range(&self) -> f64 {
        self.data_max - self.data_min
    }

    /// Scale a value into [0, 1]. A constant series scales to 0.0.
    pub fn transform(&self, value: f64) -> f64 {
        let range = self.range();
        if range == 0.0 {
            0.0
        } else {
            (value - self.data_min) / range
        }
    }

    /// Map a scaled value back to the original scale
    pub fn inverse_transform(&self, scaled: f64) -> f64 {
        scaled * self.range() + self.data_min
    }

    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.transform(v)).collect()
    }

    pub fn inverse_transform_all(&self, scaled: &[f64]) -> Vec<f64> {
        scaled.iter().map(|&v| self.inverse_transform(v)).collect()
    }
}

/// Windowed training data: `x` rows of `time_steps` scaled values each,
/// `y` the scaled value immediately after each window
#[derive(Debug, Clone)]
pub struct TrainingData {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

impl TrainingData {
    pub fn samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn time_steps(&self) -> usize {
        self.x.ncols()
    }
}

/// Reformulate a series as next-step supervised learning.
///
/// Produces exactly `series.len() - time_steps` window/target pairs; a
/// series shorter than `time_steps + 1` cannot produce any and fails with
/// `InsufficientHistory` instead of returning degenerate arrays.
pub fn prepare(series: &MonthlySeries, time_steps: usize) -> Result<(TrainingData, MinMaxScaler)> {
    if time_steps == 0 {
        return Err(ForecastError::InvalidParameter(
            "time_steps must be positive".to_string(),
        ));
    }
    let values = series.values();
    if values.len() < time_steps + 1 {
        return Err(ForecastError::InsufficientHistory {
            actual: values.len(),
            required: time_steps + 1,
        });
    }

    let scaler = MinMaxScaler::fit(&values)?;
    let scaled = scaler.transform_all(&values);

    let samples = scaled.len() - time_steps;
    let mut x = Array2::zeros((samples, time_steps));
    let mut y = Array1::zeros(samples);
    for i in 0..samples {
        for t in 0..time_steps {
            x[[i, t]] = scaled[i + t];
        }
        y[i] = scaled[i + time_steps];
    }

    Ok((TrainingData { x, y }, scaler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SeriesPoint, YearMonth};
    use assert_approx_eq::assert_approx_eq;

    fn series_of(values: &[f64]) -> MonthlySeries {
        let mut month = YearMonth { year: 2023, month: 1 };
        let points = values
            .iter()
            .map(|&value| {
                let p = SeriesPoint { month, value };
                month = month.succ();
                p
            })
            .collect();
        MonthlySeries::new(points)
    }

    #[test]
    fn scaler_round_trips_in_range_values() {
        let scaler = MinMaxScaler::fit(&[10.0, 20.0, 30.0, 40.0, 50.0]).unwrap();
        for v in [10.0, 17.5, 33.3, 50.0] {
            assert_approx_eq!(scaler.inverse_transform(scaler.transform(v)), v, 1e-12);
        }
        assert_approx_eq!(scaler.transform(10.0), 0.0);
        assert_approx_eq!(scaler.transform(50.0), 1.0);
    }

    #[test]
    fn constant_series_scales_to_zero() {
        let scaler = MinMaxScaler::fit(&[7.0, 7.0, 7.0]).unwrap();
        assert_eq!(scaler.transform(7.0), 0.0);
        assert_eq!(scaler.inverse_transform(0.0), 7.0);
    }

    #[test]
    fn window_count_and_alignment() {
        let values: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let series = series_of(&values);
        let (data, scaler) = prepare(&series, 12).unwrap();

        assert_eq!(data.samples(), 20 - 12);
        assert_eq!(data.time_steps(), 12);
        // Each target is the value right after its window
        for i in 0..data.samples() {
            assert_approx_eq!(data.y[i], scaler.transform(values[i + 12]), 1e-12);
            assert_approx_eq!(data.x[[i, 11]], scaler.transform(values[i + 11]), 1e-12);
        }
    }

    #[test]
    fn short_series_is_rejected() {
        let series = series_of(&[1.0, 2.0, 3.0]);
        let err = prepare(&series, 12).unwrap_err();
        match err {
            crate::error::ForecastError::InsufficientHistory { actual, required } => {
                assert_eq!(actual, 3);
                assert_eq!(required, 13);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn exactly_minimum_length_yields_one_window() {
        let values: Vec<f64> = (0..13).map(|i| i as f64).collect();
        let (data, _) = prepare(&series_of(&values), 12).unwrap();
        assert_eq!(data.samples(), 1);
    }
}
