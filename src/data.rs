//! Wide-table ingestion and per-entity monthly series extraction

use crate::error::{ForecastError, Result};
use crate::key::EntityKey;
use log::warn;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::Path;

/// A calendar month, the time unit of every series in this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(ForecastError::InvalidParameter(format!(
                "month must be 1-12, got {}",
                month
            )));
        }
        Ok(Self { year, month })
    }

    /// Parse a `YYYY-MM` (or `YYYY-M`) column header
    pub fn parse(s: &str) -> Option<Self> {
        let (y, m) = s.trim().split_once('-')?;
        let year: i32 = y.parse().ok()?;
        let month: u32 = m.parse().ok()?;
        if y.len() == 4 && (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// The next calendar month, rolling over the year boundary
    pub fn succ(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// One observed month of a series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub month: YearMonth,
    pub value: f64,
}

/// A strictly ordered monthly series for one entity key.
///
/// Months with unparseable values are dropped during extraction, so the
/// series is monotonic but not necessarily gap-free in the middle; the
/// window builder and forecaster operate on observation order.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySeries {
    points: Vec<SeriesPoint>,
}

impl MonthlySeries {
    /// Build a series from points, sorting them by month
    pub fn new(mut points: Vec<SeriesPoint>) -> Self {
        points.sort_by_key(|p| p.month);
        Self { points }
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The last observed month, if any
    pub fn last_month(&self) -> Option<YearMonth> {
        self.points.last().map(|p| p.month)
    }

    /// Sum of the most recent `window` observed values
    pub fn recent_sum(&self, window: usize) -> f64 {
        let start = self.points.len().saturating_sub(window);
        self.points[start..].iter().map(|p| p.value).sum()
    }
}

/// Reject series whose most recent `window` observations sum to zero.
///
/// The original pipeline compared against a fixed calendar range; here the
/// window is anchored to the series' own end so the check keeps working as
/// new months land.
pub fn ensure_recent_activity(series: &MonthlySeries, window: usize) -> Result<()> {
    if series.recent_sum(window) == 0.0 {
        return Err(ForecastError::SeriesUnavailable(format!(
            "no activity in the last {} observed months (discontinued?)",
            window
        )));
    }
    Ok(())
}

/// Identifier column names of the wide tables
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub region: String,
    pub model: String,
    pub segment: String,
    pub plant: String,
}

impl Default for TableSchema {
    fn default() -> Self {
        Self {
            region: "region".to_string(),
            model: "model".to_string(),
            segment: "segment".to_string(),
            plant: "plant".to_string(),
        }
    }
}

/// Loader for the per-brand wide CSV tables
#[derive(Debug)]
pub struct TableLoader;

impl TableLoader {
    /// Load a wide table from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;
        Ok(df)
    }
}

/// Pure extractor from a wide table plus an entity key to a monthly series
#[derive(Debug, Clone, Default)]
pub struct SeriesExtractor {
    schema: TableSchema,
}

impl SeriesExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(schema: TableSchema) -> Self {
        Self { schema }
    }

    /// Extract the monthly series for `key` from a wide table.
    ///
    /// Rows matching every key component are selected (several matching
    /// rows are summed per month), month columns are transposed into a
    /// time-ordered series, values are coerced to numeric with unparseable
    /// cells treated as missing, and leading/trailing missing months are
    /// dropped. An empty result is a `SeriesUnavailable` error, not a
    /// zero-length series.
    pub fn extract(&self, df: &DataFrame, key: &EntityKey) -> Result<MonthlySeries> {
        let matched = self.filter_rows(df, key)?;
        if matched.height() == 0 {
            return Err(ForecastError::SeriesUnavailable(format!(
                "no rows match {}",
                key
            )));
        }

        let months = month_columns(&matched);
        if months.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "table has no YYYY-MM month columns".to_string(),
            ));
        }

        let mut raw: Vec<(YearMonth, Option<f64>)> = Vec::with_capacity(months.len());
        for (ym, name) in &months {
            let col = matched.column(name)?;
            let mut sum = None;
            for idx in 0..matched.height() {
                if let Some(v) = any_to_f64(&col.get(idx)?) {
                    sum = Some(sum.unwrap_or(0.0) + v);
                }
            }
            raw.push((*ym, sum));
        }

        // Trim leading/trailing missing months, then drop interior misses
        let first = raw.iter().position(|(_, v)| v.is_some());
        let last = raw.iter().rposition(|(_, v)| v.is_some());
        let points = match (first, last) {
            (Some(first), Some(last)) => raw[first..=last]
                .iter()
                .filter_map(|(ym, v)| v.map(|value| SeriesPoint { month: *ym, value }))
                .collect(),
            _ => Vec::new(),
        };

        if points.is_empty() {
            return Err(ForecastError::SeriesUnavailable(format!(
                "{} has no usable monthly values",
                key
            )));
        }
        Ok(MonthlySeries::new(points))
    }

    fn filter_rows(&self, df: &DataFrame, key: &EntityKey) -> Result<DataFrame> {
        let columns: Vec<(&str, &str)> = match key {
            EntityKey::Region { region } => vec![(self.schema.region.as_str(), region.as_str())],
            EntityKey::Car { model, segment } => vec![
                (self.schema.model.as_str(), model.as_str()),
                (self.schema.segment.as_str(), segment.as_str()),
            ],
            EntityKey::Plant {
                plant,
                model,
                segment,
            } => vec![
                (self.schema.plant.as_str(), plant.as_str()),
                (self.schema.model.as_str(), model.as_str()),
                (self.schema.segment.as_str(), segment.as_str()),
            ],
        };

        let mut mask: Option<BooleanChunked> = None;
        for (column, value) in columns {
            let col = df.column(column).map_err(|_| {
                ForecastError::InvalidParameter(format!(
                    "table is missing identifier column '{}'",
                    column
                ))
            })?;
            // Segment codes may be inferred as integers; compare as text
            let eq = col.cast(&DataType::Utf8)?.utf8()?.equal(value);
            mask = Some(match mask {
                Some(acc) => acc & eq,
                None => eq,
            });
        }

        let mask = mask.ok_or_else(|| {
            ForecastError::InvalidParameter("entity key has no components".to_string())
        })?;
        Ok(df.filter(&mask)?)
    }
}

/// Columns whose headers parse as `YYYY-MM`, in calendar order.
///
/// Headers like `2024-1` and `2024-01` name the same month; only the
/// first such column is kept so a series never carries two values for
/// one month.
fn month_columns(df: &DataFrame) -> Vec<(YearMonth, String)> {
    let mut columns: Vec<(YearMonth, String)> = df
        .get_column_names()
        .into_iter()
        .filter_map(|name| YearMonth::parse(name).map(|ym| (ym, name.to_string())))
        .collect();
    // Stable sort keeps table order within one month, so dedup keeps the
    // leftmost spelling
    columns.sort_by_key(|(ym, _)| *ym);
    columns.dedup_by(|dup, kept| {
        if dup.0 == kept.0 {
            warn!("ignoring column '{}': same month as '{}'", dup.1, kept.1);
            true
        } else {
            false
        }
    });
    columns
}

fn any_to_f64(value: &AnyValue) -> Option<f64> {
    let v = match value {
        AnyValue::Float64(v) => *v,
        AnyValue::Float32(v) => *v as f64,
        AnyValue::Int64(v) => *v as f64,
        AnyValue::Int32(v) => *v as f64,
        AnyValue::Int16(v) => *v as f64,
        AnyValue::Int8(v) => *v as f64,
        AnyValue::UInt64(v) => *v as f64,
        AnyValue::UInt32(v) => *v as f64,
        AnyValue::UInt16(v) => *v as f64,
        AnyValue::UInt8(v) => *v as f64,
        AnyValue::Utf8(s) => s.trim().parse().ok()?,
        AnyValue::Utf8Owned(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}
