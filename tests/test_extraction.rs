use auto_forecast::{EntityKey, ForecastError, SeriesExtractor, TableSchema, YearMonth};
use polars::prelude::*;
use pretty_assertions::assert_eq;

// Wide by-region table: identifier column plus one column per month
fn region_table() -> DataFrame {
    DataFrame::new(vec![
        Series::new("region", &["Germany", "France", "Ghost"]),
        Series::new("continent", &["Europe", "Europe", "Europe"]),
        Series::new("2024-01", &[120i64, 80, 0]),
        Series::new("2024-02", &[130i64, 85, 0]),
        Series::new("2024-03", &[125i64, 90, 0]),
        Series::new("2024-04", &[140i64, 95, 0]),
    ])
    .unwrap()
}

fn car_table() -> DataFrame {
    DataFrame::new(vec![
        Series::new("model", &["Avante", "Avante", "Sonata"]),
        Series::new("segment", &["01", "03", "01"]),
        Series::new("2024-01", &[10i64, 40, 70]),
        Series::new("2024-02", &[11i64, 41, 71]),
        Series::new("2024-03", &[12i64, 42, 72]),
    ])
    .unwrap()
}

#[test]
fn extracts_region_series_in_month_order() {
    let extractor = SeriesExtractor::new();
    let series = extractor
        .extract(&region_table(), &EntityKey::region("Germany"))
        .unwrap();

    assert_eq!(series.len(), 4);
    assert_eq!(series.values(), vec![120.0, 130.0, 125.0, 140.0]);
    assert_eq!(series.last_month(), Some(YearMonth { year: 2024, month: 4 }));
    // The non-month identifier column is ignored, not parsed as data
    assert_eq!(series.points()[0].month, YearMonth { year: 2024, month: 1 });
}

#[test]
fn extracts_car_series_by_model_and_segment() {
    let extractor = SeriesExtractor::new();
    let series = extractor
        .extract(&car_table(), &EntityKey::car("Avante", "03"))
        .unwrap();
    assert_eq!(series.values(), vec![40.0, 41.0, 42.0]);
}

#[test]
fn unknown_key_is_series_unavailable() {
    let extractor = SeriesExtractor::new();
    let err = extractor
        .extract(&region_table(), &EntityKey::region("Atlantis"))
        .unwrap_err();
    assert!(matches!(err, ForecastError::SeriesUnavailable(_)));
}

#[test]
fn unparseable_cells_are_dropped_not_zero_filled() {
    let df = DataFrame::new(vec![
        Series::new("region", &["Germany"]),
        Series::new("2024-01", &["n/a"]),
        Series::new("2024-02", &["130"]),
        Series::new("2024-03", &["not a number"]),
        Series::new("2024-04", &["140"]),
        Series::new("2024-05", &["-"]),
    ])
    .unwrap();

    let series = SeriesExtractor::new()
        .extract(&df, &EntityKey::region("Germany"))
        .unwrap();

    // Leading and trailing misses are trimmed, the interior miss is dropped
    assert_eq!(series.values(), vec![130.0, 140.0]);
    assert_eq!(series.points()[0].month, YearMonth { year: 2024, month: 2 });
    assert_eq!(series.last_month(), Some(YearMonth { year: 2024, month: 4 }));
}

#[test]
fn matching_rows_are_summed_per_month() {
    let df = DataFrame::new(vec![
        Series::new("region", &["Germany", "Germany"]),
        Series::new("2024-01", &[100i64, 20]),
        Series::new("2024-02", &[110i64, 30]),
    ])
    .unwrap();

    let series = SeriesExtractor::new()
        .extract(&df, &EntityKey::region("Germany"))
        .unwrap();
    assert_eq!(series.values(), vec![120.0, 140.0]);
}

#[test]
fn duplicate_month_spellings_collapse_to_one_column() {
    // `2024-1` and `2024-01` name the same month; the leftmost column wins
    let df = DataFrame::new(vec![
        Series::new("region", &["Germany"]),
        Series::new("2024-01", &[100i64]),
        Series::new("2024-1", &[999i64]),
        Series::new("2024-02", &[110i64]),
    ])
    .unwrap();

    let series = SeriesExtractor::new()
        .extract(&df, &EntityKey::region("Germany"))
        .unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series.values(), vec![100.0, 110.0]);
    assert_eq!(series.points()[0].month, YearMonth { year: 2024, month: 1 });
}

#[test]
fn plant_keys_use_custom_schema_columns() {
    let df = DataFrame::new(vec![
        Series::new("공장명", &["Ulsan", "Asan"]),
        Series::new("차종", &["Avante", "Sonata"]),
        Series::new("구분", &["02", "02"]),
        Series::new("2024-01", &[500i64, 300]),
        Series::new("2024-02", &[520i64, 310]),
    ])
    .unwrap();

    let schema = TableSchema {
        plant: "공장명".to_string(),
        model: "차종".to_string(),
        segment: "구분".to_string(),
        ..TableSchema::default()
    };
    let series = SeriesExtractor::with_schema(schema)
        .extract(&df, &EntityKey::plant("Ulsan", "Avante", "02"))
        .unwrap();
    assert_eq!(series.values(), vec![500.0, 520.0]);
}

#[test]
fn table_without_month_columns_is_invalid() {
    let df = DataFrame::new(vec![
        Series::new("region", &["Germany"]),
        Series::new("total", &[100i64]),
    ])
    .unwrap();
    let err = SeriesExtractor::new()
        .extract(&df, &EntityKey::region("Germany"))
        .unwrap_err();
    assert!(matches!(err, ForecastError::InvalidParameter(_)));
}
