use auto_forecast::{
    EntityKey, ForecastError, ForecastPipeline, ModelSource, ModelStore, PipelineConfig,
    TrainingConfig,
};
use polars::prelude::*;
use std::time::Duration;

const START_YEAR: i32 = 2023;

// Wide table with one region row holding `values` starting at 2023-01
fn region_table(region: &str, values: &[f64]) -> DataFrame {
    let mut columns = vec![Series::new("region", &[region])];
    let mut year = START_YEAR;
    let mut month = 1u32;
    for &v in values {
        columns.push(Series::new(&format!("{year:04}-{month:02}"), &[v]));
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    DataFrame::new(columns).unwrap()
}

// Small, seeded configuration so tests stay fast and reproducible
fn test_config(seed: u64) -> PipelineConfig {
    PipelineConfig {
        time_steps: 12,
        recent_window: 6,
        training: TrainingConfig {
            units: 10,
            epochs: 150,
            batch_size: 4,
            loss_threshold: 0.01,
            seed: Some(seed),
            ..TrainingConfig::default()
        },
    }
}

fn pipeline_in(dir: &tempfile::TempDir, seed: u64) -> ForecastPipeline {
    let store = ModelStore::open(dir.path().join("models")).unwrap();
    ForecastPipeline::with_config(store, test_config(seed)).unwrap()
}

#[test]
fn linear_trend_forecast_stays_in_a_sane_band() {
    // 24 months of linear growth: 100, 105, ..., 215
    let values: Vec<f64> = (0..24).map(|i| 100.0 + 5.0 * i as f64).collect();
    let table = region_table("Germany", &values);
    let dir = tempfile::TempDir::new().unwrap();
    let pipeline = pipeline_in(&dir, 42);

    let outcome = pipeline
        .run(&table, &EntityKey::region("Germany"), 3)
        .unwrap();

    assert_eq!(outcome.source, ModelSource::Trained);
    assert_eq!(outcome.result.len(), 3);
    // Forecast months continue right after 2024-12 and roll the year over
    let labels: Vec<(i32, u32)> = outcome
        .result
        .rows()
        .iter()
        .map(|r| (r.year, r.month))
        .collect();
    assert_eq!(labels, vec![(2025, 1), (2025, 2), (2025, 3)]);
    // Autoregressive error compounds, so assert a tolerance band rather
    // than exact trend continuation
    for row in outcome.result.rows() {
        assert!(row.value.is_finite());
        assert!(
            row.value > 0.0 && row.value < 600.0,
            "forecast {} out of band",
            row.value
        );
    }
}

#[test]
fn discontinued_series_is_rejected_before_training() {
    // Last 6 months are all zero
    let mut values: Vec<f64> = (0..18).map(|i| 100.0 + i as f64).collect();
    values.extend([0.0; 6]);
    let table = region_table("Ghost", &values);
    let dir = tempfile::TempDir::new().unwrap();
    let pipeline = pipeline_in(&dir, 1);

    let err = pipeline
        .run(&table, &EntityKey::region("Ghost"), 3)
        .unwrap_err();
    assert!(matches!(err, ForecastError::SeriesUnavailable(_)));

    // Nothing may have been cached for the rejected entity
    let models = dir.path().join("models");
    assert_eq!(std::fs::read_dir(models).unwrap().count(), 0);
}

#[test]
fn diverged_training_caches_nothing() {
    let values: Vec<f64> = (0..24).map(|i| 100.0 + 5.0 * i as f64).collect();
    let table = region_table("Germany", &values);
    let dir = tempfile::TempDir::new().unwrap();

    // An absurd learning rate overflows the forward pass within an epoch
    let mut config = test_config(3);
    config.training.learning_rate = 1e100;
    let store = ModelStore::open(dir.path().join("models")).unwrap();
    let pipeline = ForecastPipeline::with_config(store, config).unwrap();

    let err = pipeline
        .run(&table, &EntityKey::region("Germany"), 3)
        .unwrap_err();
    assert!(matches!(err, ForecastError::TrainingDivergence { .. }));

    // Neither artifacts nor the training lock may survive the failed run
    let models = dir.path().join("models");
    assert_eq!(std::fs::read_dir(models).unwrap().count(), 0);
}

#[test]
fn short_series_is_insufficient_history() {
    let values: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
    let table = region_table("Andorra", &values);
    let dir = tempfile::TempDir::new().unwrap();
    let pipeline = pipeline_in(&dir, 1);

    let err = pipeline
        .run(&table, &EntityKey::region("Andorra"), 3)
        .unwrap_err();
    assert!(matches!(
        err,
        ForecastError::InsufficientHistory { actual: 10, required: 13 }
    ));
}

#[test]
fn second_call_hits_the_cache_and_repeats_the_forecast() {
    let values: Vec<f64> = (0..24).map(|i| 100.0 + 5.0 * i as f64).collect();
    let table = region_table("Germany", &values);
    let dir = tempfile::TempDir::new().unwrap();
    let pipeline = pipeline_in(&dir, 7);
    let key = EntityKey::region("Germany");

    let first = pipeline.run(&table, &key, 6).unwrap();
    assert_eq!(first.source, ModelSource::Trained);

    let second = pipeline.run(&table, &key, 6).unwrap();
    assert_eq!(second.source, ModelSource::Cache);
    // Loaded weights are the saved weights, so the forecast is identical
    assert_eq!(first.result, second.result);
}

#[test]
fn appended_month_forces_a_retrain() {
    let values: Vec<f64> = (0..24).map(|i| 100.0 + 5.0 * i as f64).collect();
    let dir = tempfile::TempDir::new().unwrap();
    let pipeline = pipeline_in(&dir, 7);
    let key = EntityKey::region("Germany");

    let first = pipeline.run(&region_table("Germany", &values), &key, 3).unwrap();
    assert_eq!(first.source, ModelSource::Trained);

    // A new month lands; the cached model is now stale
    let mut longer = values.clone();
    longer.push(220.0);
    let third = pipeline.run(&region_table("Germany", &longer), &key, 3).unwrap();
    assert_eq!(third.source, ModelSource::Trained);
}

#[test]
fn training_lock_blocks_a_competing_request() {
    let values: Vec<f64> = (0..24).map(|i| 100.0 + 5.0 * i as f64).collect();
    let table = region_table("Germany", &values);
    let dir = tempfile::TempDir::new().unwrap();

    let store = ModelStore::open(dir.path().join("models"))
        .unwrap()
        .with_lock_wait(Duration::from_millis(50));
    let pipeline = ForecastPipeline::with_config(store.clone(), test_config(7)).unwrap();
    let key = EntityKey::region("Germany");

    let _guard = store.lock(&key).unwrap();
    let err = pipeline.run(&table, &key, 3).unwrap_err();
    assert!(matches!(err, ForecastError::StoreBusy(_)));
}

#[test]
fn one_bad_entity_leaves_other_artifacts_alone() {
    let good: Vec<f64> = (0..24).map(|i| 100.0 + 5.0 * i as f64).collect();
    let dir = tempfile::TempDir::new().unwrap();
    let pipeline = pipeline_in(&dir, 3);
    let good_key = EntityKey::region("Germany");

    pipeline
        .run(&region_table("Germany", &good), &good_key, 3)
        .unwrap();
    let cached: Vec<_> = std::fs::read_dir(dir.path().join("models"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(cached.len(), 2);

    // A failing request for another key must not touch the cached pair
    let short: Vec<f64> = vec![1.0; 5];
    assert!(pipeline
        .run(&region_table("France", &short), &EntityKey::region("France"), 3)
        .is_err());
    let after: Vec<_> = std::fs::read_dir(dir.path().join("models"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(cached.len(), after.len());
}
