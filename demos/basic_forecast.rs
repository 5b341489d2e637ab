use auto_forecast::{
    EntityKey, ForecastPipeline, ModelSource, ModelStore, PipelineConfig, TrainingConfig,
};
use polars::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Build a small in-memory by-region table: two years of monthly
    // export volumes for one region
    let mut columns = vec![Series::new("region", &["Germany"])];
    for (i, header) in month_headers(2023, 24).iter().enumerate() {
        let volume = 1000.0 + 40.0 * i as f64 + 60.0 * ((i % 12) as f64 / 11.0);
        columns.push(Series::new(header, &[volume]));
    }
    let table = DataFrame::new(columns)?;

    // Keep training quick for the demo
    let config = PipelineConfig {
        training: TrainingConfig {
            units: 16,
            epochs: 200,
            seed: Some(42),
            ..TrainingConfig::default()
        },
        ..PipelineConfig::default()
    };

    let store = ModelStore::open("models")?;
    let pipeline = ForecastPipeline::with_config(store, config)?;
    let key = EntityKey::region("Germany");

    let outcome = pipeline.run(&table, &key, 6)?;
    match outcome.source {
        ModelSource::Trained => println!("Trained a new model for {}", key),
        ModelSource::Cache => println!("Loaded the cached model for {}", key),
    }

    println!("Forecast for the 6 months after {}:", outcome.last_observed);
    for row in outcome.result.rows() {
        println!("{:04}-{:02}: {:.0}", row.year, row.month, row.value);
    }

    Ok(())
}

fn month_headers(start_year: i32, count: usize) -> Vec<String> {
    let mut headers = Vec::with_capacity(count);
    let (mut year, mut month) = (start_year, 1u32);
    for _ in 0..count {
        headers.push(format!("{year:04}-{month:02}"));
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    headers
}
