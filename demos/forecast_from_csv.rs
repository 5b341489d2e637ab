use auto_forecast::{EntityKey, ForecastPipeline, ModelStore, TableLoader};
use std::env;

// Forecast from a real wide CSV:
//
//   cargo run --example forecast_from_csv -- data/by-region.csv Germany 12
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("usage: forecast_from_csv <wide.csv> <region> <horizon_months>");
        std::process::exit(2);
    }
    let path = &args[1];
    let region = &args[2];
    let horizon: usize = args[3].parse()?;

    println!("Loading table from: {}", path);
    let table = TableLoader::from_csv(path)?;

    let pipeline = ForecastPipeline::new(ModelStore::open("models")?);
    let key = EntityKey::region(region);
    println!("Forecasting {} months for {} (first run trains a model and can take a while)", horizon, key);

    let outcome = pipeline.run(&table, &key, horizon)?;
    for row in outcome.result.rows() {
        println!("{:04}-{:02}: {:.0}", row.year, row.month, row.value);
    }

    Ok(())
}
