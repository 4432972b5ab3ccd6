//! One-shot activity sync.

use calorie_minder_core::{ActivitySynchronizer, GoogleFitSource};

use super::{load_config, open_store, runtime, zone};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let store = open_store()?;
    let source = GoogleFitSource::from_config(&config.activity)?;
    let synchronizer = ActivitySynchronizer::new(store, source, zone(&config)?)
        .epoch_start_nanos(config.activity.epoch_start_nanos);

    let report = runtime()?.block_on(synchronizer.sync())?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
