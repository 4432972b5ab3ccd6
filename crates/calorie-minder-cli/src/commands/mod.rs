pub mod config;
pub mod history;
pub mod intake;
pub mod run;
pub mod sync;
pub mod weight;

use std::sync::Arc;

use calorie_minder_core::{Config, LocalZone, MeasurementStore};

/// Load the config file, creating it with defaults on first use.
pub fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    Ok(Config::load()?)
}

pub fn open_store() -> Result<Arc<MeasurementStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(MeasurementStore::open_default()?))
}

pub fn zone(config: &Config) -> Result<LocalZone, Box<dyn std::error::Error>> {
    config
        .zone()
        .ok_or_else(|| "clock.utc_offset_minutes is out of range".into())
}

pub fn runtime() -> Result<tokio::runtime::Runtime, Box<dyn std::error::Error>> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}
