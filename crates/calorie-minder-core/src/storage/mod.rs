mod config;
pub mod migrations;
pub mod records;
pub mod store;

pub use config::{
    ActivityConfig, AggregationConfig, ClockConfig, Config, ScaleConfig, ACCESS_TOKEN_ENV,
};
pub use records::{DailyAggregate, ExpenditureInterval, IntakeEvent, SeriesRecord, WeightSample};
pub use store::{MeasurementStore, SeriesRange, SeriesWriter, StoredWeightSample, Watermark};

use std::path::PathBuf;

/// Overrides the data directory outright when set.
pub const DATA_DIR_ENV: &str = "CALORIE_MINDER_DATA_DIR";

/// Returns `~/.config/calorie-minder[-dev]/` based on CALORIE_MINDER_ENV.
///
/// Set CALORIE_MINDER_ENV=dev to use the development data directory, or
/// CALORIE_MINDER_DATA_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env =
                std::env::var("CALORIE_MINDER_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("calorie-minder-dev")
            } else {
                base_dir.join("calorie-minder")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
