//! Daily calorie-in/calorie-out aggregation.

pub mod aggregator;
pub mod moving_average;

pub use aggregator::{build_daily_aggregates, DailyAggregator, InputWatermarks};
pub use moving_average::TrailingAverage;
