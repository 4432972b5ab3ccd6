//! # Calorie Minder Core Library
//!
//! This library tracks one person's energy balance by combining three time
//! series that arrive on their own schedules: body-weight readings broadcast
//! by a network scale, meal intake logged by hand, and calorie expenditure
//! pulled from a remote activity tracker. The `calorie-minder` CLI is a thin
//! layer over the same library.
//!
//! ## Architecture
//!
//! - **Storage**: SQLite-backed [`MeasurementStore`] for the raw series and the
//!   derived daily table, plus TOML-based [`Config`]
//! - **Scale**: UDP listener that drops retransmitted readings
//! - **Sync**: Google Fit client with purge-before-refetch and day-boundary
//!   splitting of expenditure intervals
//! - **Aggregate**: full rebuild of per-day totals and trailing averages
//! - **Service**: hosts the three loops until shutdown
//!
//! ## Key Components
//!
//! - [`ScaleIngestor`]: quiet-window dedup of scale datagrams
//! - [`ActivitySynchronizer`]: periodic expenditure sync
//! - [`DailyAggregator`]: daily calories in/out with moving averages
//! - [`LocalZone`]: the single source of local calendar dates

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod scale;
pub mod service;
pub mod storage;
pub mod sync;

pub use aggregate::{build_daily_aggregates, DailyAggregator, TrailingAverage};
pub use clock::{Clock, LocalZone, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, IngestError, StoreError, SyncError};
pub use scale::{bind_scale_socket, parse_weight, ScaleIngestor};
pub use service::{shutdown_channel, Service, Shutdown, ShutdownTrigger};
pub use storage::{
    data_dir, Config, DailyAggregate, ExpenditureInterval, IntakeEvent, MeasurementStore,
    SeriesRange, SeriesRecord, StoredWeightSample, Watermark, WeightSample,
};
pub use sync::{
    split_at_local_midnights, ActivitySource, ActivitySynchronizer, GoogleFitSource, RawPoint,
    StaticSource, SyncReport,
};
