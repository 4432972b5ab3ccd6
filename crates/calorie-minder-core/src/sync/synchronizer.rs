//! Periodic expenditure synchronization.
//!
//! Each pass first purges the trailing part of the stored series (everything
//! ending today plus the latest remaining interval), commits that, and only
//! then fetches from the remote source starting at the end of whatever is
//! left. A failed fetch therefore still leaves a purged tail, which the next
//! pass re-derives.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::clock::{Clock, LocalZone, SystemClock};
use crate::service::Shutdown;
use crate::storage::{ExpenditureInterval, MeasurementStore, SeriesRange};

use super::day_split::split_at_local_midnights;
use super::source::ActivitySource;
use super::types::{SyncError, SyncReport};

/// Fetch start used when the store holds no interval yet (2022-10-01T00:00:00Z).
pub const DEFAULT_EPOCH_START_NANOS: i64 = 1_664_582_400_000_000_000;

/// Pulls expenditure points from an [`ActivitySource`] into the store.
pub struct ActivitySynchronizer<S, C = SystemClock> {
    store: Arc<MeasurementStore>,
    source: S,
    clock: C,
    zone: LocalZone,
    epoch_start_nanos: i64,
}

impl<S: ActivitySource> ActivitySynchronizer<S, SystemClock> {
    pub fn new(store: Arc<MeasurementStore>, source: S, zone: LocalZone) -> Self {
        Self::with_clock(store, source, zone, SystemClock)
    }
}

impl<S: ActivitySource, C: Clock> ActivitySynchronizer<S, C> {
    pub fn with_clock(store: Arc<MeasurementStore>, source: S, zone: LocalZone, clock: C) -> Self {
        Self {
            store,
            source,
            clock,
            zone,
            epoch_start_nanos: DEFAULT_EPOCH_START_NANOS,
        }
    }

    pub fn epoch_start_nanos(mut self, nanos: i64) -> Self {
        self.epoch_start_nanos = nanos;
        self
    }

    /// Run one purge, fetch and write pass.
    ///
    /// # Errors
    /// Store failures and remote failures are returned; the purge is committed
    /// before the fetch and stays in effect either way.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let now = self.clock.now();
        let today = self.zone.date_of(now);
        let today_start = self.zone.start_of_day_nanos(today);
        let tomorrow_start = today
            .succ_opt()
            .map_or(i64::MAX, |d| self.zone.start_of_day_nanos(d));

        let (purged, last) = self
            .store
            .blocking(move |store| {
                store.write(|w| {
                    let ending_today = w.remove_range::<ExpenditureInterval>(
                        &SeriesRange::between(today_start, tomorrow_start),
                    )?;
                    let latest = w.remove_latest::<ExpenditureInterval>()?;
                    Ok((ending_today + latest, w.last::<ExpenditureInterval>()?))
                })
            })
            .await?;
        tracing::info!("purged {purged} expenditure intervals ending on {today} or last stored");

        let start = last.map_or(self.epoch_start_nanos, |i| i.end_nanos);
        let end = now.timestamp_nanos_opt().unwrap_or(i64::MAX);

        let mut report = SyncReport {
            purged,
            fetched_from_nanos: start,
            fetched_until_nanos: end,
            ..SyncReport::default()
        };

        let points = self.source.fetch_points(start, end).await?;
        report.points_received = points.len();

        let mut intervals = Vec::with_capacity(points.len());
        for point in &points {
            match split_at_local_midnights(point, &self.zone) {
                Ok(pieces) => intervals.extend(pieces),
                Err(reason) => {
                    tracing::warn!("dropping expenditure point: {reason}");
                    report.points_dropped += 1;
                }
            }
        }

        report.intervals_written = self
            .store
            .blocking(move |store| store.append_batch(&intervals))
            .await?;
        tracing::info!(
            "activity sync wrote {} intervals from {} points ({} dropped)",
            report.intervals_written,
            report.points_received,
            report.points_dropped
        );
        Ok(report)
    }

    /// Call [`Self::sync`] every `period` until `shutdown` fires.
    ///
    /// The first pass runs immediately. A pass in progress is allowed to
    /// finish; only the next tick is skipped on shutdown. A failed pass is
    /// logged and the loop carries on with the next tick.
    pub async fn run(&self, period: Duration, mut shutdown: Shutdown) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.triggered() => {}
            }
            if shutdown.is_triggered() {
                tracing::info!("activity sync loop shutting down");
                break;
            }

            match self.sync().await {
                Ok(_) => {}
                Err(err) if err.is_recoverable() => {
                    tracing::warn!("activity sync skipped this tick: {err}");
                }
                Err(err) => tracing::error!("activity sync failed: {err}"),
            }
        }
    }
}
