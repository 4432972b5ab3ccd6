//! Daily energy-balance aggregation.
//!
//! Rebuilds the whole `daily_aggregates` table from the raw intake and
//! expenditure series on every pass. Nothing from a previous pass is reused,
//! so re-syncing the expenditure tail simply shows up in the next rebuild.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;

use crate::clock::LocalZone;
use crate::error::StoreError;
use crate::service::Shutdown;
use crate::storage::{
    DailyAggregate, ExpenditureInterval, IntakeEvent, MeasurementStore, Watermark,
};

use super::moving_average::TrailingAverage;

/// Change markers of the two series an aggregate depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputWatermarks {
    pub intake: Watermark,
    pub expenditure: Watermark,
}

/// Group raw series into per-day totals with trailing averages.
///
/// Intake is bucketed by its local timestamp's date, expenditure by the local
/// date of each interval's start. Days present in only one series get 0 on
/// the other side. Rows come back sorted by date.
pub fn build_daily_aggregates(
    intake: &[IntakeEvent],
    expenditure: &[ExpenditureInterval],
    zone: &LocalZone,
    moving_average_days: usize,
) -> Vec<DailyAggregate> {
    let mut days: BTreeMap<NaiveDate, (i64, f64)> = BTreeMap::new();

    for event in intake {
        days.entry(event.timestamp.date()).or_default().0 += i64::from(event.calorie_count);
    }
    for interval in expenditure {
        days.entry(zone.date_of_nanos(interval.start_nanos))
            .or_default()
            .1 += interval.calories;
    }

    let mut avg_in = TrailingAverage::new(moving_average_days);
    let mut avg_out = TrailingAverage::new(moving_average_days);

    days.into_iter()
        .map(|(date, (calories_in, calories_out))| {
            let calories_out = calories_out.round_ties_even() as i64;
            DailyAggregate {
                date,
                calories_in,
                calories_out,
                moving_avg_in: avg_in.push(calories_in),
                moving_avg_out: avg_out.push(calories_out),
            }
        })
        .collect()
}

/// Periodically rebuilds the daily aggregate table.
#[derive(Clone)]
pub struct DailyAggregator {
    store: Arc<MeasurementStore>,
    zone: LocalZone,
    moving_average_days: usize,
}

impl DailyAggregator {
    pub fn new(store: Arc<MeasurementStore>, zone: LocalZone, moving_average_days: usize) -> Self {
        Self {
            store,
            zone,
            moving_average_days,
        }
    }

    /// Rebuild and atomically replace the aggregate table.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read or written.
    pub fn recompute(&self) -> Result<Vec<DailyAggregate>, StoreError> {
        let intake = self.store.all::<IntakeEvent>()?;
        let expenditure = self.store.all::<ExpenditureInterval>()?;
        let rows = build_daily_aggregates(&intake, &expenditure, &self.zone, self.moving_average_days);
        self.store.replace_all(&rows)?;
        tracing::info!(
            "rebuilt {} daily aggregates from {} intake events and {} expenditure intervals",
            rows.len(),
            intake.len(),
            expenditure.len()
        );
        Ok(rows)
    }

    pub fn input_watermarks(&self) -> Result<InputWatermarks, StoreError> {
        Ok(InputWatermarks {
            intake: self.store.watermark::<IntakeEvent>()?,
            expenditure: self.store.watermark::<ExpenditureInterval>()?,
        })
    }

    /// Rebuild only when either input series changed since `seen`.
    ///
    /// `seen` is updated after a successful rebuild. Returns `None` when the
    /// pass was skipped.
    pub fn recompute_if_changed(
        &self,
        seen: &mut Option<InputWatermarks>,
    ) -> Result<Option<Vec<DailyAggregate>>, StoreError> {
        let current = self.input_watermarks()?;
        if seen.as_ref() == Some(&current) {
            tracing::debug!("inputs unchanged, skipping aggregation");
            return Ok(None);
        }
        let rows = self.recompute()?;
        *seen = Some(current);
        Ok(Some(rows))
    }

    /// Rebuild every `period` until `shutdown` fires.
    ///
    /// Each pass runs on the blocking pool. A failed pass leaves the
    /// watermark untouched, so the next tick tries again.
    pub async fn run(&self, period: Duration, mut shutdown: Shutdown) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut seen = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.triggered() => {}
            }
            if shutdown.is_triggered() {
                tracing::info!("aggregation loop shutting down");
                break;
            }

            let pass = tokio::task::spawn_blocking({
                let aggregator = self.clone();
                let mut last_seen = seen;
                move || {
                    aggregator
                        .recompute_if_changed(&mut last_seen)
                        .map(|_| last_seen)
                }
            })
            .await;

            match pass {
                Ok(Ok(last_seen)) => seen = last_seen,
                Ok(Err(err)) => tracing::error!("daily aggregation failed: {err}"),
                Err(err) => tracing::error!("daily aggregation task failed: {err}"),
            }
        }
    }
}
