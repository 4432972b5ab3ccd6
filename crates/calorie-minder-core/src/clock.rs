//! Wall-clock and local calendar helpers.
//!
//! Every "which day does this belong to" question in the engine goes through
//! [`LocalZone`], so the rules for day boundaries live in one place and tests
//! can pin the zone to a fixed offset.

use std::sync::Mutex;

use chrono::{
    DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.lock();
        *now = *now + by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// The zone used to derive local calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalZone {
    /// Operating system local time.
    System,
    /// A fixed UTC offset.
    Fixed(FixedOffset),
}

impl Default for LocalZone {
    fn default() -> Self {
        LocalZone::System
    }
}

impl LocalZone {
    /// Zone for an optional configured offset in minutes east of UTC.
    ///
    /// Returns `None` when the offset is out of range (beyond ±24h).
    pub fn from_offset_minutes(minutes: Option<i32>) -> Option<Self> {
        match minutes {
            None => Some(LocalZone::System),
            Some(m) => FixedOffset::east_opt(m.checked_mul(60)?).map(LocalZone::Fixed),
        }
    }

    pub fn utc() -> Self {
        LocalZone::Fixed(Utc.fix())
    }

    /// UTC offset in effect at `instant`.
    pub fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset {
        match self {
            LocalZone::System => Local.offset_from_utc_datetime(&instant.naive_utc()).fix(),
            LocalZone::Fixed(offset) => *offset,
        }
    }

    /// Local wall-clock rendering of `instant`.
    pub fn local_datetime(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.naive_utc() + self.offset_at(instant)
    }

    /// Local calendar date of `instant`.
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local_datetime(instant).date()
    }

    /// Local calendar date of an epoch-nanosecond instant.
    pub fn date_of_nanos(&self, nanos: i64) -> NaiveDate {
        self.date_of(Utc.timestamp_nanos(nanos))
    }

    /// Epoch nanoseconds of the first instant of `date` in this zone.
    ///
    /// For the system zone the offset is the one in force at local midnight,
    /// so a DST change during that night does not shift the start of the day.
    /// When midnight itself is skipped by a DST jump the day starts at the jump.
    pub fn start_of_day_nanos(&self, date: NaiveDate) -> i64 {
        let naive_midnight = date.and_time(NaiveTime::MIN);
        match self {
            LocalZone::Fixed(offset) => local_midnight_nanos(date, *offset),
            LocalZone::System => Local
                .from_local_datetime(&naive_midnight)
                .earliest()
                .or_else(|| {
                    Local
                        .from_local_datetime(&(naive_midnight + chrono::Duration::hours(1)))
                        .earliest()
                })
                .and_then(|start| start.timestamp_nanos_opt())
                .unwrap_or_else(|| {
                    local_midnight_nanos(date, self.offset_at(naive_midnight.and_utc()))
                }),
        }
    }
}

/// Epoch nanoseconds of `date` 00:00 local, for a local zone at `offset`.
pub fn local_midnight_nanos(date: NaiveDate, offset: FixedOffset) -> i64 {
    let naive_midnight = date.and_time(NaiveTime::MIN);
    let utc_seconds = naive_midnight.and_utc().timestamp() - i64::from(offset.local_minus_utc());
    utc_seconds * NANOS_PER_SECOND
}

pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(hours: i32) -> LocalZone {
        LocalZone::Fixed(FixedOffset::east_opt(hours * 3600).unwrap())
    }

    #[test]
    fn date_follows_local_offset() {
        // 2024-03-10T23:30:00Z
        let instant = DateTime::from_timestamp(1_710_113_400, 0).unwrap();
        assert_eq!(
            zone(0).date_of(instant),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        );
        assert_eq!(
            zone(2).date_of(instant),
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
        );
        assert_eq!(
            zone(-5).date_of(instant),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        );
    }

    #[test]
    fn start_of_day_is_local_midnight() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        let nanos = zone(2).start_of_day_nanos(date);
        // 2024-03-10T22:00:00Z
        assert_eq!(nanos, 1_710_108_000 * NANOS_PER_SECOND);
        assert_eq!(zone(2).date_of_nanos(nanos), date);
        assert_eq!(
            zone(2).date_of_nanos(nanos - 1),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        );
    }

    #[test]
    fn offset_minutes_out_of_range_is_rejected() {
        assert!(LocalZone::from_offset_minutes(Some(25 * 60)).is_none());
        assert_eq!(LocalZone::from_offset_minutes(None), Some(LocalZone::System));
        assert_eq!(LocalZone::from_offset_minutes(Some(0)), Some(LocalZone::utc()));
    }
}
