//! Tests for the activity synchronizer.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    use crate::clock::{LocalZone, ManualClock, NANOS_PER_SECOND};
    use crate::service::shutdown_channel;
    use crate::storage::{ExpenditureInterval, MeasurementStore};
    use crate::sync::source::{ActivitySource, StaticSource};
    use crate::sync::synchronizer::{ActivitySynchronizer, DEFAULT_EPOCH_START_NANOS};
    use crate::sync::types::{RawPoint, SyncError};

    const MINUTE: i64 = 60 * NANOS_PER_SECOND;

    struct UnreachableSource;

    impl ActivitySource for UnreachableSource {
        async fn fetch_points(&self, _: i64, _: i64) -> Result<Vec<RawPoint>, SyncError> {
            Err(SyncError::TransientNetwork("connection refused".into()))
        }
    }

    /// Fails the first fetch, then returns one point.
    struct FlakySource {
        calls: Arc<AtomicUsize>,
    }

    impl ActivitySource for FlakySource {
        async fn fetch_points(&self, _: i64, _: i64) -> Result<Vec<RawPoint>, SyncError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(SyncError::TransientNetwork("connection reset".into()));
            }
            Ok(vec![RawPoint::new(ns(9, 10, 0), ns(9, 10, 15), 20.0)])
        }
    }

    fn ns(day: u32, hour: u32, minute: u32) -> i64 {
        Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0)
            .unwrap()
            .timestamp_nanos_opt()
            .unwrap()
    }

    fn noon_on_the_tenth() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn interval(start: i64, end: i64, calories: f64) -> ExpenditureInterval {
        ExpenditureInterval {
            start_nanos: start,
            end_nanos: end,
            calories,
        }
    }

    fn synchronizer<S: ActivitySource>(
        store: &Arc<MeasurementStore>,
        source: S,
    ) -> ActivitySynchronizer<S, ManualClock> {
        ActivitySynchronizer::with_clock(
            Arc::clone(store),
            source,
            LocalZone::utc(),
            ManualClock::new(noon_on_the_tenth()),
        )
    }

    fn seeded_store() -> Arc<MeasurementStore> {
        let store = Arc::new(MeasurementStore::open_in_memory().unwrap());
        store
            .append_batch(&[
                interval(ns(9, 10, 0), ns(9, 10, 15), 20.0),
                interval(ns(9, 23, 0), ns(9, 23, 30), 35.0),
                interval(ns(10, 8, 0), ns(10, 8, 15), 18.0),
            ])
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_purge_then_empty_fetch_removes_today_and_latest() {
        let store = seeded_store();
        let report = synchronizer(&store, StaticSource::default())
            .sync()
            .await
            .unwrap();

        assert_eq!(report.purged, 2);
        assert_eq!(report.fetched_from_nanos, ns(9, 10, 15));
        assert_eq!(
            report.fetched_until_nanos,
            noon_on_the_tenth().timestamp_nanos_opt().unwrap()
        );
        assert_eq!(
            store.all::<ExpenditureInterval>().unwrap(),
            vec![interval(ns(9, 10, 0), ns(9, 10, 15), 20.0)]
        );
    }

    #[tokio::test]
    async fn test_purge_is_committed_even_when_fetch_fails() {
        let store = seeded_store();
        let result = synchronizer(&store, UnreachableSource).sync().await;

        assert!(matches!(result, Err(SyncError::TransientNetwork(_))));
        assert_eq!(store.count::<ExpenditureInterval>().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_recovers_after_a_failed_fetch() {
        let store = Arc::new(MeasurementStore::open_in_memory().unwrap());
        let calls = Arc::new(AtomicUsize::new(0));
        let sync = synchronizer(
            &store,
            FlakySource {
                calls: Arc::clone(&calls),
            },
        );
        let (trigger, shutdown) = shutdown_channel();
        let task = tokio::spawn(async move {
            sync.run(Duration::from_millis(20), shutdown).await;
        });

        let mut synced = false;
        for _ in 0..200 {
            synced = calls.load(Ordering::SeqCst) >= 2
                && store.count::<ExpenditureInterval>().unwrap() == 1;
            if synced {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(synced);
        assert_eq!(store.count::<ExpenditureInterval>().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_store_fetches_from_epoch_start() {
        let store = Arc::new(MeasurementStore::open_in_memory().unwrap());
        let report = synchronizer(&store, StaticSource::default())
            .sync()
            .await
            .unwrap();
        assert_eq!(report.purged, 0);
        assert_eq!(report.fetched_from_nanos, DEFAULT_EPOCH_START_NANOS);

        let custom = synchronizer(&store, StaticSource::default())
            .epoch_start_nanos(ns(1, 0, 0))
            .sync()
            .await
            .unwrap();
        assert_eq!(custom.fetched_from_nanos, ns(1, 0, 0));
    }

    #[tokio::test]
    async fn test_points_across_midnight_are_split_before_writing() {
        let store = Arc::new(MeasurementStore::open_in_memory().unwrap());
        let source = StaticSource::new(vec![RawPoint::new(
            ns(10, 0, 0) - 15 * MINUTE,
            ns(10, 0, 45),
            120.0,
        )]);

        let report = synchronizer(&store, source).sync().await.unwrap();

        assert_eq!(report.points_received, 1);
        assert_eq!(report.intervals_written, 2);
        let stored = store.all::<ExpenditureInterval>().unwrap();
        assert_eq!(stored[0].calories, 30.0);
        assert_eq!(stored[0].end_nanos, ns(10, 0, 0) - 1);
        assert_eq!(stored[1].start_nanos, ns(10, 0, 0));
        assert_eq!(stored[1].calories, 90.0);
    }

    #[tokio::test]
    async fn test_malformed_points_are_dropped_and_counted() {
        let store = Arc::new(MeasurementStore::open_in_memory().unwrap());
        let source = StaticSource::new(vec![
            RawPoint::new(ns(9, 8, 0), ns(9, 8, 30), 40.0),
            RawPoint::new(ns(9, 9, 0), ns(9, 9, 30), -5.0),
        ]);

        let report = synchronizer(&store, source).sync().await.unwrap();

        assert_eq!(report.points_dropped, 1);
        assert_eq!(store.count::<ExpenditureInterval>().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_repeated_sync_converges_to_same_rows() {
        let store = Arc::new(MeasurementStore::open_in_memory().unwrap());
        let source = StaticSource::new(vec![
            RawPoint::new(ns(9, 10, 0), ns(9, 10, 15), 20.0),
            RawPoint::new(ns(9, 23, 50), ns(10, 0, 10), 40.0),
            RawPoint::new(ns(10, 8, 0), ns(10, 8, 15), 18.0),
        ]);
        let sync = synchronizer(&store, source);

        sync.sync().await.unwrap();
        let first = store.all::<ExpenditureInterval>().unwrap();
        let second_report = sync.sync().await.unwrap();
        let second = store.all::<ExpenditureInterval>().unwrap();

        assert_eq!(first.len(), 4);
        assert_eq!(second_report.purged, 3);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_today_follows_configured_zone() {
        let store = Arc::new(MeasurementStore::open_in_memory().unwrap());
        // 2024-03-10T12:00Z is already the 11th at UTC+13.
        let zone = LocalZone::from_offset_minutes(Some(13 * 60)).unwrap();
        let local_midnight = zone.start_of_day_nanos(NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        store
            .append_batch(&[
                interval(local_midnight - 60 * MINUTE, local_midnight - 30 * MINUTE, 1.0),
                interval(local_midnight - 20 * MINUTE, local_midnight - 10 * MINUTE, 1.0),
                interval(local_midnight + 10 * MINUTE, local_midnight + 20 * MINUTE, 1.0),
            ])
            .unwrap();

        let sync = ActivitySynchronizer::with_clock(
            Arc::clone(&store),
            StaticSource::default(),
            zone,
            ManualClock::new(noon_on_the_tenth()),
        );
        let report = sync.sync().await.unwrap();

        assert_eq!(report.purged, 2);
        assert_eq!(report.fetched_from_nanos, local_midnight - 30 * MINUTE);
    }
}
