//! Long-running host for the three ingestion and aggregation loops.
//!
//! The scale listener, the activity synchronizer and the daily aggregator
//! each run as their own tokio task over a shared [`MeasurementStore`]. They
//! own disjoint series, so the only coordination between them is the store's
//! own serialization and a shared shutdown signal.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::aggregate::DailyAggregator;
use crate::clock::LocalZone;
use crate::error::{ConfigError, CoreError};
use crate::scale::{bind_scale_socket, ScaleIngestor};
use crate::storage::{Config, MeasurementStore};
use crate::sync::{ActivitySource, ActivitySynchronizer, GoogleFitSource};

/// Receiving side of the shutdown signal. Cheap to clone, one per loop.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sending side of the shutdown signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    /// Ask every loop to stop after its current tick.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    /// Whether shutdown was requested or the trigger was dropped.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once shutdown has been requested or the trigger was dropped.
    pub async fn triggered(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// The three loops wired to one store and one configuration.
pub struct Service {
    store: Arc<MeasurementStore>,
    config: Config,
    zone: LocalZone,
}

impl Service {
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(store: Arc<MeasurementStore>, config: Config) -> Result<Self, CoreError> {
        config.validate()?;
        let zone = config.zone().ok_or_else(|| ConfigError::InvalidValue {
            key: "clock.utc_offset_minutes".into(),
            message: "must be within ±24 hours".into(),
        })?;
        Ok(Self {
            store,
            config,
            zone,
        })
    }

    /// Bind the scale socket, connect the Google Fit client and run until
    /// `shutdown` fires.
    ///
    /// # Errors
    /// Start-up failures only: the socket cannot be bound or the activity
    /// client cannot be built. Failures inside a loop are logged there.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), CoreError> {
        let socket = bind_scale_socket(&self.config.scale.bind_addr).await?;
        let source = GoogleFitSource::from_config(&self.config.activity)?;
        if self.config.activity.resolved_access_token().is_none() {
            tracing::warn!(
                "no activity access token configured; expenditure sync will fail until one is set"
            );
        }
        self.run_with(socket, source, shutdown).await;
        Ok(())
    }

    /// Run the loops on an already bound socket and a given activity source.
    pub async fn run_with<S>(self, socket: UdpSocket, source: S, shutdown: Shutdown)
    where
        S: ActivitySource + 'static,
    {
        let ingestor = ScaleIngestor::new(Arc::clone(&self.store), &self.config.scale, self.zone);
        let synchronizer = ActivitySynchronizer::new(Arc::clone(&self.store), source, self.zone)
            .epoch_start_nanos(self.config.activity.epoch_start_nanos);
        let aggregator = DailyAggregator::new(
            Arc::clone(&self.store),
            self.zone,
            self.config.aggregation.moving_average_days,
        );

        let sync_period = self.config.activity.poll_interval();
        let aggregation_period = self.config.aggregation.poll_interval();

        let scale_task = tokio::spawn(ingestor.listen(socket, shutdown.clone()));
        let sync_task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { synchronizer.run(sync_period, shutdown).await }
        });
        let aggregation_task =
            tokio::spawn(async move { aggregator.run(aggregation_period, shutdown).await });

        tracing::info!("calorie-minder service started");
        let (scale, sync, aggregation) = tokio::join!(scale_task, sync_task, aggregation_task);
        for (name, result) in [
            ("scale listener", scale),
            ("activity sync", sync),
            ("aggregation", aggregation),
        ] {
            if let Err(err) = result {
                tracing::error!("{name} task ended abnormally: {err}");
            }
        }
        tracing::info!("calorie-minder service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DailyAggregate, ExpenditureInterval, WeightSample};
    use crate::sync::{RawPoint, StaticSource};
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_resolves_after_trigger() {
        let (trigger, mut shutdown) = shutdown_channel();
        assert!(!shutdown.is_triggered());
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), shutdown.triggered())
            .await
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn dropped_trigger_also_stops_loops() {
        let (trigger, mut shutdown) = shutdown_channel();
        drop(trigger);
        tokio::time::timeout(Duration::from_secs(1), shutdown.triggered())
            .await
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let store = Arc::new(MeasurementStore::open_in_memory().unwrap());
        let mut config = Config::default();
        config.aggregation.moving_average_days = 0;
        assert!(Service::new(store, config).is_err());
    }

    #[tokio::test]
    async fn loops_run_until_shutdown() {
        let store = Arc::new(MeasurementStore::open_in_memory().unwrap());
        let mut config = Config::default();
        config.clock.utc_offset_minutes = Some(0);
        config.activity.poll_interval_secs = 1;
        config.aggregation.poll_interval_secs = 1;

        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap();
        let hour = 3_600 * 1_000_000_000;
        let source = StaticSource::new(vec![RawPoint::new(now - 2 * hour, now - hour, 75.0)]);

        let socket = bind_scale_socket("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (trigger, shutdown) = shutdown_channel();
        let service = Service::new(Arc::clone(&store), config).unwrap();
        let task = tokio::spawn(service.run_with(socket, source, shutdown));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"scale,70.0'", addr).await.unwrap();

        let mut ready = false;
        for _ in 0..300 {
            ready = store.count::<WeightSample>().unwrap() == 1
                && store.count::<ExpenditureInterval>().unwrap() > 0
                && store.count::<DailyAggregate>().unwrap() > 0;
            if ready {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(ready);
    }
}
