//! Bathroom-scale datagram ingestion.
//!
//! The scale repeats every reading several times in quick succession. Only
//! the first datagram after a quiet window is kept; the rest are treated as
//! retransmissions of the same weighing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use tokio::net::UdpSocket;

use crate::clock::{Clock, LocalZone, SystemClock};
use crate::error::{CoreError, IngestError};
use crate::service::Shutdown;
use crate::storage::{MeasurementStore, ScaleConfig, WeightSample};

use super::payload::parse_weight;

/// Largest datagram the scale is expected to send.
const MAX_DATAGRAM_BYTES: usize = 1024;

/// Turns scale datagrams into stored weight samples.
pub struct ScaleIngestor<C = SystemClock> {
    store: Arc<MeasurementStore>,
    clock: C,
    zone: LocalZone,
    quiet_window: Duration,
    subject_id: String,
    grams_per_unit: f64,
    last_accepted: Option<DateTime<Utc>>,
}

impl ScaleIngestor<SystemClock> {
    pub fn new(store: Arc<MeasurementStore>, config: &ScaleConfig, zone: LocalZone) -> Self {
        Self::with_clock(store, config, zone, SystemClock)
    }
}

impl<C: Clock> ScaleIngestor<C> {
    pub fn with_clock(
        store: Arc<MeasurementStore>,
        config: &ScaleConfig,
        zone: LocalZone,
        clock: C,
    ) -> Self {
        Self {
            store,
            clock,
            zone,
            quiet_window: config.quiet_window(),
            subject_id: config.subject_id.clone(),
            grams_per_unit: config.grams_per_unit,
            last_accepted: None,
        }
    }

    /// Handle one datagram.
    ///
    /// Returns the stored sample, or `None` when the datagram fell inside the
    /// quiet window of the previous accepted one.
    ///
    /// # Errors
    /// Malformed payloads and store failures. Neither moves the dedup window.
    pub fn on_datagram(
        &mut self,
        payload: &[u8],
        source: SocketAddr,
    ) -> Result<Option<WeightSample>, CoreError> {
        let Some((sample, now)) = self.admit(payload, source)? else {
            return Ok(None);
        };
        self.store.append(&sample)?;
        self.accepted(&sample, now, source);
        Ok(Some(sample))
    }

    /// Parse and dedup a datagram, producing the sample to store.
    fn admit(
        &self,
        payload: &[u8],
        source: SocketAddr,
    ) -> Result<Option<(WeightSample, DateTime<Utc>)>, IngestError> {
        let reading = parse_weight(payload).map_err(|reason| IngestError::MalformedPayload {
            source_addr: source.to_string(),
            reason,
        })?;

        let now = self.clock.now();
        if let Some(last) = self.last_accepted {
            // A clock that stepped backwards counts as "not yet elapsed".
            let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
            if elapsed <= self.quiet_window {
                tracing::debug!("dropping retransmission from {source} ({elapsed:?} after last)");
                return Ok(None);
            }
        }

        let sample = WeightSample {
            timestamp: self.zone.local_datetime(now).trunc_subsecs(0),
            subject_id: self.subject_id.clone(),
            value_grams: reading * self.grams_per_unit,
        };
        Ok(Some((sample, now)))
    }

    fn accepted(&mut self, sample: &WeightSample, at: DateTime<Utc>, source: SocketAddr) {
        self.last_accepted = Some(at);
        tracing::info!(
            "weight sample {:.0} g for {} from {source}",
            sample.value_grams,
            sample.subject_id
        );
    }

    /// Receive datagrams from `socket` until `shutdown` fires.
    ///
    /// Samples are written on the blocking pool. A failed write is logged and
    /// leaves the dedup window open, so the next datagram is accepted.
    pub async fn listen(mut self, socket: UdpSocket, mut shutdown: Shutdown) {
        let mut buf = [0u8; MAX_DATAGRAM_BYTES];
        if let Ok(addr) = socket.local_addr() {
            tracing::info!("scale listener on {addr}");
        }

        loop {
            let (len, source) = tokio::select! {
                received = socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(err) => {
                        tracing::warn!("scale socket receive failed: {err}");
                        continue;
                    }
                },
                _ = shutdown.triggered() => {
                    tracing::info!("scale listener shutting down");
                    break;
                }
            };

            let (sample, now) = match self.admit(&buf[..len], source) {
                Ok(Some(admitted)) => admitted,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!("{err}");
                    continue;
                }
            };

            let stored = sample.clone();
            match self
                .store
                .blocking(move |store| store.append(&stored))
                .await
            {
                Ok(_) => self.accepted(&sample, now, source),
                Err(err) => tracing::error!("failed to store weight sample: {err}"),
            }
        }
    }
}

/// Bind a broadcast-capable UDP socket for the scale listener.
///
/// # Errors
/// Returns an error if the address cannot be bound.
pub async fn bind_scale_socket(addr: &str) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind(addr).await?;
    socket.set_broadcast(true)?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::service::shutdown_channel;
    use chrono::TimeZone;

    fn sender() -> SocketAddr {
        "192.168.1.40:6000".parse().unwrap()
    }

    fn ingestor(
        store: &Arc<MeasurementStore>,
        clock: &Arc<ManualClock>,
    ) -> ScaleIngestor<Arc<ManualClock>> {
        ScaleIngestor::with_clock(
            Arc::clone(store),
            &ScaleConfig::default(),
            LocalZone::utc(),
            Arc::clone(clock),
        )
    }

    #[test]
    fn retransmissions_inside_quiet_window_are_dropped() {
        let store = Arc::new(MeasurementStore::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 0).unwrap(),
        ));
        let mut scale = ingestor(&store, &clock);

        let mut accepted = 0;
        for offset in [0, 5, 40, 65] {
            clock.set(Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 0).unwrap() + chrono::Duration::seconds(offset));
            if scale.on_datagram(b"scale,72.5'", sender()).unwrap().is_some() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 2);
        let samples = store.weight_samples_with_ids(None).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].sample.timestamp.to_string(), "2024-03-10 07:31:05");
    }

    #[test]
    fn exactly_one_window_later_is_still_a_duplicate() {
        let store = Arc::new(MeasurementStore::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 0).unwrap()));
        let mut scale = ingestor(&store, &clock);

        assert!(scale.on_datagram(b"scale,72.5", sender()).unwrap().is_some());
        clock.advance(chrono::Duration::seconds(60));
        assert!(scale.on_datagram(b"scale,72.5", sender()).unwrap().is_none());
        clock.advance(chrono::Duration::milliseconds(1));
        assert!(scale.on_datagram(b"scale,72.5", sender()).unwrap().is_some());
    }

    #[test]
    fn malformed_payload_does_not_move_the_window() {
        let store = Arc::new(MeasurementStore::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 0).unwrap()));
        let mut scale = ingestor(&store, &clock);

        let err = scale.on_datagram(b"garbage", sender()).unwrap_err();
        assert!(matches!(err, CoreError::Ingest(IngestError::MalformedPayload { .. })));

        let sample = scale.on_datagram(b"scale,80.25'", sender()).unwrap().unwrap();
        assert_eq!(sample.value_grams, 80_250.0);
        assert_eq!(sample.subject_id, "default");
    }

    #[test]
    fn timestamp_is_local_wall_clock_to_the_second() {
        let store = Arc::new(MeasurementStore::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 15).unwrap() + chrono::Duration::milliseconds(750),
        ));
        let config = ScaleConfig {
            subject_id: "richard".into(),
            ..ScaleConfig::default()
        };
        let mut scale = ScaleIngestor::with_clock(
            Arc::clone(&store),
            &config,
            LocalZone::from_offset_minutes(Some(60)).unwrap(),
            Arc::clone(&clock),
        );

        let sample = scale.on_datagram(b"s,70", sender()).unwrap().unwrap();
        assert_eq!(sample.timestamp.to_string(), "2024-03-11 00:30:15");
        assert_eq!(sample.subject_id, "richard");
    }

    #[tokio::test]
    async fn listen_keeps_running_after_a_failed_write() {
        let store = Arc::new(MeasurementStore::open_in_memory().unwrap());
        let socket = bind_scale_socket("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (trigger, shutdown) = shutdown_channel();

        let scale = ScaleIngestor::new(Arc::clone(&store), &ScaleConfig::default(), LocalZone::utc());
        let task = tokio::spawn(scale.listen(socket, shutdown));
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        store.set_read_only(true);
        client.send_to(b"scale,72.5'", addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.count::<WeightSample>().unwrap(), 0);

        // The failed write did not start a quiet window.
        store.set_read_only(false);
        client.send_to(b"scale,73.0'", addr).await.unwrap();
        let mut stored = 0;
        for _ in 0..100 {
            stored = store.count::<WeightSample>().unwrap();
            if stored > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, 1);
        assert_eq!(store.all::<WeightSample>().unwrap()[0].value_grams, 73_000.0);
    }

    #[tokio::test]
    async fn listen_stores_datagrams_until_shutdown() {
        let store = Arc::new(MeasurementStore::open_in_memory().unwrap());
        let socket = bind_scale_socket("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (trigger, shutdown) = shutdown_channel();

        let scale = ScaleIngestor::new(Arc::clone(&store), &ScaleConfig::default(), LocalZone::utc());
        let task = tokio::spawn(scale.listen(socket, shutdown));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"scale,not-a-weight", addr).await.unwrap();
        client.send_to(b"scale,72.5'", addr).await.unwrap();
        client.send_to(b"scale,72.5'", addr).await.unwrap();

        let mut stored = 0;
        for _ in 0..100 {
            stored = store.count::<WeightSample>().unwrap();
            if stored > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // Give the retransmission time to arrive and be dropped.
        tokio::time::sleep(Duration::from_millis(50)).await;

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stored, 1);
        assert_eq!(store.count::<WeightSample>().unwrap(), 1);
    }
}
