use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::broker::{BrokerConnection, ConnectError, PublishOutcome};
use crate::source::WeatherSource;

/// Drives the fetch-normalize-publish cycle at a fixed interval.
///
/// Strictly serial: fetch, then publish, then sleep. The sleep is the only
/// suspension point and is interruptible by the shutdown token. The broker
/// connection is closed exactly once on every exit path.
pub struct CollectorLoop {
    source: Box<dyn WeatherSource>,
    broker: BrokerConnection,
    interval: Duration,
    shutdown: CancellationToken,
}

impl CollectorLoop {
    pub fn new(
        source: Box<dyn WeatherSource>,
        broker: BrokerConnection,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            broker,
            interval,
            shutdown,
        }
    }

    /// Run until cancelled. The only error is the fatal startup failure to
    /// reach the broker; everything after that is logged and survived.
    pub async fn run(mut self) -> Result<(), ConnectError> {
        let result = self.run_inner().await;
        self.broker.close().await;
        result
    }

    async fn run_inner(&mut self) -> Result<(), ConnectError> {
        self.broker.connect().await?;

        loop {
            if self.shutdown.is_cancelled() {
                info!("shutdown requested, stopping collector");
                return Ok(());
            }

            self.tick().await;

            info!(
                secs = self.interval.as_secs(),
                "waiting until next collection"
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("shutdown requested, stopping collector");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// One collection cycle. Failures skip the cycle; the next tick retries
    /// naturally.
    async fn tick(&mut self) {
        let record = match self.source.fetch().await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "fetch failed, skipping this cycle");
                return;
            }
        };

        match self.broker.publish(&record).await {
            Ok(PublishOutcome::Sent) => {}
            Ok(PublishOutcome::SentAfterReconnect) => {
                info!("record published after broker reconnect");
            }
            Err(e) => {
                error!(error = %e, "publish failed, record dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerChannel, BrokerTransport, TransportError};
    use crate::config::Config;
    use crate::model::{Condition, WeatherRecord};
    use crate::source::FetchError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn record(weather_code: i64) -> WeatherRecord {
        WeatherRecord {
            timestamp: Utc::now(),
            location_name: "New York".to_string(),
            latitude: 40.7128,
            longitude: -74.0060,
            temperature: Some(18.4),
            humidity: Some(72.0),
            wind_speed: Some(9.7),
            precipitation: 1.2,
            weather_code,
            condition: Condition::from_code(weather_code),
        }
    }

    /// Source that cancels the shutdown token on its n-th fetch, so loop
    /// tests terminate deterministically under paused time.
    #[derive(Debug)]
    struct ScriptedSource {
        record: WeatherRecord,
        fail_on: Vec<u32>,
        cancel_on: u32,
        fetches: Arc<AtomicU32>,
        shutdown: CancellationToken,
    }

    #[async_trait]
    impl WeatherSource for ScriptedSource {
        async fn fetch(&self) -> Result<WeatherRecord, FetchError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.cancel_on {
                self.shutdown.cancel();
            }
            if self.fail_on.contains(&n) {
                return Err(FetchError::Network("request timed out".to_string()));
            }
            Ok(self.record.clone())
        }
    }

    #[derive(Default)]
    struct QueueState {
        published: Mutex<Vec<Vec<u8>>>,
        connects: AtomicU32,
        closed: AtomicU32,
    }

    struct QueueTransport {
        state: Arc<QueueState>,
        reachable: bool,
    }

    #[async_trait]
    impl BrokerTransport for QueueTransport {
        async fn connect(
            &self,
            _url: &str,
            _queue: &str,
        ) -> Result<Box<dyn BrokerChannel>, TransportError> {
            self.state.connects.fetch_add(1, Ordering::SeqCst);
            if !self.reachable {
                return Err(TransportError("connection refused".to_string()));
            }
            Ok(Box::new(QueueChannel {
                state: Arc::clone(&self.state),
            }))
        }
    }

    struct QueueChannel {
        state: Arc<QueueState>,
    }

    #[async_trait]
    impl BrokerChannel for QueueChannel {
        async fn publish(&self, _queue: &str, payload: &[u8]) -> Result<(), TransportError> {
            self.state.published.lock().unwrap().push(payload.to_vec());
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }

        async fn close(&mut self) {
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        state: Arc<QueueState>,
        fetches: Arc<AtomicU32>,
        source: ScriptedSource,
        shutdown: CancellationToken,
        broker: BrokerConnection,
    }

    fn harness(weather_code: i64, fail_on: Vec<u32>, cancel_on: u32) -> Harness {
        let shutdown = CancellationToken::new();
        let state = Arc::new(QueueState::default());
        let fetches = Arc::new(AtomicU32::new(0));
        let broker = BrokerConnection::new(
            Box::new(QueueTransport {
                state: Arc::clone(&state),
                reachable: true,
            }),
            &Config::default(),
        );
        let source = ScriptedSource {
            record: record(weather_code),
            fail_on,
            cancel_on,
            fetches: Arc::clone(&fetches),
            shutdown: shutdown.clone(),
        };
        Harness {
            state,
            fetches,
            source,
            shutdown,
            broker,
        }
    }

    fn collector(h: Harness) -> (CollectorLoop, Arc<QueueState>, Arc<AtomicU32>) {
        let Harness {
            state,
            fetches,
            source,
            shutdown,
            broker,
        } = h;
        (
            CollectorLoop::new(
                Box::new(source),
                broker,
                Duration::from_secs(60),
                shutdown,
            ),
            state,
            fetches,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn published_record_round_trips_with_condition() {
        let (collector, state, _) = collector(harness(61, vec![], 1));

        collector.run().await.expect("startup connect succeeds");

        let published = state.published.lock().unwrap();
        assert_eq!(published.len(), 1);

        let body: WeatherRecord = serde_json::from_slice(&published[0]).unwrap();
        assert_eq!(body.condition, Condition::Rainy);
        assert_eq!(body.location_name, "New York");
        assert_eq!(body.latitude, 40.7128);
        assert_eq!(body.longitude, -74.0060);
        assert_eq!(state.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_skips_cycle_and_loop_survives() {
        let (collector, state, fetches) = collector(harness(0, vec![1], 2));

        collector.run().await.unwrap();

        // first cycle failed and published nothing; second cycle recovered
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        let published = state.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(state.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_loop_and_closes_once() {
        let (collector, state, fetches) = collector(harness(0, vec![], 1));

        collector.run().await.unwrap();

        // cancellation is observed at the sleep; no second cycle runs
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(state.published.lock().unwrap().len(), 1);
        assert_eq!(state.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_before_first_tick_skips_fetch_and_publish() {
        let h = harness(0, vec![], u32::MAX);
        h.shutdown.cancel();
        let (collector, state, fetches) = collector(h);

        collector.run().await.unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 0);
        assert!(state.published.lock().unwrap().is_empty());
        // the startup connection was opened, so it must be closed once
        assert_eq!(state.connects.load(Ordering::SeqCst), 1);
        assert_eq!(state.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_broker_at_startup_is_fatal() {
        let shutdown = CancellationToken::new();
        let state = Arc::new(QueueState::default());
        let broker = BrokerConnection::new(
            Box::new(QueueTransport {
                state: Arc::clone(&state),
                reachable: false,
            }),
            &Config::default(),
        );
        let source = ScriptedSource {
            record: record(0),
            fail_on: vec![],
            cancel_on: u32::MAX,
            fetches: Arc::new(AtomicU32::new(0)),
            shutdown: shutdown.clone(),
        };
        let collector = CollectorLoop::new(
            Box::new(source),
            broker,
            Duration::from_secs(60),
            shutdown,
        );

        let err = collector.run().await.unwrap_err();

        assert_eq!(err.attempts, crate::broker::CONNECT_ATTEMPTS);
        assert!(state.published.lock().unwrap().is_empty());
        // nothing was opened, so nothing to close
        assert_eq!(state.closed.load(Ordering::SeqCst), 0);
    }
}
