use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::model::WeatherRecord;

pub mod amqp;

/// Attempt budget for one `connect()` call.
pub const CONNECT_ATTEMPTS: u32 = 5;
/// Delay between consecutive connection attempts.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Transport-level failure reported by a [`BrokerTransport`] implementation.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Broker unreachable after the whole retry budget. Fatal at startup;
/// during publish it degrades to [`PublishError::Reconnect`].
#[derive(Debug, Error)]
#[error("broker unreachable after {attempts} attempts: {last}")]
pub struct ConnectError {
    pub attempts: u32,
    #[source]
    pub last: TransportError,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The implicit reconnect before sending exhausted its retry budget.
    #[error("reconnect before publish failed: {0}")]
    Reconnect(#[source] ConnectError),
    /// The broker rejected or dropped the message. A reconnect was already
    /// attempted for the next cycle; this message is gone.
    #[error("publish rejected, reconnect attempted: {0}")]
    Rejected(#[source] TransportError),
}

/// Distinguishes a clean send from one that needed a repair first, so
/// callers and tests can observe the implicit reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    SentAfterReconnect,
}

/// Dials the broker and declares the durable queue, yielding a channel to
/// publish on. Implemented over AMQP in production, mocked in tests.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        queue: &str,
    ) -> Result<Box<dyn BrokerChannel>, TransportError>;
}

/// An open path to the queue.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), TransportError>;
    fn is_open(&self) -> bool;
    async fn close(&mut self);
}

/// Owns the lifecycle of the queue connection.
///
/// `channel` doubles as the state machine: `None` is Disconnected, `Some`
/// is Connected. Every transition goes through [`connect`](Self::connect),
/// [`publish`](Self::publish) or [`close`](Self::close).
pub struct BrokerConnection {
    transport: Box<dyn BrokerTransport>,
    url: String,
    queue: String,
    channel: Option<Box<dyn BrokerChannel>>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl BrokerConnection {
    pub fn new(transport: Box<dyn BrokerTransport>, config: &Config) -> Self {
        Self {
            transport,
            url: config.broker_url.clone(),
            queue: config.queue_name.clone(),
            channel: None,
            max_attempts: CONNECT_ATTEMPTS,
            retry_delay: CONNECT_RETRY_DELAY,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| c.is_open())
    }

    /// Establish a connection and ensure the durable queue exists.
    ///
    /// Up to `max_attempts` tries spaced by `retry_delay`; individual
    /// failures are logged, only exhaustion is an error.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        let mut last = None;

        for attempt in 1..=self.max_attempts {
            info!(attempt, max = self.max_attempts, "connecting to broker");

            match self.transport.connect(&self.url, &self.queue).await {
                Ok(channel) => {
                    self.channel = Some(channel);
                    info!(queue = %self.queue, "connected to broker");
                    return Ok(());
                }
                Err(e) => {
                    error!(attempt, error = %e, "failed to connect to broker");
                    last = Some(e);
                    if attempt < self.max_attempts {
                        info!(
                            delay_secs = self.retry_delay.as_secs(),
                            "retrying broker connection"
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        self.channel = None;
        Err(ConnectError {
            attempts: self.max_attempts,
            last: last
                .unwrap_or_else(|| TransportError("no connection attempts were made".to_string())),
        })
    }

    /// Serialize the record and send it to the queue.
    ///
    /// A missing or closed channel triggers exactly one implicit
    /// [`connect`](Self::connect) first. A failed send drops the message,
    /// tears the channel down and makes one best-effort reconnect so the
    /// next tick starts from a healthy state.
    pub async fn publish(
        &mut self,
        record: &WeatherRecord,
    ) -> Result<PublishOutcome, PublishError> {
        let payload = serde_json::to_vec(record)?;

        let mut reconnected = false;
        if !self.is_connected() {
            warn!("broker connection lost, reconnecting before publish");
            self.connect().await.map_err(PublishError::Reconnect)?;
            reconnected = true;
        }

        let sent = match &self.channel {
            Some(channel) => channel.publish(&self.queue, &payload).await,
            // connect() either stored a channel or returned above
            None => Err(TransportError("not connected".to_string())),
        };

        match sent {
            Ok(()) => {
                info!(queue = %self.queue, "weather record published");
                if reconnected {
                    Ok(PublishOutcome::SentAfterReconnect)
                } else {
                    Ok(PublishOutcome::Sent)
                }
            }
            Err(e) => {
                error!(queue = %self.queue, error = %e, "failed to publish to queue");
                self.channel = None;
                if let Err(reconnect_err) = self.connect().await {
                    error!(error = %reconnect_err, "reconnect after publish failure failed");
                }
                Err(PublishError::Rejected(e))
            }
        }
    }

    /// Release the connection if open. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
            info!("broker connection closed");
        }
    }
}
