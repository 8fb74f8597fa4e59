//! Weather collector daemon.
//!
//! This crate focuses on:
//! - Logging bootstrap
//! - Loading configuration from the environment
//! - Signal handling and graceful shutdown
//! - Wiring the source, broker and loop together

use anyhow::Context;
use collector_core::broker::amqp::AmqpTransport;
use collector_core::source::open_meteo::OpenMeteoSource;
use collector_core::{BrokerConnection, CollectorLoop, Config};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    info!("starting weather collector");
    info!(
        location = %config.location_name,
        latitude = config.latitude,
        longitude = config.longitude,
        "collection target"
    );
    info!(
        secs = config.collection_interval.as_secs(),
        "collection interval"
    );

    let source = OpenMeteoSource::new(&config);
    let broker = BrokerConnection::new(Box::new(AmqpTransport), &config);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            signal_token.cancel();
        }
    });

    let collector = CollectorLoop::new(
        Box::new(source),
        broker,
        config.collection_interval,
        shutdown,
    );

    collector
        .run()
        .await
        .context("could not establish initial broker connection")?;

    Ok(())
}
