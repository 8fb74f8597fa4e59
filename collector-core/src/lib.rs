//! Core library for the weather collector daemon.
//!
//! This crate defines:
//! - Environment-sourced configuration
//! - The normalized weather record and condition mapping
//! - The Open-Meteo source behind the [`WeatherSource`] seam
//! - The broker connection lifecycle (retry, reconnect, publish)
//! - The collection loop tying it all together
//!
//! It is used by `collector-daemon`, but can also be reused by other
//! binaries or services.

pub mod broker;
pub mod collector;
pub mod config;
pub mod model;
pub mod source;

pub use broker::{BrokerConnection, ConnectError, PublishError, PublishOutcome};
pub use collector::CollectorLoop;
pub use config::Config;
pub use model::{Condition, WeatherRecord};
pub use source::{FetchError, WeatherSource};
