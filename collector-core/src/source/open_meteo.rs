use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::model::{Condition, WeatherRecord};

use super::{FetchError, WeatherSource, truncate_body};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CURRENT_FIELDS: &str =
    "temperature_2m,relative_humidity_2m,precipitation,weather_code,wind_speed_10m";
const HOURLY_FIELDS: &str = "temperature_2m,precipitation_probability";

/// Current-conditions source backed by the Open-Meteo forecast API.
///
/// Stateless apart from the shared HTTP client; one `fetch` issues exactly
/// one GET and never retries (scheduling retries is the collector's job).
#[derive(Debug, Clone)]
pub struct OpenMeteoSource {
    http: Client,
    api_url: String,
    latitude: f64,
    longitude: f64,
    location_name: String,
}

impl OpenMeteoSource {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            api_url: config.api_url.clone(),
            latitude: config.latitude,
            longitude: config.longitude,
            location_name: config.location_name.clone(),
        }
    }

    /// Assemble a record from a parsed response. Pure apart from reading the
    /// clock, so edge cases around missing fields are unit-testable.
    fn record_from_current(&self, current: CurrentConditions) -> WeatherRecord {
        let weather_code = current.weather_code.unwrap_or(0);

        WeatherRecord {
            timestamp: Utc::now(),
            location_name: self.location_name.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            temperature: current.temperature_2m,
            humidity: current.relative_humidity_2m,
            wind_speed: current.wind_speed_10m,
            precipitation: current.precipitation.unwrap_or(0.0),
            weather_code,
            condition: Condition::from_code(weather_code),
        }
    }
}

/// A non-success status is a network-level failure; the body goes into the
/// error message so upstream HTML error pages stay diagnosable.
fn check_status(status: reqwest::StatusCode, body: &str) -> Result<(), FetchError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(FetchError::Network(format!(
            "status {}: {}",
            status,
            truncate_body(body),
        )))
    }
}

#[derive(Debug, Deserialize, Default)]
struct ForecastResponse {
    #[serde(default)]
    current: CurrentConditions,
}

/// The `current` object of the Open-Meteo response. Every field may be
/// absent; absence must not fail the fetch.
#[derive(Debug, Deserialize, Default)]
struct CurrentConditions {
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    precipitation: Option<f64>,
    weather_code: Option<i64>,
    wind_speed_10m: Option<f64>,
}

#[async_trait]
impl WeatherSource for OpenMeteoSource {
    async fn fetch(&self) -> Result<WeatherRecord, FetchError> {
        debug!(location = %self.location_name, "fetching current weather");

        let latitude = self.latitude.to_string();
        let longitude = self.longitude.to_string();
        let res = self
            .http
            .get(&self.api_url)
            .query(&[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("current", CURRENT_FIELDS),
                ("hourly", HOURLY_FIELDS),
                ("timezone", "auto"),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        check_status(status, &body)?;

        let parsed: ForecastResponse = serde_json::from_str(&body)?;
        let record = self.record_from_current(parsed.current);

        info!(
            condition = %record.condition,
            temperature = ?record.temperature,
            "weather data collected"
        );

        Ok(record)
    }
}
