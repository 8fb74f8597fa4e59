use crate::model::WeatherRecord;
use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

pub mod open_meteo;

/// Errors a single fetch can produce. Neither variant is fatal to the
/// collector: the caller skips the cycle and the next tick retries.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure or non-success HTTP status.
    #[error("weather api request failed: {0}")]
    Network(String),
    /// Response body was not the JSON shape we expect.
    #[error("failed to parse weather api response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A source of current weather observations for one fixed point.
#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    async fn fetch(&self) -> Result<WeatherRecord, FetchError>;
}

/// Keep error messages readable when the API returns an HTML error page.
fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    // MAX may land inside a multi-byte character; back up to a boundary
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
