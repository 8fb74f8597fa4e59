use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One normalized weather observation, ready for publication.
///
/// Built once at fetch time and never mutated afterwards; the queue message
/// body is exactly the JSON serialization of this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "location")]
    pub location_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub precipitation: f64,
    pub weather_code: i64,
    pub condition: Condition,
}

/// Human-readable category derived from a WMO weather code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Clear,
    PartlyCloudy,
    Foggy,
    Rainy,
    Snowy,
    Stormy,
    Unknown,
}

impl Condition {
    /// Map a numeric weather code to its condition label.
    ///
    /// Total over all integers: any code outside the listed ranges is
    /// `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Condition::Clear,
            1..=3 => Condition::PartlyCloudy,
            45 | 48 => Condition::Foggy,
            51 | 53 | 55 | 61 | 63 | 65 | 80 | 81 | 82 => Condition::Rainy,
            71 | 73 | 75 | 77 | 85 | 86 => Condition::Snowy,
            95 | 96 | 99 => Condition::Stormy,
            _ => Condition::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Clear => "clear",
            Condition::PartlyCloudy => "partly_cloudy",
            Condition::Foggy => "foggy",
            Condition::Rainy => "rainy",
            Condition::Snowy => "snowy",
            Condition::Stormy => "stormy",
            Condition::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
