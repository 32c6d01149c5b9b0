use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Geocoded position of an address.
///
/// A missing postal code is a legitimate lookup outcome; the forecast use case
/// decides whether that is fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub postal_code: Option<String>,
}

/// Single-day forecast entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub high: f64,
    pub low: f64,
    pub description: String,
}

/// Current conditions, today's range and the extended outlook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub current_temp: f64,
    pub current_description: String,
    pub today_high: f64,
    pub today_low: f64,
    /// Chronological, starting today
    pub daily: Vec<DailyForecast>,
}

/// Outcome of a forecast lookup keyed by ZIP code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub zip_code: String,
    pub forecast: Forecast,
    /// True when the forecast was served without calling the weather provider
    pub from_cache: bool,
}
