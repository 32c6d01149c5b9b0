//! OpenWeather OneCall 3.0 client.
//!
//! Validates coordinates, performs the request and maps the JSON body into a
//! `Forecast`. HTTP status failures and timeouts become `WeatherError::Status`
//! and `WeatherError::Timeout`; every other failure is `Unexpected`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;
use zipcast_core::{NetworkError, ReqwestErrorExt, WeatherConfig};

use crate::error::WeatherError;
use crate::types::{DailyForecast, Forecast};

/// Number of days exposed in the extended forecast.
pub const EXTENDED_FORECAST_DAYS: usize = 5;

/// Weather lookup as seen by the forecast use case.
#[async_trait]
pub trait WeatherClient: Send + Sync {
    /// # Errors
    /// See `WeatherError`.
    async fn fetch_by_coordinates(&self, lat: f64, lng: f64) -> Result<Forecast, WeatherError>;
}

#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct OneCallResponse {
    /// Seconds east of UTC at the requested location
    #[serde(default)]
    timezone_offset: i64,
    current: CurrentConditions,
    daily: Vec<DailyEntry>,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temp: f64,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct DailyEntry {
    dt: i64,
    temp: DailyTemperature,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct DailyTemperature {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    #[serde(default)]
    description: String,
}

fn first_description(conditions: &[Condition]) -> String {
    conditions
        .first()
        .map(|c| c.description.clone())
        .unwrap_or_default()
}

fn local_date(dt: i64, timezone_offset: i64) -> Result<NaiveDate, WeatherError> {
    dt.checked_add(timezone_offset)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|t| t.date_naive())
        .ok_or_else(|| WeatherError::Unexpected(anyhow::anyhow!("invalid forecast timestamp {}", dt)))
}

impl OpenWeatherClient {
    pub fn new(api_key: &str, endpoint: &str, timeout: Duration) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WeatherError::Unexpected(e.into()))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            endpoint: endpoint.to_string(),
        })
    }

    pub fn from_config(config: &WeatherConfig) -> anyhow::Result<Self> {
        let api_key = config.require_api_key()?;
        Ok(Self::new(api_key, &config.endpoint, config.timeout())?)
    }

    fn validate_coordinates(lat: f64, lng: f64) -> Result<(), WeatherError> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        if valid {
            Ok(())
        } else {
            Err(WeatherError::InvalidCoordinates)
        }
    }

    fn transport_error(err: reqwest::Error) -> WeatherError {
        match err.into_network_error() {
            NetworkError::Timeout => {
                tracing::error!(kind = "timeout", "[OpenWeatherClient] request timed out");
                WeatherError::Timeout
            }
            other => WeatherError::Unexpected(other.into()),
        }
    }

    fn build_forecast(body: OneCallResponse) -> Result<Forecast, WeatherError> {
        let today = body.daily.first().ok_or_else(|| {
            WeatherError::Unexpected(anyhow::anyhow!("daily forecast list is empty"))
        })?;

        let daily = body
            .daily
            .iter()
            .take(EXTENDED_FORECAST_DAYS)
            .map(|day| {
                Ok(DailyForecast {
                    date: local_date(day.dt, body.timezone_offset)?,
                    high: day.temp.max,
                    low: day.temp.min,
                    description: first_description(&day.weather),
                })
            })
            .collect::<Result<Vec<_>, WeatherError>>()?;

        Ok(Forecast {
            current_temp: body.current.temp,
            current_description: first_description(&body.current.weather),
            today_high: today.temp.max,
            today_low: today.temp.min,
            daily,
        })
    }
}

#[async_trait]
impl WeatherClient for OpenWeatherClient {
    #[instrument(skip_all, level = "debug")]
    async fn fetch_by_coordinates(&self, lat: f64, lng: f64) -> Result<Forecast, WeatherError> {
        Self::validate_coordinates(lat, lng)?;

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lng.to_string()),
                ("units", "imperial".to_string()),
                ("exclude", "minutely,alerts".to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = status.as_u16(), "[OpenWeatherClient] HTTP error");
            return Err(WeatherError::Status(status.as_u16()));
        }

        let body: OneCallResponse = response.json().await.map_err(Self::transport_error)?;
        Self::build_forecast(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LAT: f64 = 38.6;
    const LNG: f64 = -90.5;

    fn day(dt: i64, min: f64, max: f64, description: &str) -> serde_json::Value {
        json!({
            "dt": dt,
            "temp": { "day": (min + max) / 2.0, "min": min, "max": max, "night": min },
            "weather": [{ "id": 800, "main": "Clear", "description": description, "icon": "01d" }]
        })
    }

    fn one_call_body() -> serde_json::Value {
        json!({
            "lat": LAT,
            "lon": LNG,
            "timezone": "America/Chicago",
            "timezone_offset": -18000,
            "current": {
                "dt": 1717243200,
                "temp": 72.5,
                "weather": [{ "id": 800, "main": "Clear", "description": "clear sky", "icon": "01d" }]
            },
            "hourly": [],
            "daily": [
                day(1717243200, 65.0, 78.0, "clear sky"),
                day(1717329600, 66.0, 80.0, "few clouds"),
                day(1717416000, 60.0, 75.0, "light rain"),
                day(1717502400, 58.0, 70.0, "moderate rain"),
                day(1717588800, 61.0, 77.0, "scattered clouds"),
                day(1717675200, 63.0, 79.0, "broken clouds"),
                day(1717761600, 64.0, 81.0, "clear sky")
            ]
        })
    }

    fn client_for(server: &MockServer, timeout: Duration) -> OpenWeatherClient {
        OpenWeatherClient::new("test-api-key", &format!("{}/onecall", server.uri()), timeout)
            .unwrap()
    }

    #[tokio::test]
    async fn test_maps_current_and_daily() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/onecall"))
            .and(query_param("lat", "38.6"))
            .and(query_param("lon", "-90.5"))
            .and(query_param("units", "imperial"))
            .and(query_param("exclude", "minutely,alerts"))
            .and(query_param("appid", "test-api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(one_call_body()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let forecast = client_for(&mock_server, Duration::from_secs(2))
            .fetch_by_coordinates(LAT, LNG)
            .await
            .unwrap();

        assert_eq!(forecast.current_temp, 72.5);
        assert_eq!(forecast.current_description, "clear sky");
        assert_eq!(forecast.today_high, 78.0);
        assert_eq!(forecast.today_low, 65.0);

        assert_eq!(forecast.daily.len(), EXTENDED_FORECAST_DAYS);
        let descriptions: Vec<&str> = forecast
            .daily
            .iter()
            .map(|d| d.description.as_str())
            .collect();
        assert_eq!(
            descriptions,
            vec!["clear sky", "few clouds", "light rain", "moderate rain", "scattered clouds"]
        );
        assert_eq!(
            forecast.daily[0].date,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );
        assert_eq!(
            forecast.daily[4].date,
            NaiveDate::from_ymd_opt(2024, 6, 5).unwrap()
        );
        assert_eq!(forecast.daily[2].high, 75.0);
        assert_eq!(forecast.daily[2].low, 60.0);
    }

    #[test]
    fn test_dates_use_location_offset() {
        // 2024-06-01T03:00:00Z is still May 31st seven hours west of UTC
        assert_eq!(
            local_date(1717210800, -25200).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap()
        );
        assert_eq!(
            local_date(1717210800, 0).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );
    }

    #[test]
    fn test_short_daily_list_and_missing_descriptions() {
        let body: OneCallResponse = serde_json::from_value(json!({
            "current": { "temp": 50.0 },
            "daily": [{ "dt": 1717243200, "temp": { "min": 40.0, "max": 55.0 } }]
        }))
        .unwrap();

        let forecast = OpenWeatherClient::build_forecast(body).unwrap();
        assert_eq!(forecast.current_description, "");
        assert_eq!(forecast.daily.len(), 1);
        assert_eq!(forecast.daily[0].description, "");
        assert_eq!(forecast.today_high, 55.0);
    }

    #[tokio::test]
    async fn test_invalid_coordinates_skip_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(one_call_body()))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server, Duration::from_secs(2));
        for (lat, lng) in [(f64::NAN, LNG), (LAT, f64::NAN), (91.0, LNG), (LAT, -181.0)] {
            let err = client.fetch_by_coordinates(lat, lng).await.unwrap_err();
            assert!(matches!(err, WeatherError::InvalidCoordinates));
            assert_eq!(err.to_string(), "latitude/longitude must be present");
        }
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server, Duration::from_secs(2))
            .fetch_by_coordinates(LAT, LNG)
            .await
            .unwrap_err();

        assert!(matches!(err, WeatherError::Status(500)));
        assert!(err.to_string().contains("Weather API error"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(one_call_body())
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server, Duration::from_millis(50))
            .fetch_by_coordinates(LAT, LNG)
            .await
            .unwrap_err();

        assert!(matches!(err, WeatherError::Timeout));
        assert_eq!(err.to_string(), "Weather API timeout");
    }

    #[tokio::test]
    async fn test_malformed_body_is_unexpected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "current": {} })))
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server, Duration::from_secs(2))
            .fetch_by_coordinates(LAT, LNG)
            .await
            .unwrap_err();

        assert!(matches!(err, WeatherError::Unexpected(_)));
        assert!(!err.is_provider_failure());
    }

    #[tokio::test]
    async fn test_empty_daily_is_unexpected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "current": { "temp": 70.0, "weather": [] },
                "daily": []
            })))
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server, Duration::from_secs(2))
            .fetch_by_coordinates(LAT, LNG)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "unexpected");
    }

    #[test]
    fn test_from_config_requires_key() {
        let mut config = WeatherConfig::default();
        assert!(OpenWeatherClient::from_config(&config).is_err());

        config.api_key = Some("key".to_string());
        assert!(OpenWeatherClient::from_config(&config).is_ok());
    }
}
