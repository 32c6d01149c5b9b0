//! Address to forecast orchestration.
//!
//! `ForecastByAddress` geocodes an address, extracts its ZIP code and serves
//! the forecast for that ZIP through the cache. Known provider failures are
//! turned into `DomainError`s; the address itself is never logged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::instrument;

use crate::cache::Cache;
use crate::error::{DomainError, ForecastError, GeocodeError};
use crate::geocode::GeocodingClient;
use crate::provider::WeatherClient;
use crate::types::{Forecast, ForecastResult, Location};

/// Namespace and version for forecast cache entries.
pub const CACHE_KEY_PREFIX: &str = "weather_by_zip/v1/";

pub fn cache_key(zip_code: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, zip_code)
}

pub struct ForecastByAddress<G, W, C> {
    geocoding_client: G,
    weather_client: W,
    cache: C,
    cache_ttl: Duration,
}

impl<G, W, C> ForecastByAddress<G, W, C>
where
    G: GeocodingClient,
    W: WeatherClient,
    C: Cache<Forecast>,
{
    pub fn new(geocoding_client: G, weather_client: W, cache: C, cache_ttl: Duration) -> Self {
        Self {
            geocoding_client,
            weather_client,
            cache,
            cache_ttl,
        }
    }

    /// Resolve `address` to a ZIP-cached forecast.
    ///
    /// # Errors
    /// - `ForecastError::BlankAddress` for empty or whitespace-only input
    /// - `ForecastError::Domain` for the user-facing failure modes
    /// - `ForecastError::Weather` for weather errors outside HTTP status and
    ///   timeout, unchanged
    #[instrument(skip_all, level = "debug")]
    pub async fn call(&self, address: &str) -> Result<ForecastResult, ForecastError> {
        if address.trim().is_empty() {
            return Err(ForecastError::BlankAddress);
        }

        let location = self.geocode_address(address).await?;
        let zip_code = extract_zip(&location)?;
        let (forecast, from_cache) = self.fetch_forecast(&location, &zip_code).await?;

        Ok(ForecastResult {
            zip_code,
            forecast,
            from_cache,
        })
    }

    async fn geocode_address(&self, address: &str) -> Result<Location, DomainError> {
        match self.geocoding_client.geocode(address).await {
            Ok(location) => Ok(location),
            Err(GeocodeError::NotFound) => Err(DomainError::AddressNotFound),
            Err(err) => {
                tracing::error!(kind = err.kind(), "[ForecastByAddress] Geocoding error");
                Err(DomainError::ForecastUnavailable)
            }
        }
    }

    async fn fetch_forecast(
        &self,
        location: &Location,
        zip_code: &str,
    ) -> Result<(Forecast, bool), ForecastError> {
        let produced = AtomicBool::new(false);
        let flag = &produced;
        let weather = &self.weather_client;
        let (lat, lng) = (location.latitude, location.longitude);

        let result = self
            .cache
            .fetch_or_compute(&cache_key(zip_code), self.cache_ttl, move || async move {
                flag.store(true, Ordering::SeqCst);
                weather.fetch_by_coordinates(lat, lng).await
            })
            .await;

        match result {
            Ok(forecast) => Ok((forecast, !produced.load(Ordering::SeqCst))),
            Err(err) if err.is_provider_failure() => {
                tracing::error!(kind = err.kind(), "[ForecastByAddress] Weather error");
                Err(DomainError::ForecastUnavailable.into())
            }
            Err(err) => Err(ForecastError::Weather(err)),
        }
    }
}

fn extract_zip(location: &Location) -> Result<String, DomainError> {
    location
        .postal_code
        .as_deref()
        .map(str::trim)
        .filter(|zip| !zip.is_empty())
        .map(str::to_string)
        .ok_or(DomainError::ZipCodeUnavailable)
}
