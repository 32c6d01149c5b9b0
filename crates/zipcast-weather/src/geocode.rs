//! Forward geocoding: turn free-form address text into a `Location`.
//!
//! The lookup itself is delegated to a `GeocodingProvider` (Google or
//! Nominatim). `Geocoder` takes the first candidate, derives its postal code
//! and hides every provider failure behind `GeocodeError`. Nothing in this
//! module logs the address being looked up.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;
use zipcast_core::{
    ConfigError, GeocodingConfig, GeocodingProviderKind, NetworkError, ReqwestErrorExt,
};

use crate::error::GeocodeError;
use crate::types::Location;

pub const GOOGLE_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
pub const NOMINATIM_SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";
const USER_AGENT: &str = concat!("zipcast/", env!("CARGO_PKG_VERSION"));

/// A single hit returned by a geocoding provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeCandidate {
    pub latitude: f64,
    pub longitude: f64,
    /// Postal code when the provider exposes it as a first-class field
    pub postal_code: Option<String>,
    /// Raw provider result
    pub data: Value,
}

/// Provider lookup capability. Errors are opaque to callers.
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    async fn search(&self, address: &str) -> anyhow::Result<Vec<GeocodeCandidate>>;
}

/// Address lookup as seen by the forecast use case.
#[async_trait]
pub trait GeocodingClient: Send + Sync {
    /// # Errors
    /// `GeocodeError::NotFound` when the provider has no match,
    /// `GeocodeError::Failed` for any other failure.
    async fn geocode(&self, address: &str) -> Result<Location, GeocodeError>;
}

#[derive(Debug, Error)]
enum ProviderError {
    #[error("geocoding provider returned status {0}")]
    Status(String),

    #[error("malformed geocoding result: missing {0}")]
    Malformed(&'static str),
}

/// Map an opaque provider failure to a category that is safe to log.
fn failure_category(err: &anyhow::Error) -> &'static str {
    if let Some(network) = err.downcast_ref::<NetworkError>() {
        network.category()
    } else if let Some(provider) = err.downcast_ref::<ProviderError>() {
        match provider {
            ProviderError::Status(_) => "provider_status",
            ProviderError::Malformed(_) => "malformed_result",
        }
    } else {
        "provider_error"
    }
}

/// Postal code for a candidate: the direct field first, then the
/// `address_components` entry tagged `postal_code`.
pub fn postal_code_for(candidate: &GeocodeCandidate) -> Option<String> {
    if let Some(code) = candidate
        .postal_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        return Some(code.to_string());
    }

    candidate
        .data
        .get("address_components")?
        .as_array()?
        .iter()
        .find(|component| {
            component
                .get("types")
                .and_then(Value::as_array)
                .is_some_and(|types| types.iter().any(|t| t.as_str() == Some("postal_code")))
        })?
        .get("long_name")?
        .as_str()
        .map(str::to_string)
}

/// `GeocodingClient` backed by a provider.
pub struct Geocoder<P> {
    provider: P,
}

impl<P: GeocodingProvider> Geocoder<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: GeocodingProvider> GeocodingClient for Geocoder<P> {
    #[instrument(skip_all, level = "debug")]
    async fn geocode(&self, address: &str) -> Result<Location, GeocodeError> {
        let candidates = self.provider.search(address).await.map_err(|e| {
            let category = failure_category(&e);
            tracing::error!(kind = category, "[Geocoder] lookup failed");
            GeocodeError::Failed { category }
        })?;

        let first = candidates.into_iter().next().ok_or(GeocodeError::NotFound)?;
        let postal_code = postal_code_for(&first);

        Ok(Location {
            latitude: first.latitude,
            longitude: first.longitude,
            postal_code,
        })
    }
}

fn http_client(timeout: Duration) -> anyhow::Result<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

/// Parse the leading result only. Later entries are never consulted, so a
/// malformed trailing result cannot fail an otherwise good lookup.
fn first_candidate<F>(results: Vec<Value>, parse: F) -> anyhow::Result<Vec<GeocodeCandidate>>
where
    F: FnOnce(Value) -> anyhow::Result<GeocodeCandidate>,
{
    Ok(results.into_iter().next().map(parse).transpose()?.into_iter().collect())
}

fn coordinate(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Google Geocoding API.
pub struct GoogleProvider {
    client: Client,
    api_key: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    status: String,
    #[serde(default)]
    results: Vec<Value>,
}

impl GoogleProvider {
    pub fn new(api_key: &str, endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.to_string(),
            endpoint: endpoint.to_string(),
        })
    }

    fn candidate(result: Value) -> anyhow::Result<GeocodeCandidate> {
        let latitude = result
            .pointer("/geometry/location/lat")
            .and_then(coordinate)
            .ok_or(ProviderError::Malformed("geometry.location.lat"))?;
        let longitude = result
            .pointer("/geometry/location/lng")
            .and_then(coordinate)
            .ok_or(ProviderError::Malformed("geometry.location.lng"))?;

        Ok(GeocodeCandidate {
            latitude,
            longitude,
            postal_code: None,
            data: result,
        })
    }
}

#[async_trait]
impl GeocodingProvider for GoogleProvider {
    #[instrument(skip_all, level = "debug")]
    async fn search(&self, address: &str) -> anyhow::Result<Vec<GeocodeCandidate>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::ServerError {
                status: status.as_u16(),
                message: "geocoding request failed".to_string(),
            }
            .into());
        }

        let body: GoogleResponse = response
            .json()
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;

        match body.status.as_str() {
            "OK" => first_candidate(body.results, Self::candidate),
            "ZERO_RESULTS" => Ok(Vec::new()),
            other => Err(ProviderError::Status(other.to_string()).into()),
        }
    }
}

/// OpenStreetMap Nominatim search.
pub struct NominatimProvider {
    client: Client,
    endpoint: String,
}

impl NominatimProvider {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: endpoint.to_string(),
        })
    }

    fn candidate(place: Value) -> anyhow::Result<GeocodeCandidate> {
        let latitude = place
            .get("lat")
            .and_then(coordinate)
            .ok_or(ProviderError::Malformed("lat"))?;
        let longitude = place
            .get("lon")
            .and_then(coordinate)
            .ok_or(ProviderError::Malformed("lon"))?;
        let postal_code = place
            .pointer("/address/postcode")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(GeocodeCandidate {
            latitude,
            longitude,
            postal_code,
            data: place,
        })
    }
}

#[async_trait]
impl GeocodingProvider for NominatimProvider {
    #[instrument(skip_all, level = "debug")]
    async fn search(&self, address: &str) -> anyhow::Result<Vec<GeocodeCandidate>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", address),
                ("format", "jsonv2"),
                ("addressdetails", "1"),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::ServerError {
                status: status.as_u16(),
                message: "geocoding request failed".to_string(),
            }
            .into());
        }

        let places: Vec<Value> = response
            .json()
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;

        first_candidate(places, Self::candidate)
    }
}

/// Provider chosen by `geocoding.provider` in the config.
pub enum ConfiguredProvider {
    Google(GoogleProvider),
    Nominatim(NominatimProvider),
}

impl ConfiguredProvider {
    pub fn from_config(config: &GeocodingConfig) -> anyhow::Result<Self> {
        match config.provider {
            GeocodingProviderKind::Google => {
                let api_key = config
                    .api_key
                    .as_deref()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| ConfigError::MissingSetting("geocoding.api_key".to_string()))?;
                let endpoint = config.endpoint.as_deref().unwrap_or(GOOGLE_GEOCODE_URL);
                Ok(Self::Google(GoogleProvider::new(
                    api_key,
                    endpoint,
                    config.timeout(),
                )?))
            }
            GeocodingProviderKind::Nominatim => {
                let endpoint = config.endpoint.as_deref().unwrap_or(NOMINATIM_SEARCH_URL);
                Ok(Self::Nominatim(NominatimProvider::new(
                    endpoint,
                    config.timeout(),
                )?))
            }
        }
    }
}

#[async_trait]
impl GeocodingProvider for ConfiguredProvider {
    async fn search(&self, address: &str) -> anyhow::Result<Vec<GeocodeCandidate>> {
        match self {
            Self::Google(provider) => provider.search(address).await,
            Self::Nominatim(provider) => provider.search(address).await,
        }
    }
}
