//! Address to weather forecast lookup.
//!
//! Geocodes a free-form address, derives its ZIP code and serves the
//! OpenWeather forecast for that ZIP through a TTL cache.

pub mod cache;
pub mod error;
pub mod forecast;
pub mod geocode;
pub mod provider;
pub mod types;

pub use cache::{Cache, MemoryCache};
pub use error::{DomainError, ForecastError, GeocodeError, WeatherError};
pub use forecast::{cache_key, ForecastByAddress, CACHE_KEY_PREFIX};
pub use geocode::{
    ConfiguredProvider, GeocodeCandidate, Geocoder, GeocodingClient, GeocodingProvider,
    GoogleProvider, NominatimProvider,
};
pub use provider::{OpenWeatherClient, WeatherClient, EXTENDED_FORECAST_DAYS};
pub use types::*;
