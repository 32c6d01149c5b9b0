//! Error types for geocoding, weather retrieval and the forecast use case.
//!
//! Provider-level errors (`GeocodeError`, `WeatherError`) stay inside this
//! crate's clients. The use case translates the known ones into
//! `DomainError`, whose messages are safe to show to a user verbatim.

use thiserror::Error;

/// Geocoding client errors.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("No geocoding results")]
    NotFound,

    /// Any other lookup failure. Only the failure category is retained so the
    /// address and provider payload cannot leak through this error.
    #[error("Geocoding failed")]
    Failed { category: &'static str },
}

impl GeocodeError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Failed { category } => *category,
        }
    }
}

/// Weather client errors.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("latitude/longitude must be present")]
    InvalidCoordinates,

    #[error("Weather API error (status {0})")]
    Status(u16),

    #[error("Weather API timeout")]
    Timeout,

    /// Failures outside the known provider failure modes (connection refused,
    /// malformed body, ...). These are not recategorized by the use case.
    #[error("Unexpected weather client failure: {0}")]
    Unexpected(#[source] anyhow::Error),
}

impl WeatherError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCoordinates => "invalid_coordinates",
            Self::Status(_) => "http_status",
            Self::Timeout => "timeout",
            Self::Unexpected(_) => "unexpected",
        }
    }

    /// Whether this is a known provider failure mode that the use case
    /// normalizes into a domain error.
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, Self::Status(_) | Self::Timeout)
    }
}

/// User-safe error crossing the forecast use case boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Unable to find that address.")]
    AddressNotFound,

    #[error("Unable to determine ZIP code for that address.")]
    ZipCodeUnavailable,

    /// Shared by geocoding and weather infrastructure failures.
    #[error("Error retrieving forecast.")]
    ForecastUnavailable,
}

impl DomainError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::AddressNotFound => "Unable to find that address.",
            Self::ZipCodeUnavailable => "Unable to determine ZIP code for that address.",
            Self::ForecastUnavailable => "Error retrieving forecast.",
        }
    }
}

/// Everything `ForecastByAddress::call` can return.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Caller passed a blank address.
    #[error("address must be present")]
    BlankAddress,

    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Weather errors outside the normalized set, passed through unchanged.
    #[error(transparent)]
    Weather(WeatherError),
}

impl ForecastError {
    /// Message suitable for showing to the person who typed the address.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BlankAddress => "Please enter an address.",
            Self::Domain(e) => e.user_message(),
            Self::Weather(_) => DomainError::ForecastUnavailable.user_message(),
        }
    }

    pub fn as_domain(&self) -> Option<DomainError> {
        match self {
            Self::Domain(e) => Some(*e),
            _ => None,
        }
    }
}
