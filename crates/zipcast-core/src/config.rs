use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Environment variable holding the Google geocoding key.
pub const GEOCODING_API_KEY_ENV: &str = "GOOGLE_GEOCODING_API_KEY";
/// Environment variable holding the OpenWeather key.
pub const WEATHER_API_KEY_ENV: &str = "OPENWEATHER_API_KEY";
/// Environment variable pointing at an alternate config file.
pub const CONFIG_PATH_ENV: &str = "ZIPCAST_CONFIG";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address lookup settings
    #[serde(default)]
    pub geocoding: GeocodingConfig,

    /// Weather provider settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Forecast caching settings
    #[serde(default)]
    pub forecasts: ForecastsConfig,
}

/// Which geocoding service answers address lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GeocodingProviderKind {
    #[default]
    Google,
    Nominatim,
}

impl GeocodingProviderKind {
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::Google)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    #[serde(default)]
    pub provider: GeocodingProviderKind,

    /// API key; `GOOGLE_GEOCODING_API_KEY` overrides the file value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override for the provider's endpoint (the provider default is used when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_geocoding_timeout")]
    pub timeout_seconds: u64,
}

impl GeocodingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            provider: GeocodingProviderKind::default(),
            api_key: None,
            endpoint: None,
            timeout_seconds: default_geocoding_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// OneCall endpoint URL
    #[serde(default = "default_weather_endpoint")]
    pub endpoint: String,

    /// API key; `OPENWEATHER_API_KEY` overrides the file value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_weather_timeout")]
    pub timeout_seconds: u64,
}

impl WeatherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// The configured API key.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingSetting` when no non-empty key is configured.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingSetting("weather.api_key".to_string()))
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            endpoint: default_weather_endpoint(),
            api_key: None,
            timeout_seconds: default_weather_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastsConfig {
    /// How long a forecast stays cached per ZIP code, in minutes
    #[serde(default = "default_cache_ttl_minutes")]
    pub cache_ttl_minutes: u64,
}

impl ForecastsConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes.saturating_mul(60))
    }
}

impl Default for ForecastsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_minutes: default_cache_ttl_minutes(),
        }
    }
}

fn default_geocoding_timeout() -> u64 {
    15
}

fn default_weather_endpoint() -> String {
    "https://api.openweathermap.org/data/3.0/onecall".to_string()
}

fn default_weather_timeout() -> u64 {
    5
}

fn default_cache_ttl_minutes() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geocoding: GeocodingConfig::default(),
            weather: WeatherConfig::default(),
            forecasts: ForecastsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `config_path()`, falling back to defaults
    /// when no file exists. API keys are always taken from the environment
    /// when set there.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// `$ZIPCAST_CONFIG` when set, otherwise `<config dir>/zipcast/config.toml`.
    pub fn config_path() -> Result<PathBuf> {
        Self::resolve_path(|name| std::env::var(name).ok())
    }

    fn resolve_path<F>(lookup: F) -> Result<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("zipcast");

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from an explicit file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str::<Config>(&contents)
                .map_err(|e| ConfigError::ParseError(e.to_string()))
                .context("Failed to parse config file")?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Replace API keys with values from the given lookup (normally the process
    /// environment). Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(GEOCODING_API_KEY_ENV) {
            self.geocoding.api_key = Some(key);
        }
        if let Some(key) = non_empty(WEATHER_API_KEY_ENV) {
            self.weather.api_key = Some(key);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_url(&self.weather.endpoint, "weather.endpoint", &mut result);
        if let Some(endpoint) = &self.geocoding.endpoint {
            Self::validate_url(endpoint, "geocoding.endpoint", &mut result);
        }

        if self.weather.require_api_key().is_err() {
            result.add_error(
                "weather.api_key",
                format!("Weather API key is required (set {})", WEATHER_API_KEY_ENV),
            );
        }

        let geocoding_key_missing = self
            .geocoding
            .api_key
            .as_deref()
            .map_or(true, |k| k.trim().is_empty());
        if self.geocoding.provider.requires_api_key() && geocoding_key_missing {
            result.add_error(
                "geocoding.api_key",
                format!(
                    "Geocoding API key is required for this provider (set {})",
                    GEOCODING_API_KEY_ENV
                ),
            );
        }

        Self::validate_timeout(self.geocoding.timeout_seconds, "geocoding.timeout_seconds", &mut result);
        Self::validate_timeout(self.weather.timeout_seconds, "weather.timeout_seconds", &mut result);

        if self.forecasts.cache_ttl_minutes == 0 {
            result.add_warning(
                "forecasts.cache_ttl_minutes",
                "Forecast caching disabled (0 minutes)",
            );
        } else if self.forecasts.cache_ttl_minutes > 1440 {
            result.add_warning(
                "forecasts.cache_ttl_minutes",
                "Forecast cache TTL is more than 24 hours",
            );
        }

        result
    }

    fn validate_timeout(seconds: u64, field_name: &str, result: &mut ValidationResult) {
        if seconds == 0 {
            result.add_error(field_name, "Timeout must be greater than 0");
        } else if seconds > 300 {
            result.add_warning(field_name, "Timeout is unusually large (>300 seconds)");
        }
    }

    /// Validate a URL field
    fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn configured() -> Config {
        let mut config = Config::default();
        config.geocoding.api_key = Some("geo-key".to_string());
        config.weather.api_key = Some("weather-key".to_string());
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.geocoding.provider, GeocodingProviderKind::Google);
        assert_eq!(config.geocoding.timeout(), Duration::from_secs(15));
        assert_eq!(config.weather.timeout(), Duration::from_secs(5));
        assert_eq!(
            config.weather.endpoint,
            "https://api.openweathermap.org/data/3.0/onecall"
        );
        assert_eq!(config.forecasts.cache_ttl(), Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_configured_defaults_are_valid() {
        let result = configured().validate();
        assert!(result.is_valid(), "Config should be valid: {:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_missing_api_keys_are_errors() {
        let result = Config::default().validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "weather.api_key"));
        assert!(result.errors.iter().any(|e| e.field == "geocoding.api_key"));
    }

    #[test]
    fn test_nominatim_does_not_need_geocoding_key() {
        let mut config = configured();
        config.geocoding.provider = GeocodingProviderKind::Nominatim;
        config.geocoding.api_key = None;
        assert!(config.validate().is_valid());
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = configured();
        config.weather.endpoint = "ftp://example.com/onecall".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_invalid_geocoding_endpoint() {
        let mut config = configured();
        config.geocoding.endpoint = Some("not-a-url".to_string());
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "geocoding.endpoint"));
    }

    #[test]
    fn test_zero_timeout_is_error_and_zero_ttl_is_warning() {
        let mut config = configured();
        config.weather.timeout_seconds = 0;
        config.forecasts.cache_ttl_minutes = 0;
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "weather.timeout_seconds"));
        assert!(result
            .warnings
            .iter()
            .any(|w| w.field == "forecasts.cache_ttl_minutes"));
    }

    #[test]
    fn test_env_overrides_replace_keys() {
        let mut config = Config::default();
        config.weather.api_key = Some("from-file".to_string());
        config.apply_env_overrides(|name| match name {
            WEATHER_API_KEY_ENV => Some("from-env".to_string()),
            GEOCODING_API_KEY_ENV => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(config.weather.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.geocoding.api_key, None);
    }

    #[test]
    fn test_require_api_key() {
        let mut weather = WeatherConfig::default();
        assert!(matches!(
            weather.require_api_key(),
            Err(ConfigError::MissingSetting(_))
        ));
        weather.api_key = Some("abc".to_string());
        assert_eq!(weather.require_api_key().unwrap(), "abc");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[geocoding]
provider = "nominatim"
timeout_seconds = 7

[weather]
endpoint = "http://localhost:9000/onecall"
api_key = "file-key"

[forecasts]
cache_ttl_minutes = 10
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.geocoding.provider, GeocodingProviderKind::Nominatim);
        assert_eq!(config.geocoding.timeout_seconds, 7);
        assert_eq!(config.weather.endpoint, "http://localhost:9000/onecall");
        assert_eq!(config.weather.timeout_seconds, 5);
        assert_eq!(config.forecasts.cache_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn test_load_from_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[weather\nendpoint = ").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.forecasts.cache_ttl_minutes, 30);
    }

    #[test]
    fn test_config_path_override() {
        let path = Config::resolve_path(|name| match name {
            CONFIG_PATH_ENV => Some("/etc/zipcast/alt.toml".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(path, PathBuf::from("/etc/zipcast/alt.toml"));

        let blank = Config::resolve_path(|_| Some("  ".to_string()));
        if let Ok(path) = blank {
            assert!(path.ends_with("zipcast/config.toml"));
        }
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
