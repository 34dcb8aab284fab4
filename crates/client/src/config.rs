//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional.
//!
//! - `EMPORIUM_API_URL` - Backend base URL (default: `http://localhost:8080`)
//! - `EMPORIUM_DATA_DIR` - Directory for the persisted session (default: `.emporium`)
//! - `EMPORIUM_CATALOG_CACHE_TTL_SECS` - Catalog cache lifetime in seconds (default: 300)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Fraction of errors sent to Sentry (default: 1.0)

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:8080";
const DEFAULT_DATA_DIR: &str = ".emporium";
const DEFAULT_CATALOG_CACHE_TTL_SECS: u64 = 300;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL; the auth, product and admin services hang off it.
    pub api_base_url: Url,
    /// Directory holding the persisted session file.
    pub data_dir: PathBuf,
    /// How long category and product listings stay cached.
    pub catalog_cache_ttl: Duration,
    /// Sentry configuration; `None` disables error tracking.
    pub sentry: Option<SentryConfig>,
}

/// Sentry error tracking configuration.
#[derive(Debug, Clone)]
pub struct SentryConfig {
    /// Project DSN (contains the project key).
    pub dsn: SecretString,
    /// Environment tag attached to events.
    pub environment: Option<String>,
    /// Fraction of error events to send.
    pub sample_rate: f32,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = parse_base_url(
            "EMPORIUM_API_URL",
            &get_env_or_default("EMPORIUM_API_URL", DEFAULT_API_URL),
        )?;
        let data_dir = PathBuf::from(get_env_or_default("EMPORIUM_DATA_DIR", DEFAULT_DATA_DIR));
        let ttl_secs = get_env_or_default(
            "EMPORIUM_CATALOG_CACHE_TTL_SECS",
            &DEFAULT_CATALOG_CACHE_TTL_SECS.to_string(),
        )
        .parse::<u64>()
        .map_err(|e| {
            ConfigError::InvalidEnvVar("EMPORIUM_CATALOG_CACHE_TTL_SECS".to_string(), e.to_string())
        })?;

        Ok(Self {
            api_base_url,
            data_dir,
            catalog_cache_ttl: Duration::from_secs(ttl_secs),
            sentry: SentryConfig::from_env()?,
        })
    }

    /// Configuration pointing at `api_base_url` with every other setting at
    /// its default. Used by embedders that manage their own settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the URL cannot be parsed.
    pub fn for_base_url(api_base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_base_url: parse_base_url("api_base_url", api_base_url)?,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            catalog_cache_ttl: Duration::from_secs(DEFAULT_CATALOG_CACHE_TTL_SECS),
            sentry: None,
        })
    }

    /// Path of the persisted session file.
    #[must_use]
    pub fn session_file(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }
}

impl SentryConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(dsn) = get_optional_env("SENTRY_DSN") else {
            return Ok(None);
        };
        let sample_rate = get_env_or_default("SENTRY_SAMPLE_RATE", "1.0")
            .parse::<f32>()
            .map_err(|e| ConfigError::InvalidEnvVar("SENTRY_SAMPLE_RATE".to_string(), e.to_string()))?;
        if !(0.0..=1.0).contains(&sample_rate) {
            return Err(ConfigError::InvalidEnvVar(
                "SENTRY_SAMPLE_RATE".to_string(),
                format!("must be between 0.0 and 1.0 (got {sample_rate})"),
            ));
        }

        Ok(Some(Self {
            dsn: SecretString::from(dsn),
            environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sample_rate,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse and check a backend base URL.
fn parse_base_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    if url.host_str().is_none() {
        return Err(ConfigError::MissingEnvVar(format!("{key} host")));
    }
    Ok(url)
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}
