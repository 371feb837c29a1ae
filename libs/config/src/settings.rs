//! Settings loading
//!
//! Reads the flat, environment-style keys (`MIN_CONNECTIONS`,
//! `RATE_LIMIT_RPS`, ...) from an optional TOML file and the process
//! environment, then validates them into typed [`Settings`]. Environment
//! values override the file.

use crate::defaults;
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Errors raised while loading or validating settings
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

impl From<config_crate::ConfigError> for ConfigError {
    fn from(err: config_crate::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

/// Which reverse geocoding backend to call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Public, rate-limited service (Nominatim)
    Public,
    /// Self-hosted service without a throughput cap (Photon)
    Local,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" | "nominatim" => Ok(ProviderKind::Public),
            "local" | "photon" => Ok(ProviderKind::Local),
            other => Err(ConfigError::invalid(
                "PROVIDER",
                format!("expected `public` or `local`, got `{}`", other),
            )),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Public => write!(f, "public"),
            ProviderKind::Local => write!(f, "local"),
        }
    }
}

/// Connection pool settings
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    pub min_connections: usize,
    pub max_connections: usize,
    pub backend_dsn: String,
    pub acquire_timeout: Duration,
    pub health_check_on_acquire: bool,
}

/// Reverse geocoding settings
#[derive(Debug, Clone, PartialEq)]
pub struct LookupSettings {
    pub enabled: bool,
    pub provider: ProviderKind,
    /// Overrides the provider's default base URL
    pub provider_url: Option<String>,
    pub user_agent: String,
    pub call_timeout: Duration,
    /// Budget for a whole lookup, including the wait for a rate slot
    pub lookup_timeout: Duration,
    /// Requests per second; `<= 0` means unlimited
    pub rate_limit_rps: f64,
    pub cache_ttl: Duration,
    pub cache_key_precision: u32,
    pub cache_sweep_interval: Duration,
}

/// Complete process settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub pool: PoolSettings,
    pub lookup: LookupSettings,
}

/// Flat key/value shape as it appears in the environment
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawSettings {
    min_connections: i64,
    max_connections: i64,
    backend_dsn: String,
    acquire_timeout: f64,
    health_check_on_acquire: bool,

    lookup_enabled: bool,
    provider: String,
    provider_url: Option<String>,
    provider_user_agent: String,
    call_timeout_sec: f64,
    lookup_timeout_sec: f64,
    rate_limit_rps: f64,
    cache_ttl_sec: i64,
    cache_key_precision: i64,
    cache_sweep_interval_sec: i64,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            min_connections: defaults::pool::MIN_CONNECTIONS as i64,
            max_connections: defaults::pool::MAX_CONNECTIONS as i64,
            backend_dsn: defaults::pool::BACKEND_DSN.to_string(),
            acquire_timeout: defaults::pool::ACQUIRE_TIMEOUT_SECS,
            health_check_on_acquire: defaults::pool::HEALTH_CHECK_ON_ACQUIRE,

            lookup_enabled: defaults::lookup::ENABLED,
            provider: defaults::lookup::PROVIDER.to_string(),
            provider_url: None,
            provider_user_agent: defaults::lookup::USER_AGENT.to_string(),
            call_timeout_sec: defaults::lookup::CALL_TIMEOUT_SECS,
            lookup_timeout_sec: defaults::lookup::LOOKUP_TIMEOUT_SECS,
            rate_limit_rps: defaults::lookup::RATE_LIMIT_RPS,
            cache_ttl_sec: defaults::lookup::CACHE_TTL_SECS as i64,
            cache_key_precision: defaults::lookup::CACHE_KEY_PRECISION as i64,
            cache_sweep_interval_sec: defaults::lookup::CACHE_SWEEP_INTERVAL_SECS as i64,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        use defaults::{lookup, pool};

        Self {
            pool: PoolSettings {
                min_connections: pool::MIN_CONNECTIONS,
                max_connections: pool::MAX_CONNECTIONS,
                backend_dsn: pool::BACKEND_DSN.to_string(),
                acquire_timeout: Duration::from_secs_f64(pool::ACQUIRE_TIMEOUT_SECS),
                health_check_on_acquire: pool::HEALTH_CHECK_ON_ACQUIRE,
            },
            lookup: LookupSettings {
                enabled: lookup::ENABLED,
                provider: ProviderKind::Public,
                provider_url: None,
                user_agent: lookup::USER_AGENT.to_string(),
                call_timeout: Duration::from_secs_f64(lookup::CALL_TIMEOUT_SECS),
                lookup_timeout: Duration::from_secs_f64(lookup::LOOKUP_TIMEOUT_SECS),
                rate_limit_rps: lookup::RATE_LIMIT_RPS,
                cache_ttl: Duration::from_secs(lookup::CACHE_TTL_SECS),
                cache_key_precision: lookup::CACHE_KEY_PRECISION,
                cache_sweep_interval: Duration::from_secs(lookup::CACHE_SWEEP_INTERVAL_SECS),
            },
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file overlaid with the process
    /// environment
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = file {
            info!("Loading settings file: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(Environment::default().try_parsing(true));
        Self::build(builder.build()?)
    }

    /// Load settings from the process environment only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load settings from an explicit key/value map, as if it were the
    /// environment
    pub fn from_map(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(Environment::default().source(Some(vars)).try_parsing(true))
            .build()?;
        Self::build(config)
    }

    fn build(config: Config) -> Result<Self, ConfigError> {
        let raw: RawSettings = config.try_deserialize()?;
        let settings = raw.validate()?;
        debug!(?settings, "Settings loaded");
        Ok(settings)
    }
}

impl RawSettings {
    fn validate(self) -> Result<Settings, ConfigError> {
        if self.max_connections < 1 {
            return Err(ConfigError::invalid("MAX_CONNECTIONS", "must be at least 1"));
        }
        if self.min_connections < 0 {
            return Err(ConfigError::invalid("MIN_CONNECTIONS", "must not be negative"));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::invalid(
                "MIN_CONNECTIONS",
                format!(
                    "{} exceeds MAX_CONNECTIONS ({})",
                    self.min_connections, self.max_connections
                ),
            ));
        }
        if !self.rate_limit_rps.is_finite() {
            return Err(ConfigError::invalid("RATE_LIMIT_RPS", "must be a finite number"));
        }
        if self.rate_limit_rps > 0.0 && 1.0 / self.rate_limit_rps > defaults::MAX_DURATION_SECS {
            return Err(ConfigError::invalid(
                "RATE_LIMIT_RPS",
                format!(
                    "interval between requests exceeds {} seconds",
                    defaults::MAX_DURATION_SECS
                ),
            ));
        }
        if self.cache_key_precision < 0
            || self.cache_key_precision > defaults::lookup::MAX_CACHE_KEY_PRECISION as i64
        {
            return Err(ConfigError::invalid(
                "CACHE_KEY_PRECISION",
                format!(
                    "must be between 0 and {}",
                    defaults::lookup::MAX_CACHE_KEY_PRECISION
                ),
            ));
        }

        let provider = self.provider.parse::<ProviderKind>()?;
        let provider_url = match self.provider_url {
            Some(url) if !url.trim().is_empty() => Some(expand("PROVIDER_URL", &url)?),
            _ => None,
        };

        Ok(Settings {
            pool: PoolSettings {
                min_connections: self.min_connections as usize,
                max_connections: self.max_connections as usize,
                backend_dsn: expand("BACKEND_DSN", &self.backend_dsn)?,
                acquire_timeout: positive_secs("ACQUIRE_TIMEOUT", self.acquire_timeout)?,
                health_check_on_acquire: self.health_check_on_acquire,
            },
            lookup: LookupSettings {
                enabled: self.lookup_enabled,
                provider,
                provider_url,
                user_agent: self.provider_user_agent,
                call_timeout: positive_secs("CALL_TIMEOUT_SEC", self.call_timeout_sec)?,
                lookup_timeout: positive_secs("LOOKUP_TIMEOUT_SEC", self.lookup_timeout_sec)?,
                rate_limit_rps: self.rate_limit_rps,
                cache_ttl: positive_secs("CACHE_TTL_SEC", self.cache_ttl_sec as f64)?,
                cache_key_precision: self.cache_key_precision as u32,
                cache_sweep_interval: positive_secs(
                    "CACHE_SWEEP_INTERVAL_SEC",
                    self.cache_sweep_interval_sec as f64,
                )?,
            },
        })
    }
}

fn positive_secs(key: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    if !(secs > 0.0) {
        return Err(ConfigError::invalid(key, "must be greater than zero"));
    }
    if secs > defaults::MAX_DURATION_SECS {
        return Err(ConfigError::invalid(
            key,
            format!("must not exceed {} seconds", defaults::MAX_DURATION_SECS),
        ));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::invalid(key, e.to_string()))
}

/// Expand `$VAR` / `${VAR}` references in connection strings
fn expand(key: &'static str, value: &str) -> Result<String, ConfigError> {
    shellexpand::env(value)
        .map(|expanded| expanded.into_owned())
        .map_err(|e| ConfigError::invalid(key, e.to_string()))
}
