// Configuration management

use crate::core::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which store backs the token cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Redis,
    Memory,
}

impl FromStr for CacheBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError(format!(
                "Invalid CACHE_BACKEND '{}': must be 'redis' or 'memory'",
                other
            ))),
        }
    }
}

impl fmt::Display for CacheBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redis => write!(f, "redis"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Application configuration loaded from environment variables
///
/// All values are validated on load with clear error messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Cache configuration
    pub cache_backend: CacheBackendKind,
    pub redis_url: String,
    pub redis_connection_timeout_secs: u64,
    pub redis_operation_timeout_ms: u64,
    pub token_cache_ttl_secs: u64,
    pub memory_cache_max_capacity: u64,

    // Registration lifecycle
    pub registration_timeout_secs: u64,
    pub registration_sweep_interval_secs: u64,

    // Key derivation
    pub pbkdf2_iterations: u32,

    // Logging configuration
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Loads a `.env` file first if one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        #[cfg(not(test))]
        {
            dotenv::dotenv().ok();
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    ///
    /// `from_env` is this with the process environment. Tests pass a map so they
    /// never race on process-wide variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let redis_url = get("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379/0".to_string());
        let cache_backend = match get("CACHE_BACKEND") {
            Some(value) => value.parse()?,
            None => CacheBackendKind::Redis,
        };

        let redis_connection_timeout_secs = match get("REDIS_CONNECTION_TIMEOUT_SECS") {
            Some(value) => parse_positive::<u64>("REDIS_CONNECTION_TIMEOUT_SECS", &value)?,
            None => Self::default_connection_timeout_secs(&redis_url),
        };

        let config = Self {
            cache_backend,
            redis_url,
            redis_connection_timeout_secs,
            redis_operation_timeout_ms: parse_or_default(&get, "REDIS_OPERATION_TIMEOUT_MS", 500)?,
            token_cache_ttl_secs: parse_or_default(&get, "TOKEN_CACHE_TTL_SECS", 600)?,
            memory_cache_max_capacity: parse_or_default(&get, "MEMORY_CACHE_MAX_CAPACITY", 10_000)?,
            registration_timeout_secs: parse_or_default(&get, "REGISTRATION_TIMEOUT_SECS", 300)?,
            registration_sweep_interval_secs: parse_or_default(&get, "REGISTRATION_SWEEP_INTERVAL_SECS", 60)?,
            pbkdf2_iterations: parse_or_default(&get, "PBKDF2_ITERATIONS", 150_000)?,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format: get("LOG_FORMAT").unwrap_or_else(|| "json".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Connection timeout when none is configured
    ///
    /// Local Redis (often behind WSL or Docker port forwarding) gets 15s, remote 5s.
    fn default_connection_timeout_secs(redis_url: &str) -> u64 {
        let is_localhost = redis_url.contains("localhost") || redis_url.contains("127.0.0.1");
        if is_localhost {
            15
        } else {
            5
        }
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_backend == CacheBackendKind::Redis {
            Self::validate_url(&self.redis_url, "Redis")?;
        }

        if self.registration_sweep_interval_secs > self.registration_timeout_secs {
            return Err(ConfigError(format!(
                "REGISTRATION_SWEEP_INTERVAL_SECS ({}) must not exceed REGISTRATION_TIMEOUT_SECS ({})",
                self.registration_sweep_interval_secs, self.registration_timeout_secs
            )));
        }

        Self::validate_log_level(&self.log_level)?;
        Self::validate_log_format(&self.log_format)?;
        Ok(())
    }

    fn validate_url(url: &str, description: &str) -> Result<(), ConfigError> {
        let parsed =
            url::Url::parse(url).map_err(|e| ConfigError(format!("Invalid {} URL '{}': {}", description, url, e)))?;

        match parsed.scheme() {
            "redis" | "rediss" => Ok(()),
            scheme => Err(ConfigError(format!(
                "Invalid {} URL '{}': unsupported scheme '{}'",
                description, url, scheme
            ))),
        }
    }

    fn validate_log_level(level: &str) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(ConfigError(format!(
                "Invalid LOG_LEVEL '{}': must be one of {}",
                level,
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }

    fn validate_log_format(format: &str) -> Result<(), ConfigError> {
        if format != "json" && format != "text" {
            return Err(ConfigError(format!(
                "Invalid LOG_FORMAT '{}': must be 'json' or 'text'",
                format
            )));
        }
        Ok(())
    }

    pub fn redis_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.redis_connection_timeout_secs)
    }

    pub fn redis_operation_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_operation_timeout_ms)
    }

    pub fn token_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.token_cache_ttl_secs)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_secs)
    }

    pub fn registration_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.registration_sweep_interval_secs)
    }
}

/// Parse a strictly positive number, naming the key in the error
fn parse_positive<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
    T::Err: fmt::Display,
{
    let parsed = value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError(format!("Invalid {} value '{}': {}", key, value, e)))?;

    if parsed == T::default() {
        return Err(ConfigError(format!("{} must be greater than 0", key)));
    }

    Ok(parsed)
}

fn parse_or_default<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default,
    T::Err: fmt::Display,
{
    match get(key) {
        Some(value) => parse_positive(key, &value),
        None => Ok(default),
    }
}

impl Config {
    /// Create a test configuration
    ///
    /// Uses the in-memory cache, short timeouts and a cheap key derivation.
    pub fn test_config() -> Self {
        Self {
            cache_backend: CacheBackendKind::Memory,
            redis_url: "redis://localhost:6379/0".to_string(),
            redis_connection_timeout_secs: 15,
            redis_operation_timeout_ms: 500,
            token_cache_ttl_secs: 600,
            memory_cache_max_capacity: 1_000,
            registration_timeout_secs: 300,
            registration_sweep_interval_secs: 60,
            pbkdf2_iterations: 1_000,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}
