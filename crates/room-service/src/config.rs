//! Room service configuration.
//!
//! Configuration is loaded from environment variables. The store URL can
//! embed credentials and is held as a [`SecretString`], so it is redacted in
//! Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Default room store URL.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Default room lifetime in seconds (one hour).
pub const DEFAULT_ROOM_TTL_SECONDS: u64 = 3600;

/// Default number of code draws before room creation gives up.
pub const DEFAULT_ROOM_CODE_MAX_ATTEMPTS: u32 = 10;

/// Default join attempts allowed per origin per window.
pub const DEFAULT_JOIN_RATE_LIMIT: u32 = 10;

/// Default join throttle window in seconds.
pub const DEFAULT_JOIN_RATE_WINDOW_SECONDS: u64 = 60;

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Which room store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    /// Process-local store, for development and tests.
    Memory,
}

/// Room service configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// Room store URL. Redacted in Debug output.
    pub redis_url: SecretString,

    /// Room store backend.
    pub store_backend: StoreBackend,

    /// How long a room code resolves after creation.
    pub room_ttl: Duration,

    /// Code draws attempted before reporting the registry unavailable.
    pub room_code_max_attempts: u32,

    /// Join attempts allowed per origin per window.
    pub join_rate_limit: u32,

    /// Join throttle window.
    pub join_rate_window: Duration,

    /// Per-request timeout.
    pub request_timeout: Duration,

    /// Whether to install the Prometheus recorder and serve `/metrics`.
    pub metrics_enabled: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("redis_url", &"[REDACTED]")
            .field("store_backend", &self.store_backend)
            .field("room_ttl", &self.room_ttl)
            .field("room_code_max_attempts", &self.room_code_max_attempts)
            .field("join_rate_limit", &self.join_rate_limit)
            .field("join_rate_window", &self.join_rate_window)
            .field("request_timeout", &self.request_timeout)
            .field("metrics_enabled", &self.metrics_enabled)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let redis_url = SecretString::from(
            vars.get("REDIS_URL")
                .cloned()
                .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
        );

        let store_backend = match vars.get("ROOM_STORE").map(|v| v.trim().to_ascii_lowercase()) {
            None => StoreBackend::Redis,
            Some(v) if v == "redis" => StoreBackend::Redis,
            Some(v) if v == "memory" => StoreBackend::Memory,
            Some(other) => {
                return Err(invalid(
                    "ROOM_STORE",
                    format!("must be 'redis' or 'memory', got '{other}'"),
                ))
            }
        };

        let metrics_enabled = match vars.get("METRICS_ENABLED") {
            None => true,
            Some(raw) => raw.trim().parse::<bool>().map_err(|e| {
                invalid("METRICS_ENABLED", format!("'{raw}' is not a bool: {e}"))
            })?,
        };

        Ok(Self {
            bind_address,
            redis_url,
            store_backend,
            room_ttl: Duration::from_secs(positive(
                vars,
                "ROOM_TTL_SECONDS",
                DEFAULT_ROOM_TTL_SECONDS,
            )?),
            room_code_max_attempts: positive(
                vars,
                "ROOM_CODE_MAX_ATTEMPTS",
                DEFAULT_ROOM_CODE_MAX_ATTEMPTS,
            )?,
            join_rate_limit: positive(vars, "JOIN_RATE_LIMIT", DEFAULT_JOIN_RATE_LIMIT)?,
            join_rate_window: Duration::from_secs(positive(
                vars,
                "JOIN_RATE_WINDOW_SECONDS",
                DEFAULT_JOIN_RATE_WINDOW_SECONDS,
            )?),
            request_timeout: Duration::from_secs(positive(
                vars,
                "REQUEST_TIMEOUT_SECONDS",
                DEFAULT_REQUEST_TIMEOUT_SECONDS,
            )?),
            metrics_enabled,
        })
    }
}

fn invalid(name: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        reason,
    }
}

/// Parse a strictly positive integer variable, or take `default` when unset.
fn positive<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: fmt::Display,
{
    let Some(raw) = vars.get(name) else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<T>()
        .map_err(|e| invalid(name, format!("'{raw}' is not a number: {e}")))?;
    if value <= T::default() {
        return Err(invalid(name, "must be greater than 0".to_string()));
    }
    Ok(value)
}
