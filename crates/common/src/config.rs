//! Logging configuration shared by the Cortex binaries.

use crate::error::CommonError;
use std::collections::HashMap;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, one line per event
    Pretty,
    /// One JSON object per event, for log shippers
    Json,
}

/// Observability configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directives (e.g. `room_service=debug,tower_http=info`)
    pub log_filter: String,
    /// Formatter selection
    pub log_format: LogFormat,
}

impl ObservabilityConfig {
    /// Read `RUST_LOG` and `LOG_FORMAT`, falling back to `default_filter`.
    ///
    /// # Errors
    ///
    /// Returns [`CommonError::Configuration`] if `LOG_FORMAT` is not
    /// `pretty` or `json`.
    pub fn from_vars(
        vars: &HashMap<String, String>,
        default_filter: &str,
    ) -> Result<Self, CommonError> {
        let log_filter = vars
            .get("RUST_LOG")
            .cloned()
            .unwrap_or_else(|| default_filter.to_string());

        let log_format = match vars.get("LOG_FORMAT").map(|v| v.to_ascii_lowercase()) {
            None => LogFormat::Pretty,
            Some(v) if v == "pretty" => LogFormat::Pretty,
            Some(v) if v == "json" => LogFormat::Json,
            Some(other) => {
                return Err(CommonError::Configuration(format!(
                    "LOG_FORMAT must be 'pretty' or 'json', got '{other}'"
                )))
            }
        };

        Ok(Self {
            log_filter,
            log_format,
        })
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns [`CommonError::Configuration`] if the filter directives do not
/// parse or a subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), CommonError> {
    let filter = EnvFilter::try_new(&config.log_filter).map_err(|e| {
        CommonError::Configuration(format!("invalid log filter '{}': {e}", config.log_filter))
    })?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| {
        CommonError::Configuration(format!("failed to install tracing subscriber: {e}"))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_when_unset() {
        let config = ObservabilityConfig::from_vars(&HashMap::new(), "cortex=debug").unwrap();
        assert_eq!(config.log_filter, "cortex=debug");
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_json_format_is_case_insensitive() {
        let vars = HashMap::from([
            ("LOG_FORMAT".to_string(), "JSON".to_string()),
            ("RUST_LOG".to_string(), "info".to_string()),
        ]);
        let config = ObservabilityConfig::from_vars(&vars, "debug").unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_unknown_format_rejected() {
        let vars = HashMap::from([("LOG_FORMAT".to_string(), "xml".to_string())]);
        let err = ObservabilityConfig::from_vars(&vars, "debug").unwrap_err();
        assert!(err.to_string().contains("LOG_FORMAT"));
    }
}
