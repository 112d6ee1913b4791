//! Session controller configuration.
//!
//! Loaded from environment variables with defaults matching the reference
//! cadence: one tick per second, three join announcements over the first
//! three seconds, a 3 second join probe.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default tick cadence in milliseconds.
pub const DEFAULT_TICK_MS: u64 = 1000;

/// Default host heartbeat interval in milliseconds.
pub const DEFAULT_HEARTBEAT_MS: u64 = 5000;

/// Default join re-announcement schedule, offsets from attach in milliseconds.
pub const DEFAULT_JOIN_BURSTS_MS: [u64; 3] = [0, 1000, 3000];

/// Default join-validation probe timeout in milliseconds.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3000;

/// Default interval between probe publications in milliseconds.
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 500;

/// Default time a half-built link waits before re-sending its description.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 2000;

/// Default per-tick probability of a simulated posture event.
pub const DEFAULT_POSTURE_EVENT_PROBABILITY: f64 = 0.02;

/// Default share of posture events flagged severe rather than slouching.
pub const DEFAULT_SEVERE_POSTURE_SHARE: f64 = 0.25;

/// Default per-tick probability of a simulated toxicity event.
pub const DEFAULT_TOXICITY_PROBABILITY: f64 = 0.01;

/// Session controller configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Cadence of the cognitive/alert/moderation tick loop.
    pub tick_interval: Duration,

    /// Interval between host heartbeats.
    pub heartbeat_interval: Duration,

    /// Offsets (from attaching to the relay) at which `join` is announced.
    pub join_burst_offsets: Vec<Duration>,

    /// How long the join probe keeps trying before failing closed.
    pub probe_timeout: Duration,

    /// Spacing between repeated probe publications.
    pub probe_interval: Duration,

    /// How long a link may sit in `offering` or `answering` before the local
    /// description and candidates are re-sent. A link that exhausts its
    /// re-sends is treated as a transport failure.
    pub handshake_timeout: Duration,

    /// Per-tick probability that a remote participant's posture degrades.
    pub posture_event_probability: f64,

    /// Share of posture events recorded as severe.
    pub severe_posture_share: f64,

    /// Per-tick probability that a remote participant trips the toxicity filter.
    pub toxicity_probability: f64,

    /// Fixed seed for simulated signals, for reproducible runs.
    pub simulation_seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            join_burst_offsets: DEFAULT_JOIN_BURSTS_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            probe_interval: Duration::from_millis(DEFAULT_PROBE_INTERVAL_MS),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            posture_event_probability: DEFAULT_POSTURE_EVENT_PROBABILITY,
            severe_posture_share: DEFAULT_SEVERE_POSTURE_SHARE,
            toxicity_probability: DEFAULT_TOXICITY_PROBABILITY,
            simulation_seed: None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl SessionConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let join_burst_offsets = match vars.get("SESSION_JOIN_BURSTS_MS") {
            Some(raw) => parse_burst_schedule(raw)?,
            None => defaults.join_burst_offsets,
        };

        let simulation_seed = match vars.get("SESSION_SIMULATION_SEED") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|e| {
                invalid("SESSION_SIMULATION_SEED", format!("'{raw}' is not a u64: {e}"))
            })?),
            None => None,
        };

        Ok(Self {
            tick_interval: millis(vars, "SESSION_TICK_MS", DEFAULT_TICK_MS)?,
            heartbeat_interval: millis(vars, "SESSION_HEARTBEAT_MS", DEFAULT_HEARTBEAT_MS)?,
            join_burst_offsets,
            probe_timeout: millis(vars, "SESSION_PROBE_TIMEOUT_MS", DEFAULT_PROBE_TIMEOUT_MS)?,
            probe_interval: millis(vars, "SESSION_PROBE_INTERVAL_MS", DEFAULT_PROBE_INTERVAL_MS)?,
            handshake_timeout: millis(
                vars,
                "SESSION_HANDSHAKE_TIMEOUT_MS",
                DEFAULT_HANDSHAKE_TIMEOUT_MS,
            )?,
            posture_event_probability: probability(
                vars,
                "SESSION_POSTURE_EVENT_PROBABILITY",
                DEFAULT_POSTURE_EVENT_PROBABILITY,
            )?,
            severe_posture_share: probability(
                vars,
                "SESSION_SEVERE_POSTURE_SHARE",
                DEFAULT_SEVERE_POSTURE_SHARE,
            )?,
            toxicity_probability: probability(
                vars,
                "SESSION_TOXICITY_PROBABILITY",
                DEFAULT_TOXICITY_PROBABILITY,
            )?,
            simulation_seed,
        })
    }
}

fn invalid(name: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        reason,
    }
}

/// Parse a positive millisecond duration, falling back to `default`.
fn millis(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let Some(raw) = vars.get(name) else {
        return Ok(Duration::from_millis(default));
    };

    let value: u64 = raw
        .trim()
        .parse()
        .map_err(|e| invalid(name, format!("'{raw}' is not a positive integer: {e}")))?;

    if value == 0 {
        return Err(invalid(name, "must be greater than 0".to_string()));
    }

    Ok(Duration::from_millis(value))
}

fn probability(
    vars: &HashMap<String, String>,
    name: &str,
    default: f64,
) -> Result<f64, ConfigError> {
    let Some(raw) = vars.get(name) else {
        return Ok(default);
    };

    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|e| invalid(name, format!("'{raw}' is not a number: {e}")))?;

    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(name, format!("must be within [0, 1], got {value}")));
    }

    Ok(value)
}

/// Parse a comma separated, non-decreasing list of millisecond offsets.
fn parse_burst_schedule(raw: &str) -> Result<Vec<Duration>, ConfigError> {
    const NAME: &str = "SESSION_JOIN_BURSTS_MS";

    let mut offsets = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let ms: u64 = part
            .parse()
            .map_err(|e| invalid(NAME, format!("'{part}' is not an integer: {e}")))?;
        offsets.push(Duration::from_millis(ms));
    }

    if offsets.is_empty() {
        return Err(invalid(NAME, "at least one offset is required".to_string()));
    }

    if offsets.windows(2).any(|w| matches!(w, [a, b] if b < a)) {
        return Err(invalid(NAME, "offsets must be non-decreasing".to_string()));
    }

    Ok(offsets)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = SessionConfig::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.probe_timeout, Duration::from_secs(3));
        assert_eq!(config.handshake_timeout, Duration::from_secs(2));
        assert_eq!(
            config.join_burst_offsets,
            vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(3)
            ]
        );
        assert!(config.simulation_seed.is_none());
    }

    #[test]
    fn test_custom_values() {
        let config = SessionConfig::from_vars(&vars(&[
            ("SESSION_TICK_MS", "250"),
            ("SESSION_JOIN_BURSTS_MS", "0, 200,600"),
            ("SESSION_TOXICITY_PROBABILITY", "0.5"),
            ("SESSION_SIMULATION_SEED", "42"),
        ]))
        .unwrap();

        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.join_burst_offsets.len(), 3);
        assert_eq!(config.join_burst_offsets[1], Duration::from_millis(200));
        assert!((config.toxicity_probability - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.simulation_seed, Some(42));
    }

    #[test]
    fn test_zero_tick_rejected() {
        let result = SessionConfig::from_vars(&vars(&[("SESSION_TICK_MS", "0")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { name, .. }) if name == "SESSION_TICK_MS"
        ));
    }

    #[test]
    fn test_handshake_timeout_override_and_zero_rejected() {
        let config =
            SessionConfig::from_vars(&vars(&[("SESSION_HANDSHAKE_TIMEOUT_MS", "750")])).unwrap();
        assert_eq!(config.handshake_timeout, Duration::from_millis(750));

        let result = SessionConfig::from_vars(&vars(&[("SESSION_HANDSHAKE_TIMEOUT_MS", "0")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { name, .. }) if name == "SESSION_HANDSHAKE_TIMEOUT_MS"
        ));
    }

    #[test]
    fn test_probability_out_of_range_rejected() {
        let result =
            SessionConfig::from_vars(&vars(&[("SESSION_POSTURE_EVENT_PROBABILITY", "1.5")]));
        assert!(result.is_err());

        let result = SessionConfig::from_vars(&vars(&[("SESSION_SEVERE_POSTURE_SHARE", "abc")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_burst_schedule_validation() {
        assert!(SessionConfig::from_vars(&vars(&[("SESSION_JOIN_BURSTS_MS", "")])).is_err());
        assert!(SessionConfig::from_vars(&vars(&[("SESSION_JOIN_BURSTS_MS", "500,100")])).is_err());
        assert!(SessionConfig::from_vars(&vars(&[("SESSION_JOIN_BURSTS_MS", "0,x")])).is_err());
    }
}
