//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports [`secrecy`] types. Connection strings for the room store embed
//! credentials (`redis://:password@host`), so configuration holds them as
//! [`SecretString`] and any `{:?}` of a config struct prints `[REDACTED]`.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct StoreSettings {
//!     backend: String,
//!     url: SecretString,
//! }
//!
//! let settings = StoreSettings {
//!     backend: "redis".to_string(),
//!     url: SecretString::from("redis://:hunter2@localhost:6379"),
//! };
//!
//! assert!(!format!("{settings:?}").contains("hunter2"));
//! let url: &str = settings.url.expose_secret();
//! assert!(url.starts_with("redis://"));
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("redis://:hunter2@cache:6379");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("redis://localhost:6379");
        assert_eq!(secret.expose_secret(), "redis://localhost:6379");
    }

    #[test]
    fn test_deserialize_keeps_value_hidden() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct StoreSettings {
            backend: String,
            url: SecretString,
        }

        let json = r#"{"backend": "redis", "url": "redis://:pw-123@cache"}"#;
        let settings: StoreSettings = serde_json::from_str(json).expect("deserialize");

        assert_eq!(settings.url.expose_secret(), "redis://:pw-123@cache");

        let debug = format!("{settings:?}");
        assert!(debug.contains("redis"));
        assert!(!debug.contains("pw-123"));
    }
}
