//! Secret types for credentials that must never reach the logs.
//!
//! Re-exports [`secrecy`]. The store endpoint handed to the stage controller
//! usually embeds an auth token (`wss://…?auth=…`), so configuration keeps it
//! as a [`SecretString`] and only exposes it at the point of connecting.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct StoreEndpoint {
//!     root: String,
//!     url: SecretString,
//! }
//!
//! let endpoint = StoreEndpoint {
//!     root: "event".to_string(),
//!     url: SecretString::from("wss://store.example/?auth=abc123"),
//! };
//!
//! assert!(!format!("{endpoint:?}").contains("abc123"));
//! assert!(endpoint.url.expose_secret().ends_with("abc123"));
//! ```

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("memory://?auth=hunter2");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_deserialize_store_credentials() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct StoreCredentials {
            root: String,
            url: SecretString,
        }

        let json = r#"{"root": "event", "url": "wss://store/?auth=token-value"}"#;
        let creds: StoreCredentials = serde_json::from_str(json).expect("deserialize");

        assert_eq!(creds.url.expose_secret(), "wss://store/?auth=token-value");
        assert!(!format!("{creds:?}").contains("token-value"));
    }
}
