//! Stage Controller configuration.
//!
//! Configuration is loaded from environment variables. The store URL may carry
//! an auth token and is redacted in Debug output.

use crate::roles::PrivilegedRole;
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default root path of the event in the shared store.
pub const DEFAULT_EVENT_ROOT: &str = "event";

/// Default chat display name.
pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";

/// Default heartbeat period in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u64 = 10;

/// Default countdown before a promoted fan joins the stage.
pub const DEFAULT_STAGE_COUNTDOWN_SECONDS: u64 = 5;

/// Default countdown before the event goes live.
pub const DEFAULT_GO_LIVE_COUNTDOWN_SECONDS: u64 = 5;

/// Default bind address of the `/health` and `/metrics` endpoints.
pub const DEFAULT_HTTP_BIND_ADDRESS: &str = "0.0.0.0:8090";

/// Default user id prefix.
pub const DEFAULT_USER_ID_PREFIX: &str = "sc";

/// Stage Controller configuration.
#[derive(Clone)]
pub struct Config {
    /// Privileged role this instance runs as.
    pub role: PrivilegedRole,

    /// Shared store endpoint. May embed credentials.
    pub store_url: SecretString,

    /// Root path of the event (default: "event").
    pub event_root: String,

    /// Sender id used for chat messages.
    pub user_id: String,

    /// Sender name used for chat messages (default: "Anonymous").
    pub display_name: String,

    /// Producer also publishes on stage as a host.
    pub producer_host: bool,

    /// Heartbeat period in seconds (default: 10).
    pub heartbeat_interval_seconds: u64,

    /// A presence record older than this is stale (default: the interval).
    pub heartbeat_timeout_seconds: u64,

    pub stage_countdown_seconds: u64,

    pub go_live_countdown_seconds: u64,

    /// Bind address of the operational HTTP endpoints (default: 0.0.0.0:8090).
    pub http_bind_address: SocketAddr,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("role", &self.role)
            .field("store_url", &"[REDACTED]")
            .field("event_root", &self.event_root)
            .field("user_id", &self.user_id)
            .field("display_name", &self.display_name)
            .field("producer_host", &self.producer_host)
            .field(
                "heartbeat_interval_seconds",
                &self.heartbeat_interval_seconds,
            )
            .field("heartbeat_timeout_seconds", &self.heartbeat_timeout_seconds)
            .field("stage_countdown_seconds", &self.stage_countdown_seconds)
            .field("go_live_countdown_seconds", &self.go_live_countdown_seconds)
            .field("http_bind_address", &self.http_bind_address)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
        None => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let raw_role = vars
            .get("SC_ROLE")
            .ok_or_else(|| ConfigError::MissingEnvVar("SC_ROLE".to_string()))?;
        let role = PrivilegedRole::parse(raw_role.trim())
            .ok_or_else(|| ConfigError::InvalidValue(format!("SC_ROLE={raw_role}")))?;

        let store_url = SecretString::from(
            vars.get("SC_STORE_URL")
                .ok_or_else(|| ConfigError::MissingEnvVar("SC_STORE_URL".to_string()))?
                .clone(),
        );

        let event_root = vars
            .get("SC_EVENT_ROOT")
            .cloned()
            .unwrap_or_else(|| DEFAULT_EVENT_ROOT.to_string());

        let display_name = vars
            .get("SC_DISPLAY_NAME")
            .cloned()
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

        let producer_host = parse_or(vars, "SC_PRODUCER_HOST", false)?;

        let heartbeat_interval_seconds = parse_or(
            vars,
            "SC_HEARTBEAT_INTERVAL_SECONDS",
            DEFAULT_HEARTBEAT_INTERVAL_SECONDS,
        )?;
        if heartbeat_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "SC_HEARTBEAT_INTERVAL_SECONDS must be positive".to_string(),
            ));
        }

        let heartbeat_timeout_seconds = parse_or(
            vars,
            "SC_HEARTBEAT_TIMEOUT_SECONDS",
            heartbeat_interval_seconds,
        )?;
        // A timeout below the period would expire a live holder between beats
        if heartbeat_timeout_seconds < heartbeat_interval_seconds {
            return Err(ConfigError::InvalidValue(format!(
                "SC_HEARTBEAT_TIMEOUT_SECONDS ({heartbeat_timeout_seconds}) must be at least the interval ({heartbeat_interval_seconds})"
            )));
        }

        let stage_countdown_seconds = parse_or(
            vars,
            "SC_STAGE_COUNTDOWN_SECONDS",
            DEFAULT_STAGE_COUNTDOWN_SECONDS,
        )?;

        let go_live_countdown_seconds = parse_or(
            vars,
            "SC_GO_LIVE_COUNTDOWN_SECONDS",
            DEFAULT_GO_LIVE_COUNTDOWN_SECONDS,
        )?;

        let raw_bind = vars
            .get("SC_HTTP_BIND_ADDRESS")
            .map_or(DEFAULT_HTTP_BIND_ADDRESS, String::as_str);
        let http_bind_address = raw_bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("SC_HTTP_BIND_ADDRESS={raw_bind}")))?;

        let user_id = vars.get("SC_USER_ID").cloned().unwrap_or_else(|| {
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_USER_ID_PREFIX}-{short_suffix}")
        });

        Ok(Config {
            role,
            store_url,
            event_root,
            user_id,
            display_name,
            producer_host,
            heartbeat_interval_seconds,
            heartbeat_timeout_seconds,
            stage_countdown_seconds,
            go_live_countdown_seconds,
            http_bind_address,
        })
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_seconds)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            ("SC_ROLE".to_string(), "producer".to_string()),
            (
                "SC_STORE_URL".to_string(),
                "https://store.example.com/?auth=c2VjcmV0LXRva2Vu".to_string(),
            ),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.role, PrivilegedRole::Producer);
        assert_eq!(
            config.store_url.expose_secret(),
            "https://store.example.com/?auth=c2VjcmV0LXRva2Vu"
        );
        assert_eq!(config.event_root, DEFAULT_EVENT_ROOT);
        assert_eq!(config.display_name, DEFAULT_DISPLAY_NAME);
        assert!(!config.producer_host);
        assert_eq!(
            config.heartbeat_interval_seconds,
            DEFAULT_HEARTBEAT_INTERVAL_SECONDS
        );
        assert_eq!(
            config.heartbeat_timeout_seconds,
            DEFAULT_HEARTBEAT_INTERVAL_SECONDS
        );
        assert_eq!(config.stage_countdown_seconds, DEFAULT_STAGE_COUNTDOWN_SECONDS);
        assert_eq!(
            config.go_live_countdown_seconds,
            DEFAULT_GO_LIVE_COUNTDOWN_SECONDS
        );
        assert!(config.user_id.starts_with("sc-"));
        assert_eq!(config.http_bind_address.port(), 8090);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("SC_ROLE".to_string(), "celebrity".to_string());
        vars.insert("SC_EVENT_ROOT".to_string(), "events/acme/launch".to_string());
        vars.insert("SC_USER_ID".to_string(), "celeb-7".to_string());
        vars.insert("SC_DISPLAY_NAME".to_string(), "Robin".to_string());
        vars.insert("SC_PRODUCER_HOST".to_string(), "true".to_string());
        vars.insert("SC_HEARTBEAT_INTERVAL_SECONDS".to_string(), "5".to_string());
        vars.insert("SC_HEARTBEAT_TIMEOUT_SECONDS".to_string(), "15".to_string());
        vars.insert("SC_STAGE_COUNTDOWN_SECONDS".to_string(), "3".to_string());
        vars.insert("SC_GO_LIVE_COUNTDOWN_SECONDS".to_string(), "10".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.role, PrivilegedRole::Celebrity);
        assert_eq!(config.event_root, "events/acme/launch");
        assert_eq!(config.user_id, "celeb-7");
        assert_eq!(config.display_name, "Robin");
        assert!(config.producer_host);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(15));
        assert_eq!(config.stage_countdown_seconds, 3);
        assert_eq!(config.go_live_countdown_seconds, 10);
    }

    #[test]
    fn test_timeout_follows_custom_interval() {
        let mut vars = base_vars();
        vars.insert("SC_HEARTBEAT_INTERVAL_SECONDS".to_string(), "20".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.heartbeat_timeout_seconds, 20);
    }

    #[test]
    fn test_from_vars_missing_role() {
        let mut vars = base_vars();
        vars.remove("SC_ROLE");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "SC_ROLE"));
    }

    #[test]
    fn test_from_vars_missing_store_url() {
        let mut vars = base_vars();
        vars.remove("SC_STORE_URL");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "SC_STORE_URL"));
    }

    #[test]
    fn test_fan_role_is_rejected() {
        let mut vars = base_vars();
        vars.insert("SC_ROLE".to_string(), "fan".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let mut vars = base_vars();
        vars.insert(
            "SC_HEARTBEAT_INTERVAL_SECONDS".to_string(),
            "ten".to_string(),
        );
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));

        let mut vars = base_vars();
        vars.insert("SC_HEARTBEAT_INTERVAL_SECONDS".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));

        let mut vars = base_vars();
        vars.insert("SC_PRODUCER_HOST".to_string(), "yes".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_http_bind_address() {
        let mut vars = base_vars();
        vars.insert(
            "SC_HTTP_BIND_ADDRESS".to_string(),
            "127.0.0.1:9100".to_string(),
        );
        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.http_bind_address.to_string(), "127.0.0.1:9100");

        vars.insert("SC_HTTP_BIND_ADDRESS".to_string(), "not-an-addr".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(msg)) if msg.starts_with("SC_HTTP_BIND_ADDRESS")
        ));
    }

    #[test]
    fn test_timeout_below_interval_is_rejected() {
        let mut vars = base_vars();
        vars.insert("SC_HEARTBEAT_TIMEOUT_SECONDS".to_string(), "5".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(msg)) if msg.contains("TIMEOUT")));
    }

    #[test]
    fn test_debug_redacts_sensitive_fields() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("c2VjcmV0LXRva2Vu"));
        assert!(!debug_output.contains("store.example.com"));
    }
}
