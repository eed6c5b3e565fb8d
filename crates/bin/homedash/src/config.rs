//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `homedash.toml` in the working directory. Every field has a
//! default so the file is optional; without a hub URL and token the client
//! starts in the "not configured" state. Environment variables take
//! precedence over file values.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use homedash_adapter_http_reqwest::PollingConfig;
use homedash_adapter_ws_tungstenite::WsConfig;
use homedash_app::ReconnectPolicy;
use homedash_domain::connection::HubConfig;
use homedash_domain::filter::EntityFilter;
use homedash_domain::id::EntityId;

pub const CONFIG_FILE: &str = "homedash.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hub: HubSection,
    pub reconnect: ReconnectSection,
    pub filter: FilterSection,
    pub websocket: WsConfig,
    pub polling: PollingConfig,
    pub logging: LoggingConfig,
}

/// Where the hub lives and how to reach it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HubSection {
    /// Base URL, e.g. `http://homeassistant.local:8123`.
    pub base_url: Option<String>,
    /// Long-lived access token.
    pub token: Option<String>,
    pub transport: TransportKind,
}

/// Which transport carries the protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Push updates over the real-time WebSocket endpoint.
    #[default]
    WebSocket,
    /// Poll the REST API.
    Polling,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "websocket" => Ok(Self::WebSocket),
            "polling" => Ok(Self::Polling),
            other => Err(ConfigError::Validation(format!(
                "unknown transport {other:?}, expected \"websocket\" or \"polling\""
            ))),
        }
    }
}

/// Reconnection policy.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReconnectSection {
    /// First retry delay in milliseconds; doubles on every attempt.
    pub base_delay_ms: u64,
    /// Retries before giving up.
    pub max_attempts: u32,
    /// How long to wait for a snapshot or command result.
    pub request_timeout_secs: u64,
}

/// Entity allow-list.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FilterSection {
    pub enabled: bool,
    pub entities: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `homedash.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file(CONFIG_FILE)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("HOMEDASH_BASE_URL") {
            self.hub.base_url = Some(val);
        }
        if let Ok(val) = std::env::var("HOMEDASH_TOKEN") {
            self.hub.token = Some(val);
        }
        if let Ok(val) = std::env::var("HOMEDASH_TRANSPORT") {
            self.hub.transport = val.parse()?;
        }
        if let Ok(val) = std::env::var("HOMEDASH_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.reconnect.base_delay_ms == 0 {
            return Err(ConfigError::Validation(
                "reconnect.base_delay_ms must be non-zero".to_string(),
            ));
        }
        if self.reconnect.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "reconnect.request_timeout_secs must be non-zero".to_string(),
            ));
        }
        self.hub_config()?;
        self.entity_filter()?;
        Ok(())
    }

    /// The hub to connect to, or `None` while URL or token is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for a malformed URL.
    pub fn hub_config(&self) -> Result<Option<HubConfig>, ConfigError> {
        let base_url = self.hub.base_url.as_deref().map(str::trim);
        let token = self.hub.token.as_deref().map(str::trim);
        match (base_url, token) {
            (Some(base_url), Some(token)) if !base_url.is_empty() && !token.is_empty() => {
                HubConfig::new(base_url, token)
                    .map(Some)
                    .map_err(|err| ConfigError::Validation(format!("hub: {err}")))
            }
            _ => Ok(None),
        }
    }

    /// The configured allow-list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for a malformed entity identifier.
    pub fn entity_filter(&self) -> Result<EntityFilter, ConfigError> {
        if !self.filter.enabled {
            return Ok(EntityFilter::Disabled);
        }
        let ids = self
            .filter
            .entities
            .iter()
            .map(|raw| {
                EntityId::new(raw.trim())
                    .map_err(|err| ConfigError::Validation(format!("filter: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EntityFilter::allow(ids))
    }

    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.reconnect.base_delay_ms),
            max_attempts: self.reconnect.max_attempts,
            request_timeout: Duration::from_secs(self.reconnect.request_timeout_secs),
        }
    }
}

impl Default for ReconnectSection {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        Self {
            base_delay_ms: u64::try_from(policy.base_delay.as_millis()).unwrap_or(1_000),
            max_attempts: policy.max_attempts,
            request_timeout_secs: policy.request_timeout.as_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "homedash=info,homedash_app=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.hub.transport, TransportKind::WebSocket);
        assert_eq!(config.reconnect.base_delay_ms, 1_000);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.request_timeout_secs, 30);
        assert!(!config.filter.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_be_unconfigured_without_url_and_token() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.hub_config().unwrap().is_none());
    }

    #[test]
    fn should_be_unconfigured_with_blank_token() {
        let config: Config = toml::from_str(
            "
            [hub]
            base_url = 'http://hub.local:8123'
            token = '  '
        ",
        )
        .unwrap();
        assert!(config.hub_config().unwrap().is_none());
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [hub]
            base_url = 'https://hub.example.com'
            token = 'secret'
            transport = 'polling'

            [reconnect]
            base_delay_ms = 250
            max_attempts = 3
            request_timeout_secs = 10

            [filter]
            enabled = true
            entities = ['light.kitchen', 'lock.front_door']

            [websocket]
            connect_timeout_secs = 3

            [polling]
            poll_interval_secs = 5

            [logging]
            filter = 'debug'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.hub.transport, TransportKind::Polling);
        assert_eq!(config.websocket.connect_timeout_secs, 3);
        assert_eq!(config.polling.poll_interval_secs, 5);
        assert_eq!(config.logging.filter, "debug");

        let hub = config.hub_config().unwrap().unwrap();
        assert_eq!(hub.token(), "secret");
        assert_eq!(
            hub.websocket_url().as_str(),
            "wss://hub.example.com/api/websocket"
        );

        let policy = config.reconnect_policy();
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.max_attempts, 3);

        let filter = config.entity_filter().unwrap();
        assert!(filter.admits(&EntityId::new("light.kitchen").unwrap()));
        assert!(!filter.admits(&EntityId::new("light.hall").unwrap()));
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn should_reject_malformed_base_url() {
        let mut config = Config::default();
        config.hub.base_url = Some("not a url".to_string());
        config.hub.token = Some("T".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_malformed_filter_entry() {
        let mut config = Config::default();
        config.filter.enabled = true;
        config.filter.entities = vec!["kitchen".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_zero_base_delay() {
        let mut config = Config::default();
        config.reconnect.base_delay_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_parse_transport_names() {
        assert_eq!(
            "WebSocket".parse::<TransportKind>().unwrap(),
            TransportKind::WebSocket
        );
        assert_eq!(
            "polling".parse::<TransportKind>().unwrap(),
            TransportKind::Polling
        );
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }

    #[test]
    fn should_admit_nothing_with_enabled_empty_filter() {
        let mut config = Config::default();
        config.filter.enabled = true;
        let filter = config.entity_filter().unwrap();
        assert!(filter.is_enabled());
        assert!(!filter.admits(&EntityId::new("light.kitchen").unwrap()));
    }
}
