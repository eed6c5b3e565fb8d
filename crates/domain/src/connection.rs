//! Hub connection settings and the observable connection status.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{SyncError, ValidationError};

/// Path of the hub's real-time endpoint, relative to the base URL.
pub const WEBSOCKET_PATH: &str = "/api/websocket";

/// Where the hub lives and how to authenticate against it.
#[derive(Clone, PartialEq, Eq)]
pub struct HubConfig {
    base_url: Url,
    token: String,
}

impl HubConfig {
    /// Validate and build a config.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidBaseUrl`] when `base_url` is not an
    /// absolute URL, [`ValidationError::UnsupportedScheme`] for schemes other
    /// than `http`, `https`, `ws` and `wss`, and [`ValidationError::EmptyToken`]
    /// for a blank token.
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, ValidationError> {
        let base_url = Url::parse(base_url)
            .map_err(|_| ValidationError::InvalidBaseUrl(base_url.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(ValidationError::UnsupportedScheme(
                base_url.scheme().to_string(),
            ));
        }
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ValidationError::EmptyToken);
        }
        Ok(Self { base_url, token })
    }

    /// The configured base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The long-lived access token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Real-time endpoint: `http` becomes `ws`, `https` becomes `wss`.
    #[must_use]
    pub fn websocket_url(&self) -> Url {
        let secure = matches!(self.base_url.scheme(), "https" | "wss");
        self.endpoint(if secure { "wss" } else { "ws" }, WEBSOCKET_PATH)
    }

    /// REST endpoint for `path` (e.g. `/api/states`).
    #[must_use]
    pub fn api_url(&self, path: &str) -> Url {
        let secure = matches!(self.base_url.scheme(), "https" | "wss");
        self.endpoint(if secure { "https" } else { "http" }, path)
    }

    fn endpoint(&self, scheme: &str, path: &str) -> Url {
        let mut url = self.base_url.clone();
        // Switching between http(s) and ws(s) is always permitted by `url`.
        let _ = url.set_scheme(scheme);
        let joined = format!("{}{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url.set_query(None);
        url.set_fragment(None);
        url
    }
}

impl fmt::Debug for HubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Connection state as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Failed => "failed",
        })
    }
}

/// Everything a connection banner needs, published as one value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncStatus {
    pub connection: ConnectionStatus,
    /// `false` while no [`HubConfig`] is available.
    pub configured: bool,
    /// `true` while a snapshot request is outstanding.
    pub loading: bool,
    pub error: Option<SyncError>,
}

impl SyncStatus {
    /// Status reported while no credentials are available.
    #[must_use]
    pub fn not_configured() -> Self {
        Self {
            connection: ConnectionStatus::Disconnected,
            configured: false,
            loading: false,
            error: Some(SyncError::ConfigurationMissing),
        }
    }

    /// Whether the channel is authenticated and usable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionStatus::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_rewrite_http_to_ws_for_realtime_endpoint() {
        let config = HubConfig::new("http://host:8123", "T").unwrap();
        assert_eq!(
            config.websocket_url().as_str(),
            "ws://host:8123/api/websocket"
        );
    }

    #[test]
    fn should_rewrite_https_to_wss_for_realtime_endpoint() {
        let config = HubConfig::new("https://hub.example.com/", "T").unwrap();
        assert_eq!(
            config.websocket_url().as_str(),
            "wss://hub.example.com/api/websocket"
        );
    }

    #[test]
    fn should_keep_base_path_prefix() {
        let config = HubConfig::new("http://proxy.local/hass/", "T").unwrap();
        assert_eq!(
            config.api_url("/api/states").as_str(),
            "http://proxy.local/hass/api/states"
        );
    }

    #[test]
    fn should_reject_relative_url() {
        assert!(matches!(
            HubConfig::new("host:8123/x", "T").err(),
            Some(ValidationError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            HubConfig::new("/api", "T").err(),
            Some(ValidationError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn should_reject_blank_token() {
        assert_eq!(
            HubConfig::new("http://host:8123", "  ").err(),
            Some(ValidationError::EmptyToken)
        );
    }

    #[test]
    fn should_redact_token_in_debug_output() {
        let config = HubConfig::new("http://host:8123", "secret-token").unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn should_report_not_configured_status() {
        let status = SyncStatus::not_configured();
        assert!(!status.configured);
        assert!(!status.is_connected());
        assert_eq!(status.error, Some(SyncError::ConfigurationMissing));
    }
}
