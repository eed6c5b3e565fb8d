//! WebSocket transport configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    /// How long the TCP connect, TLS and upgrade handshake may take, in seconds.
    pub connect_timeout_secs: u64,
}

impl WsConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
        }
    }
}
