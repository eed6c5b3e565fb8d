//! Polling transport configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the HTTP polling transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between two `GET /api/states` polls once subscribed, in seconds.
    pub poll_interval_secs: u64,
    /// Timeout applied to every HTTP request, in seconds.
    pub request_timeout_secs: u64,
}

impl PollingConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            request_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_have_sensible_defaults() {
        let config = PollingConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn should_deserialize_from_toml() {
        let config: PollingConfig = toml::from_str(
            r"
            poll_interval_secs = 2
            request_timeout_secs = 5
        ",
        )
        .unwrap();
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.request_timeout_secs, 5);
    }

    #[test]
    fn should_never_poll_in_a_busy_loop() {
        let config = PollingConfig {
            poll_interval_secs: 0,
            ..PollingConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }
}
