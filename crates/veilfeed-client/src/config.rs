//! Client configuration

use std::time::Duration;

/// Relay used when none is configured
pub const DEFAULT_RELAY_URL: &str = "wss://relay.damus.io";

/// How long `publish` waits for the relay's `OK`
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Stored posts requested when the feed subscription opens
pub const DEFAULT_FEED_LIMIT: usize = 500;

/// Relay connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// WebSocket URL of the relay
    pub url: String,
    /// Maximum wait for a publish acknowledgement
    pub publish_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { url: DEFAULT_RELAY_URL.to_string(), publish_timeout: DEFAULT_PUBLISH_TIMEOUT }
    }
}

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Relay settings
    pub relay: RelayConfig,
    /// Cap on stored posts the relay returns for the feed
    pub feed_limit: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { relay: RelayConfig::default(), feed_limit: Some(DEFAULT_FEED_LIMIT) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();

        assert_eq!(config.relay.url, "wss://relay.damus.io");
        assert_eq!(config.relay.publish_timeout, Duration::from_secs(10));
        assert_eq!(config.feed_limit, Some(500));
    }
}
