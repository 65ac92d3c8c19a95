//! Client behavior configuration.

use std::time::Duration;

/// Tunables for a [`crate::Device`] connection. Construct via
/// [`ClientConfig::builder`]; fields you don't set keep their defaults.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Timeout for a request awaiting its correlated response.
    pub request_timeout: Duration,
    /// Interval at which now-playing state is polled while at least one
    /// subscriber is listening.
    pub now_playing_poll_interval: Duration,
    /// Prefer `addresses[1]` over `addresses[0]` when a `ServiceDescriptor`
    /// offers more than one. See
    /// [`crate::types::ServiceDescriptor::preferred_address`].
    pub prefer_second_address: bool,
    /// Identifier this client presents to the device during pairing.
    /// Defaults to a random value if unset.
    pub pairing_id: Option<String>,
    /// Emit verbose wire-level `Event::Debug` traffic.
    pub debug_events: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            now_playing_poll_interval: Duration::from_secs(5),
            prefer_second_address: true,
            pairing_id: None,
            debug_events: false,
        }
    }
}

impl ClientConfig {
    /// Start building a config, overriding only the fields that matter.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the TCP connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the request/response correlation timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the now-playing polling interval.
    #[must_use]
    pub fn now_playing_poll_interval(mut self, interval: Duration) -> Self {
        self.config.now_playing_poll_interval = interval;
        self
    }

    /// Override the `addresses[1]`-preferred heuristic.
    #[must_use]
    pub fn prefer_second_address(mut self, prefer: bool) -> Self {
        self.config.prefer_second_address = prefer;
        self
    }

    /// Set a fixed pairing identifier instead of a randomly generated one.
    #[must_use]
    pub fn pairing_id(mut self, id: impl Into<String>) -> Self {
        self.config.pairing_id = Some(id.into());
        self
    }

    /// Enable verbose wire-level debug events.
    #[must_use]
    pub fn debug_events(mut self, enable: bool) -> Self {
        self.config.debug_events = enable;
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_only_requested_fields() {
        let config = ClientConfig::builder()
            .request_timeout(Duration::from_secs(1))
            .build();

        assert_eq!(config.request_timeout, Duration::from_secs(1));
        assert_eq!(config.connect_timeout, ClientConfig::default().connect_timeout);
        assert!(config.prefer_second_address);
    }
}
