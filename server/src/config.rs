//! Server configuration.
//!
//! Loads the listen address and hub policy from environment variables.

use std::str::FromStr;

use fanout_hub::config::METRICS_CHANNEL;
use fanout_hub::{ConfigError, HubConfig};

/// Default listen host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen host.
    pub host: String,

    /// Listen port.
    pub port: u16,

    /// Channel used by `GET /ws`.
    pub default_channel: String,

    /// Hub configuration.
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            default_channel: METRICS_CHANNEL.to_string(),
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Creates a new configuration with the given address.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Sets the hub configuration.
    #[must_use]
    pub fn with_hub(mut self, hub: HubConfig) -> Self {
        self.hub = hub;
        self
    }

    /// Returns the `host:port` listen address.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Loads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the result is
    /// invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through `lookup`, falling back to defaults.
    ///
    /// Recognized variables: `FANOUT_HOST`, `FANOUT_PORT`,
    /// `FANOUT_DEFAULT_CHANNEL`, `FANOUT_CHANNELS` (comma separated),
    /// `FANOUT_PING_INTERVAL_MS`, `FANOUT_STALE_MULTIPLIER`,
    /// `FANOUT_SEND_TIMEOUT_MS`, `FANOUT_OUTBOUND_BUFFER`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the result is
    /// invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("FANOUT_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var(&lookup, "FANOUT_PORT")? {
            config.port = port;
        }
        if let Some(channel) = lookup("FANOUT_DEFAULT_CHANNEL") {
            config.default_channel = channel.trim().to_string();
        }
        if let Some(channels) = lookup("FANOUT_CHANNELS") {
            config.hub.channels = channels
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
        }
        if let Some(ms) = parse_var(&lookup, "FANOUT_PING_INTERVAL_MS")? {
            config.hub.ping_interval_ms = ms;
        }
        if let Some(multiplier) = parse_var(&lookup, "FANOUT_STALE_MULTIPLIER")? {
            config.hub.stale_multiplier = multiplier;
        }
        if let Some(ms) = parse_var(&lookup, "FANOUT_SEND_TIMEOUT_MS")? {
            config.hub.send_timeout_ms = ms;
        }
        if let Some(capacity) = parse_var(&lookup, "FANOUT_OUTBOUND_BUFFER")? {
            config.hub.outbound_buffer = capacity;
        }

        if config.default_channel.is_empty() {
            return Err(ConfigError::EmptyChannelName);
        }
        config.hub.validate()?;

        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(name)
        .map(|value| {
            value.trim().parse().map_err(|_| ConfigError::InvalidVar {
                name: name.to_string(),
                value,
            })
        })
        .transpose()
}
