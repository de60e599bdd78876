//! Hub configuration.
//!
//! Provides configuration options for the connection registry and the
//! liveness monitor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Channel carrying periodic metrics updates.
pub const METRICS_CHANNEL: &str = "metrics";

/// Channel carrying alert notifications.
pub const ALERTS_CHANNEL: &str = "alerts";

/// Default ping interval in milliseconds.
pub const DEFAULT_PING_INTERVAL_MS: u64 = 30_000;

/// Default number of ping intervals a client may stay silent before eviction.
pub const DEFAULT_STALE_MULTIPLIER: u32 = 2;

/// Default per-send timeout in milliseconds.
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 5_000;

/// Default capacity of each connection's outbound queue.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 100;

/// Configuration for the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Channels that exist from construction, even with no subscribers.
    pub channels: Vec<String>,

    /// Interval between liveness sweeps in milliseconds.
    pub ping_interval_ms: u64,

    /// A connection is stale once silent for this many ping intervals.
    pub stale_multiplier: u32,

    /// Upper bound for a single send in milliseconds.
    pub send_timeout_ms: u64,

    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            channels: vec![METRICS_CHANNEL.to_string(), ALERTS_CHANNEL.to_string()],
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            stale_multiplier: DEFAULT_STALE_MULTIPLIER,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

impl HubConfig {
    /// Creates a new configuration with the given channels.
    #[must_use]
    pub fn with_channels(channels: Vec<String>) -> Self {
        Self {
            channels,
            ..Default::default()
        }
    }

    /// Sets the ping interval.
    #[must_use]
    pub fn with_ping_interval(mut self, ms: u64) -> Self {
        self.ping_interval_ms = ms;
        self
    }

    /// Sets the stale multiplier.
    #[must_use]
    pub fn with_stale_multiplier(mut self, multiplier: u32) -> Self {
        self.stale_multiplier = multiplier;
        self
    }

    /// Sets the send timeout.
    #[must_use]
    pub fn with_send_timeout(mut self, ms: u64) -> Self {
        self.send_timeout_ms = ms;
        self
    }

    /// Sets the outbound queue capacity.
    #[must_use]
    pub fn with_outbound_buffer(mut self, capacity: usize) -> Self {
        self.outbound_buffer = capacity;
        self
    }

    /// Returns the ping interval.
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Returns the silence window after which a connection is evicted.
    #[must_use]
    pub fn stale_after(&self) -> Duration {
        self.ping_interval().saturating_mul(self.stale_multiplier)
    }

    /// Returns the send timeout.
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping_interval_ms == 0 {
            return Err(ConfigError::InvalidPingInterval);
        }

        if self.stale_multiplier == 0 {
            return Err(ConfigError::InvalidStaleMultiplier);
        }

        if self.send_timeout_ms == 0 {
            return Err(ConfigError::InvalidSendTimeout);
        }

        if self.outbound_buffer == 0 {
            return Err(ConfigError::InvalidOutboundBuffer);
        }

        if self.channels.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::EmptyChannelName);
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid ping interval.
    #[error("ping_interval_ms must be > 0")]
    InvalidPingInterval,

    /// Invalid stale multiplier.
    #[error("stale_multiplier must be > 0")]
    InvalidStaleMultiplier,

    /// Invalid send timeout.
    #[error("send_timeout_ms must be > 0")]
    InvalidSendTimeout,

    /// Invalid outbound buffer.
    #[error("outbound_buffer must be > 0")]
    InvalidOutboundBuffer,

    /// A configured channel name is blank.
    #[error("channel names cannot be empty")]
    EmptyChannelName,

    /// An environment variable could not be parsed.
    #[error("invalid value for {name}: {value}")]
    InvalidVar {
        /// Variable name.
        name: String,
        /// Offending value.
        value: String,
    },
}
