//! Hub error types.
//!
//! Per-connection failures are absorbed inside the hub; only structural
//! failures reach callers of the facade.

use crate::config::ConfigError;

/// Hub errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The hub has been stopped and no longer accepts work.
    #[error("hub is stopped")]
    Stopped,

    /// The connection's socket handle is already closed.
    #[error("socket closed")]
    SocketClosed,

    /// The send did not complete within the send timeout.
    #[error("send timed out after {0} ms")]
    SendTimeout(u64),

    /// The payload could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl HubError {
    /// Returns true if this error only concerns a single connection.
    ///
    /// Such errors lead to the connection being evicted and are never
    /// surfaced to broadcast callers.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SocketClosed | Self::SendTimeout(_))
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
