//! WebSocket message types.
//!
//! Defines the outbound envelope pushed to subscribers and the small set of
//! messages clients send back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope type for liveness pings.
pub const PING: &str = "ping";

/// Envelope type for pong replies.
pub const PONG: &str = "pong";

/// Envelope type for metrics updates.
pub const METRICS_UPDATE: &str = "metrics_update";

/// Envelope type for alert notifications.
pub const ALERT: &str = "alert";

/// Envelope type for free-form text.
pub const MESSAGE: &str = "message";

/// Message pushed from server to clients.
///
/// Serialized as `{"type": ..., "data": ..., "message": ...}` with absent
/// fields omitted, so a ping is exactly `{"type":"ping"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Discriminator.
    #[serde(rename = "type")]
    pub kind: String,

    /// Structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Text payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    /// Creates an envelope with the given type and data.
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data: Some(data),
            message: None,
        }
    }

    /// Creates a liveness ping.
    #[must_use]
    pub fn ping() -> Self {
        Self {
            kind: PING.to_string(),
            data: None,
            message: None,
        }
    }

    /// Creates a pong reply.
    #[must_use]
    pub fn pong() -> Self {
        Self {
            kind: PONG.to_string(),
            data: None,
            message: None,
        }
    }

    /// Creates a metrics update.
    #[must_use]
    pub fn metrics_update(data: Value) -> Self {
        Self::new(METRICS_UPDATE, data)
    }

    /// Creates an alert notification.
    #[must_use]
    pub fn alert(data: Value) -> Self {
        Self::new(ALERT, data)
    }

    /// Creates a text message.
    #[must_use]
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            kind: MESSAGE.to_string(),
            data: None,
            message: Some(text.into()),
        }
    }
}

/// Message addressed to a single client: `{"message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalMessage {
    /// Echo or status text.
    pub message: String,
}

impl PersonalMessage {
    /// Creates a personal message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Creates the acknowledgement sent back for client text.
    #[must_use]
    pub fn echo(received: &str) -> Self {
        Self::new(format!("Message received: {received}"))
    }
}

/// Message sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Reply to a server ping.
    Pong,

    /// Client-initiated keepalive.
    Ping,
}

impl ClientMessage {
    /// Parses a client text frame; anything else is treated as free text.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}
