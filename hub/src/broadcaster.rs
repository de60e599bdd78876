//! Fan-out of payloads to channel subscribers.
//!
//! Every send is attempted against a snapshot of the channel, each bounded by
//! the send timeout. Connections whose send fails are evicted after the whole
//! snapshot has been attempted.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionId};
use crate::error::HubError;
use crate::metrics::HubMetrics;
use crate::registry::ChannelRegistry;

/// Outcome of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Connections in the snapshot.
    pub recipients: usize,
    /// Sends that succeeded.
    pub delivered: usize,
    /// Connections removed because their send failed.
    pub evicted: usize,
}

impl BroadcastReport {
    /// Returns the number of failed sends.
    #[must_use]
    pub const fn failed(&self) -> usize {
        self.recipients.saturating_sub(self.delivered)
    }
}

/// Outcome of a direct send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// The payload was queued to the connection.
    Delivered,
    /// The send failed and the connection was removed.
    Evicted,
    /// No such connection is registered.
    UnknownConnection,
}

/// Sends payloads to registered connections.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<ChannelRegistry>,
    metrics: Arc<HubMetrics>,
    send_timeout: Duration,
}

impl Broadcaster {
    /// Creates a new broadcaster over the given registry.
    #[must_use]
    pub fn new(
        registry: Arc<ChannelRegistry>,
        metrics: Arc<HubMetrics>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            metrics,
            send_timeout,
        }
    }

    /// Serializes `payload` once and sends it to every connection on `channel`.
    ///
    /// Per-connection failures never fail the call.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Stopped`] after shutdown and
    /// [`HubError::Serialization`] if the payload cannot be encoded.
    pub async fn broadcast<T>(&self, channel: &str, payload: &T) -> Result<BroadcastReport, HubError>
    where
        T: Serialize + ?Sized,
    {
        let text: Arc<str> = Arc::from(serde_json::to_string(payload)?);
        self.broadcast_text(channel, text).await
    }

    /// Sends pre-serialized text to every connection on `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Stopped`] after shutdown.
    pub async fn broadcast_text(
        &self,
        channel: &str,
        text: Arc<str>,
    ) -> Result<BroadcastReport, HubError> {
        if self.registry.is_closed().await {
            return Err(HubError::Stopped);
        }

        self.metrics.record_broadcast();

        let recipients = self.registry.snapshot(channel).await;
        if recipients.is_empty() {
            debug!(channel, "Broadcast to channel with no subscribers");
            return Ok(BroadcastReport::default());
        }

        let timeout = self.send_timeout;
        let results = join_all(recipients.iter().map(|conn| {
            let text = Arc::clone(&text);
            async move { conn.send_text(text, timeout).await }
        }))
        .await;

        let mut failed = Vec::new();
        let mut delivered = 0;
        for (conn, result) in recipients.iter().zip(results) {
            match result {
                Ok(()) => {
                    delivered += 1;
                    self.metrics.record_message_sent();
                }
                Err(e) => {
                    warn!(connection_id = %conn.id(), channel, error = %e, "Broadcast send failed");
                    self.metrics.record_send_failure();
                    failed.push(Arc::clone(conn));
                }
            }
        }

        let evicted = retire(&self.registry, &self.metrics, channel, &failed).await;

        debug!(
            channel,
            recipients = recipients.len(),
            delivered,
            evicted,
            "Broadcast complete"
        );

        Ok(BroadcastReport {
            recipients: recipients.len(),
            delivered,
            evicted,
        })
    }

    /// Sends `payload` to a single connection.
    ///
    /// A failed send evicts only that connection.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Stopped`] after shutdown and
    /// [`HubError::Serialization`] if the payload cannot be encoded.
    pub async fn send_to<T>(&self, id: ConnectionId, payload: &T) -> Result<Delivery, HubError>
    where
        T: Serialize + ?Sized,
    {
        if self.registry.is_closed().await {
            return Err(HubError::Stopped);
        }

        let text: Arc<str> = Arc::from(serde_json::to_string(payload)?);

        let Some(conn) = self.registry.find(id).await else {
            debug!(connection_id = %id, "Direct send to unknown connection");
            return Ok(Delivery::UnknownConnection);
        };

        match conn.send_text(text, self.send_timeout).await {
            Ok(()) => {
                self.metrics.record_message_sent();
                Ok(Delivery::Delivered)
            }
            Err(e) => {
                warn!(connection_id = %id, channel = conn.channel(), error = %e, "Direct send failed");
                self.metrics.record_send_failure();
                retire(
                    &self.registry,
                    &self.metrics,
                    conn.channel(),
                    std::slice::from_ref(&conn),
                )
                .await;
                Ok(Delivery::Evicted)
            }
        }
    }
}

/// Removes connections from a channel and closes their sockets.
///
/// Connections already removed by someone else, or replaced by a different
/// connection with the same ID, are skipped, so each socket is closed at most
/// once and a replacement is never torn down. Returns the number actually
/// removed.
pub(crate) async fn retire(
    registry: &ChannelRegistry,
    metrics: &HubMetrics,
    channel: &str,
    connections: &[Arc<Connection>],
) -> usize {
    let mut removed = 0;
    for conn in connections {
        if !registry.remove_exact(channel, conn).await {
            continue;
        }
        removed += 1;
        if conn.close().await {
            metrics.record_connection_closed();
        }
    }

    if removed > 0 {
        let remaining = registry.channel_size(channel).await;
        info!(channel, removed, remaining, "Connections removed");
    }

    removed
}
