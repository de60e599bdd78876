//! Client connection state.
//!
//! A [`Connection`] owns the sending half of one client's outbound queue. The
//! receiving half is drained by a writer task that forwards frames to the
//! actual socket, so the queue is the only way to write to that socket.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use crate::error::HubError;

/// Global connection ID counter.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generates a fresh, process-unique connection ID.
    #[must_use]
    pub fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// A frame queued for a client socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Serialized JSON text.
    Text(Arc<str>),
    /// Close the socket. Always the last frame a writer sees.
    Close,
}

/// A client subscribed to exactly one channel.
#[derive(Debug)]
pub struct Connection {
    /// Unique connection ID.
    id: ConnectionId,

    /// Channel this connection is subscribed to.
    channel: String,

    /// Outbound queue. `None` once closed.
    sink: Mutex<Option<mpsc::Sender<Frame>>>,

    /// When the connection was accepted.
    connected_at: Instant,

    /// Milliseconds after `connected_at` of the latest liveness signal.
    last_seen_ms: AtomicU64,
}

impl Connection {
    /// Creates a new connection with a fresh ID.
    #[must_use]
    pub fn new(channel: impl Into<String>, sink: mpsc::Sender<Frame>) -> Self {
        Self::with_id(ConnectionId::next(), channel, sink)
    }

    /// Creates a connection with an explicit ID.
    #[must_use]
    pub fn with_id(id: ConnectionId, channel: impl Into<String>, sink: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            channel: channel.into(),
            sink: Mutex::new(Some(sink)),
            connected_at: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
        }
    }

    /// Returns the connection ID.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the subscribed channel.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Returns when the connection was accepted.
    #[must_use]
    pub const fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Records an inbound liveness signal.
    pub fn touch(&self) {
        let elapsed = Instant::now().saturating_duration_since(self.connected_at);
        self.last_seen_ms
            .fetch_max(duration_ms(elapsed), Ordering::Relaxed);
    }

    /// Returns the time of the latest liveness signal.
    #[must_use]
    pub fn last_seen(&self) -> Instant {
        self.connected_at + Duration::from_millis(self.last_seen_ms.load(Ordering::Relaxed))
    }

    /// Returns how long the client has been silent as of `now`.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen())
    }

    /// Returns true if the client has been silent for longer than `window`.
    #[must_use]
    pub fn is_stale(&self, now: Instant, window: Duration) -> bool {
        self.idle_for(now) > window
    }

    /// Queues a text frame, waiting at most `timeout` for queue space.
    ///
    /// Sends are serialized per connection by the sink lock.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::SocketClosed`] if the connection or its writer is
    /// gone, and [`HubError::SendTimeout`] if the queue stayed full.
    pub async fn send_text(&self, text: Arc<str>, timeout: Duration) -> Result<(), HubError> {
        let guard = self.sink.lock().await;
        let sink = guard.as_ref().ok_or(HubError::SocketClosed)?;

        sink.send_timeout(Frame::Text(text), timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => {
                    HubError::SendTimeout(duration_ms(timeout))
                }
                SendTimeoutError::Closed(_) => HubError::SocketClosed,
            })
    }

    /// Closes the socket handle.
    ///
    /// Returns true only for the call that actually closed it.
    pub async fn close(&self) -> bool {
        let mut guard = self.sink.lock().await;
        match guard.take() {
            Some(sink) => {
                // A full queue means the writer is stuck; dropping the sender
                // still ends it once the backlog drains.
                let _ = sink.try_send(Frame::Close);
                true
            }
            None => false,
        }
    }

    /// Returns true if the socket handle has been closed.
    pub async fn is_closed(&self) -> bool {
        self.sink.lock().await.is_none()
    }
}
