//! Connection manager facade.
//!
//! Composes the registry, broadcaster and liveness monitor behind the handful
//! of operations the route layer needs, and owns the monitor's lifecycle.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcaster::{BroadcastReport, Broadcaster, Delivery};
use crate::config::HubConfig;
use crate::connection::{Connection, ConnectionId, Frame};
use crate::error::HubError;
use crate::liveness::{LivenessMonitor, SweepReport};
use crate::metrics::HubMetrics;
use crate::registry::ChannelRegistry;

/// Monitor lifecycle.
#[derive(Debug)]
enum Lifecycle {
    /// Constructed, monitor not spawned yet.
    Idle,
    /// Monitor task running.
    Running {
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
    },
    /// Stopped for good.
    Stopped,
}

/// Facade over the channel registry, broadcaster and liveness monitor.
///
/// Construct one per process and share it by `Arc` with whatever accepts
/// sockets and produces events.
///
/// # Example
///
/// ```rust,ignore
/// let manager = Arc::new(ConnectionManager::new(HubConfig::default())?);
/// manager.start().await?;
///
/// let (tx, rx) = manager.outbound_channel();
/// let id = manager.connect(tx, "alerts").await?;
/// // spawn a writer that forwards `rx` to the socket ...
///
/// manager.broadcast("alerts", &Envelope::alert(json!({"code": 7}))).await?;
/// manager.stop().await;
/// ```
#[derive(Debug)]
pub struct ConnectionManager {
    /// Configuration.
    config: HubConfig,

    /// Channel registry.
    registry: Arc<ChannelRegistry>,

    /// Fan-out.
    broadcaster: Broadcaster,

    /// Liveness monitor, cloned into the background task on start.
    monitor: LivenessMonitor,

    /// Metrics.
    metrics: Arc<HubMetrics>,

    /// Monitor lifecycle.
    lifecycle: Mutex<Lifecycle>,
}

impl ConnectionManager {
    /// Creates a new connection manager.
    ///
    /// The configured channels exist immediately, even before anyone
    /// subscribes.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: HubConfig) -> Result<Self, HubError> {
        config.validate()?;

        let registry = Arc::new(ChannelRegistry::with_channels(config.channels.iter().cloned()));
        let metrics = Arc::new(HubMetrics::new());
        let broadcaster = Broadcaster::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            config.send_timeout(),
        );
        let monitor = LivenessMonitor::new(Arc::clone(&registry), Arc::clone(&metrics), &config);

        Ok(Self {
            config,
            registry,
            broadcaster,
            monitor,
            metrics,
            lifecycle: Mutex::new(Lifecycle::Idle),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Returns the metrics.
    #[must_use]
    pub fn metrics(&self) -> Arc<HubMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Creates an outbound queue sized from the configuration.
    ///
    /// The sender goes to [`connect`](Self::connect); the receiver is drained
    /// by the socket's writer task.
    #[must_use]
    pub fn outbound_channel(&self) -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        mpsc::channel(self.config.outbound_buffer)
    }

    /// Starts the liveness monitor.
    ///
    /// Calling this again while running is a no-op, so at most one monitor
    /// task ever exists.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Stopped`] if the manager has been stopped.
    pub async fn start(&self) -> Result<(), HubError> {
        let mut lifecycle = self.lifecycle.lock().await;
        match &*lifecycle {
            Lifecycle::Running { .. } => {
                debug!("Connection manager already running");
                return Ok(());
            }
            Lifecycle::Stopped => return Err(HubError::Stopped),
            Lifecycle::Idle => {}
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.monitor.clone().run(shutdown_rx));
        *lifecycle = Lifecycle::Running { shutdown, task };

        info!(
            channels = ?self.config.channels,
            ping_interval_ms = self.config.ping_interval_ms,
            "Connection manager initialized with ping monitoring"
        );
        Ok(())
    }

    /// Returns true while the liveness monitor is running.
    pub async fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock().await, Lifecycle::Running { .. })
    }

    /// Registers a client socket on a channel.
    ///
    /// `sink` is the socket's outbound queue; the returned ID addresses the
    /// connection from then on. Unknown channels are created on demand.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Stopped`] if the manager has been stopped.
    pub async fn connect(
        &self,
        sink: mpsc::Sender<Frame>,
        channel: &str,
    ) -> Result<ConnectionId, HubError> {
        let connection = Arc::new(Connection::new(channel, sink));
        let id = connection.id();

        if let Some(displaced) = self.registry.add(connection).await? {
            if displaced.close().await {
                self.metrics.record_connection_closed();
            }
        }
        self.metrics.record_connection_opened();

        let channel_connections = self.registry.channel_size(channel).await;
        let total_connections = self.registry.connection_count().await;
        info!(
            connection_id = %id,
            channel,
            channel_connections,
            total_connections,
            "Client connected"
        );

        Ok(id)
    }

    /// Removes a connection and closes its socket.
    ///
    /// Returns false if it was not registered on that channel; calling it
    /// again for the same ID is harmless.
    pub async fn disconnect(&self, id: ConnectionId, channel: &str) -> bool {
        let Some(connection) = self.registry.remove(channel, id).await else {
            debug!(connection_id = %id, channel, "Disconnect for unregistered connection");
            return false;
        };

        if connection.close().await {
            self.metrics.record_connection_closed();
        }

        let channel_connections = self.registry.channel_size(channel).await;
        let total_connections = self.registry.connection_count().await;
        info!(
            connection_id = %id,
            channel,
            channel_connections,
            total_connections,
            "Client disconnected"
        );

        true
    }

    /// Records an inbound liveness signal for a connection.
    ///
    /// Returns false if the connection is unknown.
    pub async fn touch(&self, id: ConnectionId) -> bool {
        match self.registry.find(id).await {
            Some(connection) => {
                connection.touch();
                true
            }
            None => false,
        }
    }

    /// Sends a payload to every connection on a channel.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Stopped`] after [`stop`](Self::stop), or
    /// [`HubError::Serialization`] if the payload cannot be encoded.
    pub async fn broadcast<T>(&self, channel: &str, payload: &T) -> Result<BroadcastReport, HubError>
    where
        T: Serialize + ?Sized,
    {
        self.broadcaster.broadcast(channel, payload).await
    }

    /// Sends a payload to one connection.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Stopped`] after [`stop`](Self::stop), or
    /// [`HubError::Serialization`] if the payload cannot be encoded.
    pub async fn send_to<T>(&self, id: ConnectionId, payload: &T) -> Result<Delivery, HubError>
    where
        T: Serialize + ?Sized,
    {
        self.broadcaster.send_to(id, payload).await
    }

    /// Runs one liveness sweep immediately, outside the schedule.
    pub async fn sweep(&self) -> SweepReport {
        self.monitor.sweep().await
    }

    /// Returns the known channel names.
    pub async fn channels(&self) -> Vec<String> {
        self.registry.channels().await
    }

    /// Returns the number of connections on a channel.
    pub async fn channel_size(&self, channel: &str) -> usize {
        self.registry.channel_size(channel).await
    }

    /// Returns the total number of connections.
    pub async fn connection_count(&self) -> usize {
        self.registry.connection_count().await
    }

    /// Stops the monitor and closes every open connection.
    ///
    /// The monitor is cancelled without waiting out its interval. After this
    /// returns, `connect`, `broadcast` and `send_to` fail with
    /// [`HubError::Stopped`].
    pub async fn stop(&self) {
        let previous = {
            let mut lifecycle = self.lifecycle.lock().await;
            std::mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        };

        match previous {
            Lifecycle::Running { shutdown, task } => {
                let _ = shutdown.send(true);
                if let Err(e) = task.await {
                    warn!(error = %e, "Liveness monitor ended abnormally");
                }
            }
            Lifecycle::Idle => {}
            Lifecycle::Stopped => {
                debug!("Connection manager already stopped");
                return;
            }
        }

        let connections = self.registry.drain().await;
        let mut closed = 0;
        for connection in &connections {
            if connection.close().await {
                self.metrics.record_connection_closed();
                closed += 1;
            }
        }

        info!(closed, "Connection manager stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::liveness::PING_FRAME;
    use crate::messages::{Envelope, PersonalMessage};

    const INTERVAL_MS: u64 = 1_000;

    fn manager() -> ConnectionManager {
        let config = HubConfig::default()
            .with_ping_interval(INTERVAL_MS)
            .with_send_timeout(50);
        ConnectionManager::new(config).expect("manager")
    }

    async fn connect(
        manager: &ConnectionManager,
        channel: &str,
    ) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let (tx, rx) = manager.outbound_channel();
        let id = manager.connect(tx, channel).await.expect("connect");
        (id, rx)
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_operations_can_be_spawned() {
        let manager = manager();
        let (tx, _rx) = manager.outbound_channel();
        let id = ConnectionId::next();

        assert_send(&manager.connect(tx, "metrics"));
        assert_send(&manager.disconnect(id, "metrics"));
        assert_send(&manager.broadcast("metrics", &Envelope::ping()));
        assert_send(&manager.send_to(id, &Envelope::ping()));
        assert_send(&manager.sweep());
        assert_send(&manager.start());
        assert_send(&manager.stop());

        let (_shutdown, shutdown_rx) = watch::channel(false);
        assert_send(&manager.monitor.clone().run(shutdown_rx));
    }

    fn text(s: &str) -> Frame {
        Frame::Text(Arc::from(s))
    }

    #[test]
    fn test_manager_new_invalid_config() {
        let config = HubConfig::default().with_ping_interval(0);
        let result = ConnectionManager::new(config);
        assert!(matches!(result, Err(HubError::Config(_))));
    }

    #[tokio::test]
    async fn test_manager_configured_channels_exist() {
        let manager = manager();
        assert_eq!(manager.channels().await, vec!["alerts", "metrics"]);
        assert_eq!(manager.channel_size("metrics").await, 0);
    }

    #[tokio::test]
    async fn test_manager_broadcast_scenario() {
        let manager = manager();
        let (_id1, mut rx1) = connect(&manager, "metrics").await;
        let (id2, mut rx2) = connect(&manager, "metrics").await;
        let (_id3, mut rx3) = connect(&manager, "metrics").await;

        let update = Envelope::metrics_update(serde_json::json!([1, 2, 3]));
        let expected = text(r#"{"type":"metrics_update","data":[1,2,3]}"#);

        let report = manager.broadcast("metrics", &update).await.expect("broadcast");
        assert_eq!(report.delivered, 3);
        assert_eq!(rx1.recv().await, Some(expected.clone()));
        assert_eq!(rx2.recv().await, Some(expected.clone()));
        assert_eq!(rx3.recv().await, Some(expected.clone()));

        assert!(manager.disconnect(id2, "metrics").await);
        assert_eq!(rx2.recv().await, Some(Frame::Close));

        let report = manager.broadcast("metrics", &update).await.expect("broadcast");
        assert_eq!(report.delivered, 2);
        assert_eq!(rx1.recv().await, Some(expected.clone()));
        assert_eq!(rx3.recv().await, Some(expected));
        assert_eq!(rx2.recv().await, None);
        assert_eq!(manager.channel_size("metrics").await, 2);
    }

    #[tokio::test]
    async fn test_manager_disconnect_twice_is_noop() {
        let manager = manager();
        let (id, _rx) = connect(&manager, "alerts").await;

        assert!(manager.disconnect(id, "alerts").await);
        assert!(!manager.disconnect(id, "alerts").await);
        assert!(!manager.disconnect(id, "metrics").await);

        assert_eq!(manager.connection_count().await, 0);
        assert_eq!(manager.metrics().connections_closed(), 1);
    }

    #[tokio::test]
    async fn test_manager_connect_unknown_channel() {
        let manager = manager();
        let (_id, _rx) = connect(&manager, "prices").await;

        assert!(manager.channels().await.contains(&"prices".to_string()));
        assert_eq!(manager.channel_size("prices").await, 1);
    }

    #[tokio::test]
    async fn test_manager_send_to() {
        let manager = manager();
        let (id, mut rx) = connect(&manager, "metrics").await;

        let delivery = manager
            .send_to(id, &PersonalMessage::echo("hi"))
            .await
            .expect("send");

        assert_eq!(delivery, Delivery::Delivered);
        assert_eq!(
            rx.recv().await,
            Some(text(r#"{"message":"Message received: hi"}"#))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_evicts_silent_connection() {
        let manager = manager();
        let (id, mut rx) = connect(&manager, "metrics").await;

        tokio::time::advance(Duration::from_millis(2 * INTERVAL_MS + 1)).await;
        let report = manager.sweep().await;

        assert_eq!(report.stale, 1);
        assert_eq!(manager.channel_size("metrics").await, 0);
        assert!(!manager.touch(id).await);
        assert_eq!(rx.recv().await, Some(Frame::Close));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_touch_keeps_connection_alive() {
        let manager = manager();
        let (id, _rx) = connect(&manager, "metrics").await;

        for _ in 0..5 {
            tokio::time::advance(Duration::from_millis(INTERVAL_MS)).await;
            assert!(manager.touch(id).await);
            assert_eq!(manager.sweep().await.evicted(), 0);
        }

        assert_eq!(manager.channel_size("metrics").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_start_is_idempotent() {
        let manager = manager();
        let (_id, mut rx) = connect(&manager, "metrics").await;

        let (first, second) = tokio::join!(manager.start(), manager.start());
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert!(manager.start().await.is_ok());
        assert!(manager.is_running().await);

        tokio::time::sleep(Duration::from_millis(INTERVAL_MS * 3 / 2)).await;

        // One monitor, one ping.
        assert_eq!(rx.recv().await, Some(text(PING_FRAME)));
        assert!(rx.try_recv().is_err());

        manager.stop().await;
    }

    #[tokio::test]
    async fn test_manager_stop_closes_everything() {
        let manager = manager();
        manager.start().await.expect("start");
        let (_id1, mut rx1) = connect(&manager, "metrics").await;
        let (_id2, mut rx2) = connect(&manager, "alerts").await;

        manager.stop().await;

        assert!(!manager.is_running().await);
        assert_eq!(manager.connection_count().await, 0);
        assert_eq!(rx1.recv().await, Some(Frame::Close));
        assert_eq!(rx1.recv().await, None);
        assert_eq!(rx2.recv().await, Some(Frame::Close));
        assert_eq!(rx2.recv().await, None);
        assert_eq!(manager.metrics().active_connections(), 0);
    }

    #[tokio::test]
    async fn test_manager_after_stop() {
        let manager = manager();
        let (id, mut rx) = connect(&manager, "metrics").await;
        manager.stop().await;
        manager.stop().await;

        let result = manager.broadcast("metrics", &Envelope::ping()).await;
        assert_eq!(result, Err(HubError::Stopped));
        let result = manager.send_to(id, &Envelope::ping()).await;
        assert_eq!(result, Err(HubError::Stopped));
        assert_eq!(manager.start().await, Err(HubError::Stopped));

        let (tx, _rx) = manager.outbound_channel();
        assert_eq!(
            manager.connect(tx, "metrics").await.err(),
            Some(HubError::Stopped)
        );

        // Only the close frame from stop, nothing after it.
        assert_eq!(rx.recv().await, Some(Frame::Close));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_stop_does_not_wait_for_interval() {
        let config = HubConfig::default().with_ping_interval(3_600_000);
        let manager = ConnectionManager::new(config).expect("manager");
        manager.start().await.expect("start");

        let stopped = tokio::time::timeout(Duration::from_millis(10), manager.stop()).await;
        assert!(stopped.is_ok());
    }
}
