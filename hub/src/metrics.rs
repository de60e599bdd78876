//! Hub metrics tracking.
//!
//! Provides atomic counters for monitoring connections, fan-out and liveness.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Metrics for the hub.
#[derive(Debug)]
pub struct HubMetrics {
    /// Total connections opened.
    connections_opened: AtomicU64,

    /// Total connections closed, for any reason.
    connections_closed: AtomicU64,

    /// Total frames successfully queued to clients.
    messages_sent: AtomicU64,

    /// Total sends that failed or timed out.
    send_failures: AtomicU64,

    /// Total broadcast calls.
    broadcasts: AtomicU64,

    /// Total liveness pings queued.
    pings_sent: AtomicU64,

    /// Total connections evicted for silence.
    stale_evictions: AtomicU64,

    /// Start time for rate calculation.
    start_time: Instant,
}

impl Default for HubMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HubMetrics {
    /// Creates a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            pings_sent: AtomicU64::new(0),
            stale_evictions: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Records a connection opened.
    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a connection closed.
    pub fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a message sent.
    pub fn record_message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed send.
    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a broadcast.
    pub fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a ping sent.
    pub fn record_ping(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a stale eviction.
    pub fn record_stale_eviction(&self) {
        self.stale_evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the total connections opened.
    #[must_use]
    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    /// Returns the total connections closed.
    #[must_use]
    pub fn connections_closed(&self) -> u64 {
        self.connections_closed.load(Ordering::Relaxed)
    }

    /// Returns the current active connections.
    #[must_use]
    pub fn active_connections(&self) -> u64 {
        self.connections_opened()
            .saturating_sub(self.connections_closed())
    }

    /// Returns the total messages sent.
    #[must_use]
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    /// Returns the total send failures.
    #[must_use]
    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    /// Returns the total broadcasts.
    #[must_use]
    pub fn broadcasts(&self) -> u64 {
        self.broadcasts.load(Ordering::Relaxed)
    }

    /// Returns the total pings sent.
    #[must_use]
    pub fn pings_sent(&self) -> u64 {
        self.pings_sent.load(Ordering::Relaxed)
    }

    /// Returns the total stale evictions.
    #[must_use]
    pub fn stale_evictions(&self) -> u64 {
        self.stale_evictions.load(Ordering::Relaxed)
    }

    /// Returns the uptime.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> HubMetricsSnapshot {
        HubMetricsSnapshot {
            connections_opened: self.connections_opened(),
            connections_closed: self.connections_closed(),
            active_connections: self.active_connections(),
            messages_sent: self.messages_sent(),
            send_failures: self.send_failures(),
            broadcasts: self.broadcasts(),
            pings_sent: self.pings_sent(),
            stale_evictions: self.stale_evictions(),
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

/// A point-in-time snapshot of hub metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubMetricsSnapshot {
    /// Total connections opened.
    pub connections_opened: u64,
    /// Total connections closed.
    pub connections_closed: u64,
    /// Active connections.
    pub active_connections: u64,
    /// Messages sent.
    pub messages_sent: u64,
    /// Send failures.
    pub send_failures: u64,
    /// Broadcasts.
    pub broadcasts: u64,
    /// Pings sent.
    pub pings_sent: u64,
    /// Stale evictions.
    pub stale_evictions: u64,
    /// Uptime in seconds.
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = HubMetrics::new();
        assert_eq!(metrics.connections_opened(), 0);
        assert_eq!(metrics.connections_closed(), 0);
        assert_eq!(metrics.active_connections(), 0);
    }

    #[test]
    fn test_metrics_record_connection() {
        let metrics = HubMetrics::default();

        metrics.record_connection_opened();
        metrics.record_connection_opened();
        assert_eq!(metrics.active_connections(), 2);

        metrics.record_connection_closed();
        assert_eq!(metrics.connections_closed(), 1);
        assert_eq!(metrics.active_connections(), 1);
    }

    #[test]
    fn test_metrics_active_never_underflows() {
        let metrics = HubMetrics::new();
        metrics.record_connection_closed();
        assert_eq!(metrics.active_connections(), 0);
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = HubMetrics::new();

        metrics.record_connection_opened();
        metrics.record_broadcast();
        metrics.record_message_sent();
        metrics.record_send_failure();
        metrics.record_ping();
        metrics.record_stale_eviction();

        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.connections_opened, 1);
        assert_eq!(snapshot.active_connections, 1);
        assert_eq!(snapshot.broadcasts, 1);
        assert_eq!(snapshot.messages_sent, 1);
        assert_eq!(snapshot.send_failures, 1);
        assert_eq!(snapshot.pings_sent, 1);
        assert_eq!(snapshot.stale_evictions, 1);
    }

    #[test]
    fn test_metrics_snapshot_serializes() {
        let json = serde_json::to_value(HubMetrics::new().snapshot()).expect("serialize");
        assert_eq!(json["active_connections"], 0);
        assert!(json.get("uptime_secs").is_some());
    }
}
