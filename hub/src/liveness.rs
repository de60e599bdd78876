//! Liveness monitoring of subscribed connections.
//!
//! Every ping interval the monitor walks a snapshot of all channels. A
//! connection that has been silent for longer than the stale window is
//! evicted; every other connection is sent `{"type":"ping"}`, and a ping that
//! cannot be queued is treated the same as silence. Sending a ping does not
//! count as a sign of life; only inbound client traffic refreshes a
//! connection (see [`Connection::touch`]).

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::broadcaster::retire;
use crate::config::HubConfig;
use crate::connection::{duration_ms, Connection};
use crate::metrics::HubMetrics;
use crate::registry::ChannelRegistry;

/// Serialized liveness ping.
pub const PING_FRAME: &str = r#"{"type":"ping"}"#;

/// Result of one monitor sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections sent a ping.
    pub pinged: usize,
    /// Connections evicted for silence.
    pub stale: usize,
    /// Connections evicted because the ping could not be sent.
    pub failed: usize,
}

impl SweepReport {
    /// Returns the total number of evicted connections.
    #[must_use]
    pub const fn evicted(&self) -> usize {
        self.stale + self.failed
    }
}

/// Periodic pinger and stale-connection reaper.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    registry: Arc<ChannelRegistry>,
    metrics: Arc<HubMetrics>,
    interval: Duration,
    stale_after: Duration,
    send_timeout: Duration,
}

impl LivenessMonitor {
    /// Creates a monitor using the intervals from `config`.
    #[must_use]
    pub fn new(registry: Arc<ChannelRegistry>, metrics: Arc<HubMetrics>, config: &HubConfig) -> Self {
        Self {
            registry,
            metrics,
            interval: config.ping_interval(),
            stale_after: config.stale_after(),
            send_timeout: config.send_timeout(),
        }
    }

    /// Returns the sweep period.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the silence window after which a connection is evicted.
    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Runs sweeps every interval until `shutdown` flips to true or its
    /// sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = duration_ms(self.interval),
            stale_after_ms = duration_ms(self.stale_after),
            "Liveness monitor started"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let report = self.sweep().await;
                    if report.evicted() > 0 {
                        info!(
                            pinged = report.pinged,
                            stale = report.stale,
                            failed = report.failed,
                            "Liveness sweep evicted connections"
                        );
                    } else {
                        debug!(pinged = report.pinged, "Liveness sweep complete");
                    }
                }
            }
        }

        info!("Liveness monitor stopped");
    }

    /// Runs a single sweep over every channel.
    pub async fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let mut report = SweepReport::default();

        for (channel, connections) in self.registry.snapshot_all().await {
            let (stale, alive): (Vec<Arc<Connection>>, Vec<Arc<Connection>>) = connections
                .into_iter()
                .partition(|conn| conn.is_stale(now, self.stale_after));

            for conn in &stale {
                warn!(
                    connection_id = %conn.id(),
                    channel = %channel,
                    idle_ms = duration_ms(conn.idle_for(now)),
                    "Client not responding"
                );
            }

            let ping: Arc<str> = Arc::from(PING_FRAME);
            let timeout = self.send_timeout;
            let results = join_all(alive.iter().map(|conn| {
                let ping = Arc::clone(&ping);
                async move { conn.send_text(ping, timeout).await }
            }))
            .await;

            let mut failed = Vec::new();
            for (conn, result) in alive.iter().zip(results) {
                match result {
                    Ok(()) => {
                        report.pinged += 1;
                        self.metrics.record_ping();
                    }
                    Err(e) => {
                        warn!(connection_id = %conn.id(), channel = %channel, error = %e, "Ping failed");
                        self.metrics.record_send_failure();
                        failed.push(Arc::clone(conn));
                    }
                }
            }

            let stale_removed = retire(&self.registry, &self.metrics, &channel, &stale).await;
            for _ in 0..stale_removed {
                self.metrics.record_stale_eviction();
            }
            report.stale += stale_removed;
            report.failed += retire(&self.registry, &self.metrics, &channel, &failed).await;
        }

        report
    }
}
