//! Fanout Hub - channel-scoped connection registry with liveness-monitored broadcast.
//!
//! This crate multiplexes many long-lived client connections over a small set of
//! named channels. Producers push payloads onto a channel and every live
//! subscriber receives a copy; a background monitor pings subscribers and evicts
//! the ones that stop answering.
//!
//! # Components
//!
//! - [`connection`]: A single client socket handle tagged with id and channel
//! - [`registry`]: Channel name to connection set mapping
//! - [`broadcaster`]: Fan-out with per-connection failure isolation
//! - [`liveness`]: Periodic ping and stale-connection eviction
//! - [`manager`]: The [`ConnectionManager`] facade composing the above
//! - [`messages`]: Outbound envelope and inbound client messages
//! - [`config`]: Hub configuration
//! - [`metrics`]: Hub metrics
//!
//! # Example
//!
//! ```rust,no_run
//! use fanout_hub::{ConnectionManager, Envelope, HubConfig};
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> Result<(), fanout_hub::HubError> {
//! let manager = ConnectionManager::new(HubConfig::default())?;
//! manager.start().await?;
//!
//! let (tx, _rx) = mpsc::channel(100);
//! let id = manager.connect(tx, "metrics").await?;
//!
//! let report = manager
//!     .broadcast("metrics", &Envelope::metrics_update(serde_json::json!([1, 2, 3])))
//!     .await?;
//! assert_eq!(report.delivered, 1);
//!
//! manager.disconnect(id, "metrics").await;
//! manager.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod broadcaster;
pub mod config;
pub mod connection;
pub mod error;
pub mod liveness;
pub mod manager;
pub mod messages;
pub mod metrics;
pub mod registry;

pub use broadcaster::{BroadcastReport, Broadcaster, Delivery};
pub use config::{ConfigError, HubConfig};
pub use connection::{Connection, ConnectionId, Frame};
pub use error::HubError;
pub use liveness::{LivenessMonitor, SweepReport};
pub use manager::ConnectionManager;
pub use messages::{ClientMessage, Envelope, PersonalMessage};
pub use metrics::{HubMetrics, HubMetricsSnapshot};
pub use registry::ChannelRegistry;
