//! Fanout Server - HTTP and WebSocket route layer for the fanout hub.
//!
//! Upgrades WebSocket requests onto channels of a shared
//! [`ConnectionManager`](fanout_hub::ConnectionManager) and exposes a small
//! HTTP surface for producers and operators.
//!
//! # Routes
//!
//! - `GET /ws` - Subscribe on the default channel
//! - `GET /ws/{channel}` - Subscribe on a named channel
//! - `POST /api/channels/{channel}/publish` - Fan a JSON payload out
//! - `GET /api/ws/stats` - Hub metrics and channel sizes
//! - `GET /health` - Liveness probe

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;
pub mod ws;

pub use config::ServerConfig;
pub use error::ServerError;
pub use routes::router;
pub use server::Server;
pub use state::AppState;
