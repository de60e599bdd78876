//! HTTP routes.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use fanout_hub::{BroadcastReport, HubMetricsSnapshot};
use serde::Serialize;
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::error::ServerError;
use crate::state::AppState;
use crate::ws::{ws_channel_handler, ws_default_handler};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Whether the liveness monitor is running.
    pub monitoring: bool,
}

/// Hub statistics response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Counter snapshot.
    pub metrics: HubMetricsSnapshot,
    /// Connections per channel.
    pub channels: BTreeMap<String, usize>,
    /// Total registered connections.
    pub total_connections: usize,
    /// Time the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_default_handler))
        .route("/ws/{channel}", get(ws_channel_handler))
        .route("/api/channels/{channel}/publish", post(publish))
        .route("/api/ws/stats", get(stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        monitoring: state.manager.is_running().await,
    })
}

async fn publish(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<BroadcastReport>, ServerError> {
    let report = state.manager.broadcast(&channel, &payload).await?;
    debug!(
        channel,
        recipients = report.recipients,
        delivered = report.delivered,
        evicted = report.evicted,
        "Published payload"
    );
    Ok(Json(report))
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let mut channels = BTreeMap::new();
    for channel in state.manager.channels().await {
        let size = state.manager.channel_size(&channel).await;
        channels.insert(channel, size);
    }

    Json(StatsResponse {
        metrics: state.manager.metrics().snapshot(),
        channels,
        total_connections: state.manager.connection_count().await,
        timestamp: Utc::now(),
    })
}
