//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::sync_back::{SyncBackMode, SyncBackStatsSnapshot};
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub sync_back: SyncBackHealth,
}

#[derive(Debug, Serialize)]
pub struct SyncBackHealth {
    pub mode: SyncBackMode,
    /// Write-back counters per aggregate kind
    pub stats: BTreeMap<String, SyncBackStatsSnapshot>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let stats = state
        .sync_back_stats
        .iter()
        .map(|(kind, stats)| (kind.to_string(), stats.snapshot()))
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "cdb-sync".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        sync_back: SyncBackHealth {
            mode: state.sync_back_mode,
            stats,
        },
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
