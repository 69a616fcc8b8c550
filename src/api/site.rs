//! Service health endpoint
//!
//! - GET /api/v1/health - Status, version, uptime and request count

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::middleware::AppState;
use crate::db;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the database does not answer
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

/// GET /api/v1/health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match db::ping(&state.pool).await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!("Health check database ping failed: {:#}", e);
            "degraded"
        }
    };

    let stats = &state.request_stats;
    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: stats.uptime_seconds(),
        total_requests: stats.total_requests(),
        avg_response_time_ms: (stats.avg_response_time_us() / 10.0).round() / 100.0,
    })
}
