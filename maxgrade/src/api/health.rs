//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("maxgrade")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Generation model in use
    pub model: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Number of live grading sessions
    pub sessions: usize,
    /// Summary of the last grading failure, if any (no upstream detail)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let last_error = state.last_error.read().await.clone();
    let sessions = state.sessions.read().await.len();

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "maxgrade".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.grader.model_name().to_string(),
        uptime_seconds,
        sessions,
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
