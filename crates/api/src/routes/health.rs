//! Liveness check, mounted at the root rather than under `/api/v1`.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` while the ComfyUI event channel is down.
    pub status: &'static str,
    pub version: &'static str,
    pub engine_connected: bool,
    /// Jobs currently held in memory, finished ones included.
    pub tracked_jobs: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let manager = &state.comfyui_manager;
    let engine_connected = manager.is_connected();

    Json(HealthResponse {
        status: if engine_connected { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        engine_connected,
        tracked_jobs: manager.registry().len().await,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
