//! Handlers for ComfyUI connectivity and endpoint configuration.

use atelier_comfyui::endpoint::EngineEndpoint;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct EngineStatus {
    /// Whether the event channel to ComfyUI is open.
    pub connected: bool,
    pub url: String,
}

/// Body of `POST /config`.
#[derive(Debug, Deserialize)]
pub struct UpdateEngineConfig {
    /// New ComfyUI base URL, e.g. `http://gpu-box:8188`.
    pub url: String,
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let endpoint = state.comfyui_manager.endpoint().await;
    Ok(Json(DataResponse {
        data: EngineStatus {
            connected: state.comfyui_manager.is_connected(),
            url: endpoint.url,
        },
    }))
}

/// GET /api/v1/config
pub async fn get_config(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let endpoint = state.comfyui_manager.endpoint().await;
    Ok(Json(DataResponse { data: endpoint }))
}

/// POST /api/v1/config
///
/// Validates the URL, then reconnects to the new server. Tracked jobs are
/// kept. Returns 400 for a URL that is not http(s) or has no host.
pub async fn update_config(
    State(state): State<AppState>,
    Json(input): Json<UpdateEngineConfig>,
) -> AppResult<impl IntoResponse> {
    let endpoint = EngineEndpoint::parse(&input.url)?;
    state.comfyui_manager.reconfigure(endpoint.clone()).await;
    Ok(Json(DataResponse { data: endpoint }))
}
