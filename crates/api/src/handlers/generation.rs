//! Handlers for submitting and cancelling generations.
//!
//! Routes:
//! - `POST /generate` -- forward a workflow to ComfyUI and track it
//! - `POST /cancel`   -- ask ComfyUI to stop a tracked job

use atelier_comfyui::manager::CancelAction;
use atelier_core::error::CoreError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// ComfyUI workflow graph in API format, forwarded untouched.
    pub prompt: serde_json::Value,
    /// Caller data stored with the job and next to its image.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub prompt_id: String,
}

/// Body of `POST /cancel`.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub prompt_id: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub prompt_id: String,
    pub action: CancelAction,
}

/// POST /api/v1/generate
///
/// Returns 201 with the ComfyUI prompt id. The job starts `pending` and
/// advances as ComfyUI reports progress. Fails with 502 when ComfyUI
/// rejects the workflow or is unreachable; no job is created then.
pub async fn generate(
    State(state): State<AppState>,
    Json(input): Json<GenerateRequest>,
) -> AppResult<impl IntoResponse> {
    if !input.prompt.is_object() {
        return Err(AppError::Core(CoreError::Validation(
            "prompt must be a workflow graph object".to_string(),
        )));
    }

    let prompt_id = state
        .comfyui_manager
        .submit(&input.prompt, input.metadata)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: GenerateResponse { prompt_id },
        }),
    ))
}

/// POST /api/v1/cancel
///
/// Forwards the cancellation to ComfyUI. The job itself is finished by
/// the resulting events (or the staleness sweep), not by this call.
pub async fn cancel(
    State(state): State<AppState>,
    Json(input): Json<CancelRequest>,
) -> AppResult<impl IntoResponse> {
    let action = state.comfyui_manager.cancel(&input.prompt_id).await?;

    Ok(Json(DataResponse {
        data: CancelResponse {
            prompt_id: input.prompt_id,
            action,
        },
    }))
}
