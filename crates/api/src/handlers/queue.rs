//! Handlers for the in-memory job queue.

use atelier_core::error::CoreError;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/queue
///
/// Every tracked job, newest submission first.
pub async fn list_jobs(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let jobs = state.comfyui_manager.snapshot().await;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/queue/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(prompt_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job = state
        .comfyui_manager
        .job(&prompt_id)
        .await
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: prompt_id,
        }))?;
    Ok(Json(DataResponse { data: job }))
}
