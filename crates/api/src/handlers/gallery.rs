//! Handlers for the image gallery.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /gallery/batch-delete`.
#[derive(Debug, Deserialize)]
pub struct BatchDeleteRequest {
    pub filenames: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchDeleteResponse {
    /// Names that existed and were removed.
    pub deleted: Vec<String>,
}

/// GET /api/v1/gallery
pub async fn list_images(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let images = state.gallery.list().await?;
    Ok(Json(DataResponse { data: images }))
}

/// DELETE /api/v1/gallery/{filename}
pub async fn delete_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.gallery.delete(&filename).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/gallery/batch-delete
pub async fn batch_delete(
    State(state): State<AppState>,
    Json(input): Json<BatchDeleteRequest>,
) -> AppResult<impl IntoResponse> {
    let deleted = state.gallery.delete_many(&input.filenames).await?;
    tracing::info!(
        requested = input.filenames.len(),
        deleted = deleted.len(),
        "Gallery batch delete",
    );
    Ok(Json(DataResponse {
        data: BatchDeleteResponse { deleted },
    }))
}
