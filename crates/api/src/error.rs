use atelier_comfyui::endpoint::EndpointError;
use atelier_comfyui::manager::ComfyUIManagerError;
use atelier_core::artifact::StorageError;
use atelier_core::error::CoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `atelier_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A gallery filesystem error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// ComfyUI rejected the request or could not be reached.
    #[error("Engine error: {0}")]
    Engine(String),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<ComfyUIManagerError> for AppError {
    fn from(err: ComfyUIManagerError) -> Self {
        match err {
            ComfyUIManagerError::JobNotFound(id) => {
                AppError::Core(CoreError::NotFound { entity: "Job", id })
            }
            ComfyUIManagerError::JobFinished(id) => {
                AppError::Core(CoreError::Conflict(format!("Job {id} has already finished")))
            }
            err @ (ComfyUIManagerError::SubmitFailed(_) | ComfyUIManagerError::CancelFailed(_)) => {
                AppError::Engine(err.to_string())
            }
        }
    }
}

impl From<EndpointError> for AppError {
    fn from(err: EndpointError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            },

            // --- Gallery storage ---
            AppError::Storage(err) => classify_storage_error(err),

            // --- Upstream engine ---
            AppError::Engine(msg) => {
                tracing::warn!(error = %msg, "ComfyUI request failed");
                (StatusCode::BAD_GATEWAY, "ENGINE_ERROR", msg.clone())
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a gallery error into an HTTP status, error code, and message.
///
/// - A missing file maps to 404.
/// - A rejected filename maps to 400.
/// - Everything else maps to 500 with a sanitized message.
fn classify_storage_error(err: &StorageError) -> (StatusCode, &'static str, String) {
    match err {
        StorageError::NotFound(name) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Image {name} not found"),
        ),
        StorageError::InvalidName(name) => (
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
            format!("Invalid image filename: {name}"),
        ),
        other => {
            tracing::error!(error = %other, "Gallery storage error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}
