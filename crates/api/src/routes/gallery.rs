//! Route definitions for the `/gallery` resource.
//!
//! The image files themselves are served by a static file service at
//! the root-level `/gallery` path, see [`crate::router`].

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::gallery;
use crate::state::AppState;

/// Routes mounted at `/gallery`.
///
/// ```text
/// GET    /                -> list_images
/// DELETE /{filename}      -> delete_image
/// POST   /batch-delete    -> batch_delete
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(gallery::list_images))
        .route("/batch-delete", post(gallery::batch_delete))
        .route("/{filename}", delete(gallery::delete_image))
}
