pub mod engine;
pub mod gallery;
pub mod generation;
pub mod health;
pub mod queue;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /generate                        submit a workflow (POST)
/// /cancel                          forward a cancellation (POST)
///
/// /queue                           list tracked jobs
/// /queue/{id}                      get one job
///
/// /status                          ComfyUI connectivity
/// /config                          get, update ComfyUI endpoint
///
/// /gallery                         list images
/// /gallery/{filename}              delete image
/// /gallery/batch-delete            delete several images (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(generation::router())
        .merge(engine::router())
        .nest("/queue", queue::router())
        .nest("/gallery", gallery::router())
}
