use axum::routing::get;
use axum::Router;

use crate::handlers::engine;
use crate::state::AppState;

/// ```text
/// GET    /status          -> get_status
/// GET    /config          -> get_config
/// POST   /config          -> update_config
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(engine::get_status))
        .route("/config", get(engine::get_config).post(engine::update_config))
}
