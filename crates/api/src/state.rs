use std::sync::Arc;

use atelier_comfyui::manager::ComfyUIManager;

use crate::gallery::GalleryStore;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// ComfyUI connection manager and job registry.
    pub comfyui_manager: Arc<ComfyUIManager>,
    /// Image gallery; also the artifact store the manager writes to.
    pub gallery: Arc<GalleryStore>,
}
