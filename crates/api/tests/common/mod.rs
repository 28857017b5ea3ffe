#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use atelier_comfyui::config::TrackerConfig;
use atelier_comfyui::endpoint::EngineEndpoint;
use atelier_comfyui::manager::ComfyUIManager;
use atelier_core::artifact::ArtifactStore;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use atelier_api::config::ServerConfig;
use atelier_api::gallery::GalleryStore;
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;

/// Nothing listens here; connections are refused immediately.
pub const UNREACHABLE_ENGINE: &str = "http://127.0.0.1:1";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(comfyui_url: &str, gallery: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        comfyui_url: comfyui_url.to_string(),
        gallery_dir: gallery.path().to_path_buf(),
        tracker: TrackerConfig {
            reconnect_delay: Duration::from_millis(200),
            ..TrackerConfig::default()
        },
    }
}

/// A running application plus the handles tests poke at directly.
pub struct TestApp {
    pub router: Router,
    pub manager: Arc<ComfyUIManager>,
    pub gallery: Arc<GalleryStore>,
    /// Keeps the gallery directory alive for the test's duration.
    pub gallery_dir: TempDir,
}

/// Build the full application router with all middleware layers, backed
/// by a temporary gallery directory and a manager pointed at `comfyui_url`.
pub fn build_test_app(comfyui_url: &str) -> TestApp {
    let gallery_dir = tempfile::tempdir().unwrap();
    let config = test_config(comfyui_url, &gallery_dir);

    let gallery = Arc::new(GalleryStore::new(gallery_dir.path()));
    let manager = ComfyUIManager::start(
        EngineEndpoint::parse(&config.comfyui_url).unwrap(),
        Arc::clone(&gallery) as Arc<dyn ArtifactStore>,
        config.tracker.clone(),
    );

    let state = AppState {
        comfyui_manager: Arc::clone(&manager),
        gallery: Arc::clone(&gallery),
    };

    TestApp {
        router: build_app_router(state, &config),
        manager,
        gallery,
        gallery_dir,
    }
}

/// Serve a minimal ComfyUI `/prompt` endpoint. Returns its base URL.
///
/// Prompt ids are `prompt-1`, `prompt-2`, ... A workflow containing the
/// key `"reject"` is answered with 400, as ComfyUI does for invalid graphs.
pub async fn spawn_prompt_mock() -> String {
    let counter = Arc::new(AtomicUsize::new(1));
    let app = Router::new().route(
        "/prompt",
        post(move |Json(body): Json<serde_json::Value>| {
            let counter = Arc::clone(&counter);
            async move {
                if body["prompt"].get("reject").is_some() {
                    return Err((StatusCode::BAD_REQUEST, "invalid prompt"));
                }
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Ok(Json(serde_json::json!({
                    "prompt_id": format!("prompt-{n}"),
                    "number": n,
                })))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn delete(app: &TestApp, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty()).await
}

pub async fn post_json(app: &TestApp, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Body::from(body.to_string())).await
}

async fn send(app: &TestApp, method: Method, uri: &str, body: Body) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
