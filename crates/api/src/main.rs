use std::net::SocketAddr;
use std::sync::Arc;

use atelier_comfyui::endpoint::EngineEndpoint;
use atelier_comfyui::manager::ComfyUIManager;
use atelier_core::artifact::ArtifactStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_api::config::ServerConfig;
use atelier_api::gallery::GalleryStore;
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    // LOG_FORMAT=json switches to one JSON object per line for log shippers.
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "atelier_api=debug,atelier_comfyui=debug,tower_http=debug".into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        comfyui_url = %config.comfyui_url,
        gallery_dir = %config.gallery_dir.display(),
        "Loaded server configuration",
    );

    let endpoint = EngineEndpoint::parse(&config.comfyui_url)
        .unwrap_or_else(|e| panic!("Invalid COMFYUI_URL '{}': {e}", config.comfyui_url));

    // --- Gallery ---
    let gallery = Arc::new(GalleryStore::new(config.gallery_dir.clone()));
    gallery
        .ensure_dir()
        .await
        .expect("Failed to create gallery directory");

    // --- ComfyUI manager ---
    let comfyui_manager = ComfyUIManager::start(
        endpoint,
        Arc::clone(&gallery) as Arc<dyn ArtifactStore>,
        config.tracker.clone(),
    );

    // --- App state ---
    let state = AppState {
        comfyui_manager: Arc::clone(&comfyui_manager),
        gallery,
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // HTTP is down; stop the engine connection and its timers.
    comfyui_manager.shutdown().await;
    tracing::info!("Shutdown complete");
}

/// Resolve on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        () = interrupt => "SIGINT",
        () = terminate => "SIGTERM",
    };
    tracing::info!(signal, "Shutdown requested, draining connections");
}
