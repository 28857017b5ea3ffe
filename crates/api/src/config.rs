use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use atelier_comfyui::config::TrackerConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Base URL of the ComfyUI server (default: `http://127.0.0.1:8188`).
    pub comfyui_url: String,
    /// Directory generated images are written to (default: `./gallery`).
    pub gallery_dir: PathBuf,
    /// Grace periods, retention delays and sweep pacing for job tracking.
    pub tracker: TrackerConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                    |
    /// |-------------------------|----------------------------|
    /// | `HOST`                  | `0.0.0.0`                  |
    /// | `PORT`                  | `3000`                     |
    /// | `CORS_ORIGINS`          | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                       |
    /// | `COMFYUI_URL`           | `http://127.0.0.1:8188`    |
    /// | `GALLERY_DIR`           | `./gallery`                |
    /// | `GRACE_PERIOD_MS`       | `5000`                     |
    /// | `RESCUE_WINDOW_SECS`    | `30`                       |
    /// | `RETENTION_SECS`        | `3`                        |
    /// | `FORCED_RETENTION_SECS` | `60`                       |
    /// | `MAX_JOB_AGE_SECS`      | `900`                      |
    /// | `SWEEP_INTERVAL_SECS`   | `30`                       |
    /// | `RECONNECT_DELAY_SECS`  | `5`                        |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env_or("PORT", 3000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_or("REQUEST_TIMEOUT_SECS", 30);

        let comfyui_url =
            std::env::var("COMFYUI_URL").unwrap_or_else(|_| "http://127.0.0.1:8188".into());
        let gallery_dir = PathBuf::from(
            std::env::var("GALLERY_DIR").unwrap_or_else(|_| "./gallery".into()),
        );

        let tracker = TrackerConfig {
            grace_period: Duration::from_millis(env_or("GRACE_PERIOD_MS", 5_000)),
            rescue_window: Duration::from_secs(env_or("RESCUE_WINDOW_SECS", 30)),
            retention: Duration::from_secs(env_or("RETENTION_SECS", 3)),
            forced_retention: Duration::from_secs(env_or("FORCED_RETENTION_SECS", 60)),
            max_job_age: Duration::from_secs(env_or("MAX_JOB_AGE_SECS", 900)),
            sweep_interval: Duration::from_secs(env_or("SWEEP_INTERVAL_SECS", 30)),
            reconnect_delay: Duration::from_secs(env_or("RECONNECT_DELAY_SECS", 5)),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            comfyui_url,
            gallery_dir,
            tracker,
        }
    }
}

/// Read and parse `key`, falling back to `default` when unset.
///
/// Panics on a value that does not parse; misconfiguration should fail
/// at startup.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid {}: {e}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}
