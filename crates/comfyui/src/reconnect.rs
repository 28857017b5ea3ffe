//! Reconnection logic for the ComfyUI event channel.
//!
//! The engine may restart or drop the socket at any time. The stream
//! consumer calls [`reconnect_loop`] to keep retrying, sleeping
//! [`ReconnectConfig::delay`] between attempts, until either a
//! connection is established or the [`CancellationToken`] fires.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{ComfyUIClient, ComfyUIStream};

/// Retry pacing for the event channel.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay between connection attempts.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
        }
    }
}

impl ReconnectConfig {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }
}

/// Connect to the engine, retrying indefinitely at a fixed pace.
///
/// The first attempt is made immediately. Returns the open stream
/// once a connection succeeds, or `None` if `cancel` is triggered first.
pub async fn reconnect_loop(
    client: &ComfyUIClient,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Option<ComfyUIStream> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        tracing::debug!(
            ws_url = %client.ws_url(),
            attempt,
            "Connecting to ComfyUI",
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(ws_url = %client.ws_url(), "Reconnect cancelled");
                return None;
            }
            result = client.connect() => {
                match result {
                    Ok(stream) => {
                        if attempt > 1 {
                            tracing::info!(attempt, "Reconnected to ComfyUI");
                        }
                        return Some(stream);
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            delay_ms = config.delay.as_millis() as u64,
                            "Connect attempt {attempt} failed",
                        );
                    }
                }
            }
        }

        // Wait before the next attempt, respecting cancellation.
        if !pause(config.delay, cancel).await {
            return None;
        }
    }
}

/// Sleep for `delay` unless `cancel` fires first.
///
/// Returns `false` when cancelled.
pub async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
