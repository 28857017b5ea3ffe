//! Opening the ComfyUI event channel.
//!
//! ComfyUI pushes every progress event and image frame over `GET /ws`,
//! addressed by the `clientId` query parameter. Frames for a prompt go
//! only to the client id it was submitted under.

use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// An open event channel.
pub type ComfyUIStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Where and as whom to open the event channel.
pub struct ComfyUIClient {
    ws_url: String,
    client_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    #[error("Failed to connect to ComfyUI at {ws_url}: {source}")]
    Connect {
        ws_url: String,
        #[source]
        source: tungstenite::Error,
    },
}

impl ComfyUIClient {
    /// `ws_url` is the server's WebSocket base, e.g. `ws://host:8188`.
    pub fn new(ws_url: String, client_id: String) -> Self {
        Self { ws_url, client_id }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Full handshake URL, `<ws_url>/ws?clientId=<id>`.
    pub fn channel_url(&self) -> String {
        format!("{}/ws?clientId={}", self.ws_url, self.client_id)
    }

    pub async fn connect(&self) -> Result<ComfyUIStream, ComfyUIClientError> {
        let (stream, _response) = connect_async(self.channel_url()).await.map_err(|source| {
            ComfyUIClientError::Connect {
                ws_url: self.ws_url.clone(),
                source,
            }
        })?;

        tracing::info!(
            ws_url = %self.ws_url,
            client_id = %self.client_id,
            "Connected to ComfyUI event channel",
        );
        Ok(stream)
    }
}
