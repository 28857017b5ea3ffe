//! HTTP calls into ComfyUI.
//!
//! Only the three endpoints the tracker needs: `/prompt` to queue a
//! workflow, `/queue` to drop a queued prompt and `/interrupt` to stop
//! the one running now.

use serde::Deserialize;

use crate::endpoint::EngineEndpoint;

/// Borrowed view of a server plus the pooled HTTP client to reach it.
///
/// Built per call from the manager's current endpoint, so a
/// reconfiguration takes effect on the next request.
pub struct ComfyUIApi<'a> {
    http: &'a reqwest::Client,
    endpoint: &'a EngineEndpoint,
}

/// Body of a successful `POST /prompt`.
#[derive(Debug, Deserialize)]
pub struct QueuedPrompt {
    pub prompt_id: String,
    /// Queue position; older servers omit it.
    #[serde(default)]
    pub number: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// Network, DNS or TLS failure, or an unparseable body.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError { status: u16, body: String },
}

impl<'a> ComfyUIApi<'a> {
    pub fn new(http: &'a reqwest::Client, endpoint: &'a EngineEndpoint) -> Self {
        Self { http, endpoint }
    }

    /// Queue `workflow` under `client_id`.
    ///
    /// The client id must match the one on the event channel, otherwise
    /// the server streams this prompt's frames to nobody.
    pub async fn queue_prompt(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<QueuedPrompt, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });
        let response = self.post("prompt").json(&body).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<QueuedPrompt>().await?)
    }

    /// Drop a prompt that has not started yet.
    pub async fn delete_queued(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let body = serde_json::json!({ "delete": [prompt_id] });
        let response = self.post("queue").json(&body).send().await?;
        ensure_success(response).await.map(drop)
    }

    /// Stop whatever is executing right now. Not prompt-specific.
    pub async fn interrupt(&self) -> Result<(), ComfyUIApiError> {
        let response = self.post("interrupt").send().await?;
        ensure_success(response).await.map(drop)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.post(format!("{}/{path}", self.endpoint.url))
    }
}

/// Turn a non-2xx response into [`ComfyUIApiError::ApiError`], keeping
/// the body text for the logs.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ComfyUIApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(ComfyUIApiError::ApiError {
        status: status.as_u16(),
        body,
    })
}
