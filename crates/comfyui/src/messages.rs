//! Text frames on the ComfyUI event channel.
//!
//! Every control message is `{"type": "<kind>", "data": {...}}`. Kinds
//! outside [`ComfyUIMessage`] (custom-node telemetry and the like) fail
//! to parse; the processor logs and skips them.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ComfyUIMessage {
    /// Queue depth broadcast, sent on connect and whenever the queue moves.
    Status(StatusData),
    /// A prompt left the queue and started running. Marks it active.
    ExecutionStart(PromptRef),
    ExecutionCached(ExecutionCachedData),
    /// Node-level step; `node: None` closes out the prompt.
    Executing(ExecutingData),
    /// Sampler step counter. Carries no usable prompt id, so it is
    /// attributed to whichever job is active.
    Progress(ProgressData),
    Executed(ExecutedData),
    /// The graph finished. The image payload may still be in flight.
    ExecutionSuccess(PromptRef),
    ExecutionError(ExecutionErrorData),
    ExecutionInterrupted(InterruptedData),
}

/// Payload that names a prompt and nothing else the tracker reads.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptRef {
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    status: QueueStatus,
}

#[derive(Debug, Clone, Deserialize)]
struct QueueStatus {
    exec_info: ExecInfo,
}

#[derive(Debug, Clone, Deserialize)]
struct ExecInfo {
    queue_remaining: u32,
}

impl StatusData {
    /// Prompts still waiting or running on the server.
    pub fn queue_remaining(&self) -> u32 {
        self.status.exec_info.queue_remaining
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCachedData {
    pub prompt_id: String,
    /// Nodes whose outputs came from the server cache.
    #[serde(default)]
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    pub value: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    pub node: String,
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionErrorData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub exception_type: String,
    #[serde(default)]
    pub exception_message: String,
}

impl ExecutionErrorData {
    /// `"Type: message"`, or just the message when the type is missing.
    pub fn reason(&self) -> String {
        if self.exception_type.is_empty() {
            self.exception_message.clone()
        } else {
            format!("{}: {}", self.exception_type, self.exception_message)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterruptedData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
}

pub fn parse_message(text: &str) -> Result<ComfyUIMessage, serde_json::Error> {
    serde_json::from_str(text)
}
