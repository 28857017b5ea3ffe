//! Correlation engine: applies ComfyUI frames to tracked jobs.
//!
//! Control frames name their job (except `progress`); binary payloads
//! never do. [`JobTracker`] keeps the active-job pointer current and
//! uses [`atelier_core::correlation`] to decide which job owns each
//! payload. Delayed transitions are delegated to the
//! [`FinalizationSupervisor`].

use std::sync::Arc;
use std::time::Duration;

use atelier_core::artifact::{ArtifactRequest, ArtifactStore};
use atelier_core::correlation::{match_payload, CorrelationContext, MatchRule};
use atelier_core::job::{percent_of, BindOutcome};
use atelier_core::registry::JobRegistry;
use tokio::time::Instant;

use crate::frames::Payload;
use crate::messages::ComfyUIMessage;
use crate::supervisor::FinalizationSupervisor;

/// Applies inbound frames to the [`JobRegistry`].
///
/// Frames must be fed in arrival order from a single task; the pointer
/// heuristics depend on it.
pub struct JobTracker {
    registry: Arc<JobRegistry>,
    store: Arc<dyn ArtifactStore>,
    supervisor: Arc<FinalizationSupervisor>,
    rescue_window: Duration,
}

impl JobTracker {
    pub fn new(
        registry: Arc<JobRegistry>,
        store: Arc<dyn ArtifactStore>,
        supervisor: Arc<FinalizationSupervisor>,
    ) -> Self {
        let rescue_window = supervisor.config().rescue_window;
        Self {
            registry,
            store,
            supervisor,
            rescue_window,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Apply one parsed control message.
    pub async fn handle_message(&self, msg: ComfyUIMessage) {
        match msg {
            ComfyUIMessage::ExecutionStart(data) => {
                self.on_execution_start(&data.prompt_id).await;
            }
            ComfyUIMessage::Progress(data) => {
                self.on_progress(data.value, data.max).await;
            }
            ComfyUIMessage::ExecutionSuccess(data) => {
                self.on_execution_success(&data.prompt_id).await;
            }
            ComfyUIMessage::ExecutionError(data) => {
                tracing::error!(
                    prompt_id = %data.prompt_id,
                    node_id = ?data.node_id,
                    error_type = %data.exception_type,
                    error_message = %data.exception_message,
                    "Execution error",
                );
                self.on_failure(&data.prompt_id, data.reason()).await;
            }
            ComfyUIMessage::ExecutionInterrupted(data) => {
                tracing::info!(
                    prompt_id = %data.prompt_id,
                    node_id = ?data.node_id,
                    "Execution interrupted",
                );
                self.on_failure(&data.prompt_id, "interrupted".to_string())
                    .await;
            }
            ComfyUIMessage::Executing(data) => {
                tracing::trace!(
                    prompt_id = ?data.prompt_id,
                    node = ?data.node,
                    "Executing node",
                );
            }
            ComfyUIMessage::Executed(data) => {
                tracing::debug!(
                    prompt_id = %data.prompt_id,
                    node = %data.node,
                    "Node executed with output",
                );
            }
            ComfyUIMessage::ExecutionCached(data) => {
                tracing::debug!(
                    prompt_id = %data.prompt_id,
                    cached_nodes = data.nodes.len(),
                    "Execution used cache",
                );
            }
            ComfyUIMessage::Status(data) => {
                tracing::debug!(
                    queue_remaining = data.queue_remaining(),
                    "ComfyUI queue status",
                );
            }
        }
    }

    /// Attribute an anonymous payload and bind it as the job's output.
    pub async fn handle_payload(&self, payload: Payload) {
        let view = self.registry.view().await;
        let ctx = CorrelationContext {
            jobs: &view.jobs,
            active: view.active.as_deref(),
            now: Instant::now(),
            rescue_window: self.rescue_window,
        };

        let Some(matched) = match_payload(&ctx) else {
            tracing::warn!(
                bytes = payload.data.len(),
                active = ?view.active,
                tracked = view.jobs.len(),
                "Discarding unattributable payload",
            );
            return;
        };

        let job_id = matched.job_id;
        let metadata = view
            .jobs
            .iter()
            .find(|job| job.id == job_id)
            .map(|job| job.metadata.clone())
            .unwrap_or(serde_json::Value::Null);

        let request = ArtifactRequest {
            job_id: &job_id,
            format: payload.format,
            metadata: &metadata,
        };

        let artifact = match self.store.store(&payload.data, &request).await {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::error!(
                    prompt_id = %job_id,
                    error = %e,
                    "Failed to store artifact",
                );
                self.on_failure(&job_id, format!("artifact storage failed: {e}"))
                    .await;
                return;
            }
        };

        let filename = artifact.filename.clone();
        let outcome = self
            .registry
            .mutate(&job_id, |job| job.bind_output(artifact))
            .await;

        match outcome {
            Some(BindOutcome::Bound) | Some(BindOutcome::Rescued) => {
                self.registry.clear_active_if(&job_id).await;
                self.supervisor.cancel_grace(&job_id);
                self.supervisor.schedule_retention(&job_id);
                if matched.rule == MatchRule::RescueWindow {
                    tracing::info!(
                        prompt_id = %job_id,
                        filename = %filename,
                        "Late payload rescued forced job",
                    );
                } else {
                    tracing::info!(
                        prompt_id = %job_id,
                        filename = %filename,
                        rule = matched.rule.as_str(),
                        "Output bound",
                    );
                }
            }
            Some(BindOutcome::Rejected) => {
                tracing::warn!(
                    prompt_id = %job_id,
                    filename = %filename,
                    "Job already finished, keeping its first output",
                );
            }
            None => {
                tracing::warn!(
                    prompt_id = %job_id,
                    filename = %filename,
                    "Job retired before its payload could be bound",
                );
            }
        }
    }

    // ---- individual message handlers ----

    async fn on_execution_start(&self, prompt_id: &str) {
        self.registry.set_active(prompt_id).await;
        match self.registry.mutate(prompt_id, |job| job.start()).await {
            Some(true) => tracing::info!(prompt_id = %prompt_id, "Execution started"),
            Some(false) => {
                tracing::debug!(prompt_id = %prompt_id, "Start notice for a job already past pending");
            }
            None => tracing::debug!(prompt_id = %prompt_id, "Start notice for an untracked prompt"),
        }
    }

    async fn on_progress(&self, value: i64, max: i64) {
        let Some(percent) = percent_of(value, max) else {
            tracing::debug!(value, max, "Ignoring progress with non-positive max");
            return;
        };
        let Some(active) = self.registry.active().await else {
            tracing::trace!(value, max, "Progress with no active job");
            return;
        };
        let applied = self
            .registry
            .mutate(&active, |job| job.set_progress(percent))
            .await;
        if applied == Some(true) {
            tracing::debug!(prompt_id = %active, percent, "Generation progress");
        }
    }

    async fn on_execution_success(&self, prompt_id: &str) {
        if self.registry.get(prompt_id).await.is_none() {
            self.registry.clear_active_if(prompt_id).await;
            tracing::debug!(prompt_id = %prompt_id, "Success notice for an untracked prompt");
            return;
        }
        tracing::info!(
            prompt_id = %prompt_id,
            "Execution succeeded, awaiting payload",
        );
        self.supervisor.start_grace(prompt_id);
    }

    async fn on_failure(&self, prompt_id: &str, reason: String) {
        let failed = self
            .registry
            .mutate(prompt_id, |job| job.fail(reason))
            .await;
        self.registry.clear_active_if(prompt_id).await;

        if failed == Some(true) {
            self.supervisor.cancel_grace(prompt_id);
            self.supervisor.schedule_retention(prompt_id);
            tracing::warn!(prompt_id = %prompt_id, "Job completed without output after failure");
        }
    }
}
