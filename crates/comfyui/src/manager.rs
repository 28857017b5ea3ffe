//! ComfyUI connection manager.
//!
//! [`ComfyUIManager`] owns the single event-channel connection to the
//! configured ComfyUI server (connect -> process -> reconnect loop), the
//! job registry, the staleness sweep and the submission gateway. The
//! endpoint can be swapped at runtime with
//! [`ComfyUIManager::reconfigure`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use atelier_core::artifact::ArtifactStore;
use atelier_core::job::Job;
use atelier_core::registry::{InsertOutcome, JobRegistry};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::client::ComfyUIClient;
use crate::config::TrackerConfig;
use crate::endpoint::EngineEndpoint;
use crate::processor::{process_messages, StreamEnd};
use crate::reconnect::{pause, reconnect_loop, ReconnectConfig};
use crate::supervisor::FinalizationSupervisor;
use crate::tracker::JobTracker;

/// How long shutdown and reconfiguration wait for a task to exit.
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Manages the connection to one ComfyUI server and the jobs sent to it.
///
/// Created once at application startup via [`ComfyUIManager::start`].
/// The returned `Arc` can be cheaply cloned into request handlers.
pub struct ComfyUIManager {
    registry: Arc<JobRegistry>,
    tracker: Arc<JobTracker>,
    supervisor: Arc<FinalizationSupervisor>,
    endpoint: RwLock<EngineEndpoint>,
    /// Shared HTTP pool for submissions and cancellations.
    http: reqwest::Client,
    /// Sent with every prompt and in the WebSocket handshake, so the
    /// server routes this client's frames back to it.
    client_id: String,
    connected: Arc<AtomicBool>,
    reconnect: ReconnectConfig,
    connection: Mutex<Option<ConnectionTask>>,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
}

/// The running connection task and its cancel handle.
struct ConnectionTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// What [`ComfyUIManager::cancel`] asked the server to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelAction {
    /// The job was executing; the server was asked to interrupt it.
    Interrupted,
    /// The job was queued; the server was asked to drop it.
    Dequeued,
}

impl ComfyUIManager {
    /// Spawn the connection task and the staleness sweep.
    ///
    /// Returns a shared handle that is safe to clone into Axum state.
    pub fn start(
        endpoint: EngineEndpoint,
        store: Arc<dyn ArtifactStore>,
        config: TrackerConfig,
    ) -> Arc<Self> {
        let config = config.normalized();
        let cancel = CancellationToken::new();
        let registry = Arc::new(JobRegistry::new());
        let reconnect = ReconnectConfig::fixed(config.reconnect_delay);
        let supervisor =
            FinalizationSupervisor::new(Arc::clone(&registry), config, cancel.child_token());
        let tracker = Arc::new(JobTracker::new(
            Arc::clone(&registry),
            store,
            Arc::clone(&supervisor),
        ));

        let sweep_handle = tokio::spawn(Arc::clone(&supervisor).run_sweep());

        let client_id = uuid::Uuid::new_v4().to_string();
        let connected = Arc::new(AtomicBool::new(false));
        let connection = spawn_connection(
            ComfyUIClient::new(endpoint.ws_url.clone(), client_id.clone()),
            Arc::clone(&tracker),
            Arc::clone(&connected),
            reconnect.clone(),
            cancel.child_token(),
        );

        let manager = Arc::new(Self {
            registry,
            tracker,
            supervisor,
            endpoint: RwLock::new(endpoint),
            http: reqwest::Client::new(),
            client_id,
            connected,
            reconnect,
            connection: Mutex::new(Some(connection)),
            sweep_handle: Mutex::new(Some(sweep_handle)),
            cancel,
        });

        tracing::info!(client_id = %manager.client_id, "ComfyUI manager started");
        manager
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Whether the event channel is currently open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub async fn endpoint(&self) -> EngineEndpoint {
        self.endpoint.read().await.clone()
    }

    /// Forward a workflow to the server and start tracking it.
    ///
    /// No job is created when the server rejects the request.
    pub async fn submit(
        &self,
        workflow: &serde_json::Value,
        metadata: serde_json::Value,
    ) -> Result<String, ComfyUIManagerError> {
        let endpoint = self.endpoint().await;
        let response = ComfyUIApi::new(&self.http, &endpoint)
            .queue_prompt(workflow, &self.client_id)
            .await
            .map_err(ComfyUIManagerError::SubmitFailed)?;

        match self.registry.insert(response.prompt_id.clone(), metadata).await {
            InsertOutcome::Inserted => {
                tracing::info!(
                    prompt_id = %response.prompt_id,
                    queue_number = response.number,
                    "Workflow submitted to ComfyUI",
                );
            }
            InsertOutcome::AlreadyExists => {
                tracing::warn!(
                    prompt_id = %response.prompt_id,
                    "ComfyUI returned a prompt id that is already tracked",
                );
            }
        }

        Ok(response.prompt_id)
    }

    /// Jobs ordered newest first.
    pub async fn snapshot(&self) -> Vec<Job> {
        self.registry.snapshot().await
    }

    pub async fn job(&self, prompt_id: &str) -> Option<Job> {
        self.registry.get(prompt_id).await
    }

    /// Ask the server to stop a tracked job.
    ///
    /// The running job is interrupted; a queued one is removed from the
    /// server queue. The registry is left alone: the job finishes through
    /// the usual events or the staleness sweep.
    pub async fn cancel(&self, prompt_id: &str) -> Result<CancelAction, ComfyUIManagerError> {
        let job = self
            .registry
            .get(prompt_id)
            .await
            .ok_or_else(|| ComfyUIManagerError::JobNotFound(prompt_id.to_string()))?;
        if job.is_completed() {
            return Err(ComfyUIManagerError::JobFinished(prompt_id.to_string()));
        }

        let endpoint = self.endpoint().await;
        let api = ComfyUIApi::new(&self.http, &endpoint);
        let is_active = self.registry.active().await.as_deref() == Some(prompt_id);
        let action = if is_active {
            api.interrupt()
                .await
                .map_err(ComfyUIManagerError::CancelFailed)?;
            CancelAction::Interrupted
        } else {
            api.delete_queued(prompt_id)
                .await
                .map_err(ComfyUIManagerError::CancelFailed)?;
            CancelAction::Dequeued
        };

        tracing::info!(prompt_id = %prompt_id, ?action, "Cancellation forwarded to ComfyUI");
        Ok(action)
    }

    /// Point the manager at a different server.
    ///
    /// Tears down the current connection task and starts a new one. The
    /// registry is kept as is.
    pub async fn reconfigure(&self, endpoint: EngineEndpoint) {
        let mut slot = self.connection.lock().await;
        if let Some(task) = slot.take() {
            stop_task(task.handle, &task.cancel).await;
        }
        self.connected.store(false, Ordering::Relaxed);

        *self.endpoint.write().await = endpoint.clone();
        tracing::info!(url = %endpoint.url, ws_url = %endpoint.ws_url, "ComfyUI endpoint changed");

        if self.cancel.is_cancelled() {
            return;
        }
        *slot = Some(spawn_connection(
            ComfyUIClient::new(endpoint.ws_url, self.client_id.clone()),
            Arc::clone(&self.tracker),
            Arc::clone(&self.connected),
            self.reconnect.clone(),
            self.cancel.child_token(),
        ));
    }

    /// Gracefully shut down the connection task, the sweep and all timers.
    ///
    /// Cancels the master token, then waits up to 5 seconds per task
    /// for a clean exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down ComfyUI manager");
        self.cancel.cancel();
        self.supervisor.shutdown();

        if let Some(task) = self.connection.lock().await.take() {
            stop_task(task.handle, &task.cancel).await;
        }
        if let Some(handle) = self.sweep_handle.lock().await.take() {
            stop_task(handle, &self.cancel).await;
        }
        self.connected.store(false, Ordering::Relaxed);

        tracing::info!("ComfyUI manager shut down complete");
    }
}

/// Spawn a long-lived task that connects, processes messages, and
/// automatically reconnects when the connection drops.
fn spawn_connection(
    client: ComfyUIClient,
    tracker: Arc<JobTracker>,
    connected: Arc<AtomicBool>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) -> ConnectionTask {
    let task_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        tracing::info!(ws_url = %client.ws_url(), "Starting connection task");
        run_connection_loop(&client, &tracker, &connected, &reconnect, &task_cancel).await;
        tracing::info!(ws_url = %client.ws_url(), "Connection task exited");
    });

    ConnectionTask { handle, cancel }
}

/// Core connection loop: connect -> process messages -> reconnect.
///
/// Runs until the cancellation token is triggered. Losing the
/// connection never touches the registry.
async fn run_connection_loop(
    client: &ComfyUIClient,
    tracker: &JobTracker,
    connected: &AtomicBool,
    reconnect: &ReconnectConfig,
    cancel: &CancellationToken,
) {
    loop {
        let Some(mut ws_stream) = reconnect_loop(client, reconnect, cancel).await else {
            return; // cancelled
        };
        connected.store(true, Ordering::Relaxed);

        let end = process_messages(&mut ws_stream, tracker, cancel).await;
        connected.store(false, Ordering::Relaxed);

        if end == StreamEnd::Cancelled {
            let _ = ws_stream.close(None).await;
            return;
        }

        let tracked_jobs = tracker.registry().len().await;
        tracing::warn!(
            delay_ms = reconnect.delay.as_millis() as u64,
            tracked_jobs,
            "Connection to ComfyUI lost, reconnecting",
        );
        if !pause(reconnect.delay, cancel).await {
            return;
        }
    }
}

/// Cancel a task and wait for it, aborting it if it does not stop in time.
async fn stop_task(handle: JoinHandle<()>, cancel: &CancellationToken) {
    cancel.cancel();
    let abort = handle.abort_handle();
    if tokio::time::timeout(TASK_STOP_TIMEOUT, handle).await.is_err() {
        tracing::warn!("Task did not stop in time, aborting");
        abort.abort();
    }
}

/// Errors that can occur when interacting with the manager.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIManagerError {
    /// The workflow submission HTTP call failed.
    #[error("Failed to submit workflow: {0}")]
    SubmitFailed(#[source] ComfyUIApiError),

    /// The cancellation HTTP call failed.
    #[error("Failed to cancel execution: {0}")]
    CancelFailed(#[source] ComfyUIApiError),

    /// No job with this prompt id is tracked.
    #[error("Job {0} not found")]
    JobNotFound(String),

    /// The job already reached its terminal state.
    #[error("Job {0} has already finished")]
    JobFinished(String),
}
