//! End-to-end tests for `ComfyUIManager` against an in-process mock
//! ComfyUI server (HTTP + WebSocket).

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use atelier_comfyui::api::ComfyUIApiError;
use atelier_comfyui::frames::encode_payload;
use atelier_comfyui::manager::{CancelAction, ComfyUIManager, ComfyUIManagerError};
use atelier_core::artifact::ArtifactStore;
use atelier_core::job::JobStatus;
use common::{fast_config, wait_until, MemoryStore, MockComfyUI};
use serde_json::json;

async fn start(mock: &MockComfyUI) -> (Arc<ComfyUIManager>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    let manager = ComfyUIManager::start(
        mock.endpoint(),
        Arc::clone(&store) as Arc<dyn ArtifactStore>,
        fast_config(),
    );
    wait_until("initial connection", || {
        let manager = Arc::clone(&manager);
        async move { manager.is_connected() }
    })
    .await;
    (manager, store)
}

fn start_frame(id: &str) -> serde_json::Value {
    json!({"type": "execution_start", "data": {"prompt_id": id}})
}

fn success_frame(id: &str) -> serde_json::Value {
    json!({"type": "execution_success", "data": {"prompt_id": id}})
}

// ---------------------------------------------------------------------------
// Test: submission and the WebSocket share one client id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_tracks_job_under_shared_client_id() {
    let mock = MockComfyUI::spawn().await;
    let (manager, _store) = start(&mock).await;

    let id = manager
        .submit(&json!({"3": {"class_type": "KSampler"}}), json!({"prompt": "a fox"}))
        .await
        .unwrap();

    assert_eq!(id, "prompt-1");
    let job = manager.job(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.progress, 0);
    assert_eq!(job.metadata["prompt"], "a fox");

    assert_eq!(mock.prompt_client_ids(), vec![manager.client_id().to_string()]);
    assert_eq!(mock.ws_client_ids(), vec![manager.client_id().to_string()]);

    manager.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: a rejected submission creates no job
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejected_submission_creates_no_job() {
    let mock = MockComfyUI::spawn().await;
    mock.reject_prompts();
    let (manager, _store) = start(&mock).await;

    let result = manager.submit(&json!({}), json!(null)).await;

    assert_matches!(
        result,
        Err(ComfyUIManagerError::SubmitFailed(ComfyUIApiError::ApiError { status: 400, .. }))
    );
    assert!(manager.snapshot().await.is_empty());

    manager.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: events over the socket drive a job to completion with output
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stream_frames_complete_job_with_output() {
    let mock = MockComfyUI::spawn().await;
    let (manager, store) = start(&mock).await;
    let id = manager.submit(&json!({}), json!({"seed": 7})).await.unwrap();

    mock.send_json(start_frame(&id));
    mock.send_json(json!({"type": "progress", "data": {"value": 10, "max": 20}}));
    wait_until("progress to reach 50", || {
        let manager = Arc::clone(&manager);
        let id = id.clone();
        async move { manager.job(&id).await.is_some_and(|job| job.progress == 50) }
    })
    .await;

    mock.send_json(success_frame(&id));
    mock.send_binary(encode_payload(1, 2, b"png-bytes"));

    wait_until("output to be bound", || {
        let manager = Arc::clone(&manager);
        let id = id.clone();
        async move { manager.job(&id).await.is_some_and(|job| job.has_output()) }
    })
    .await;

    let job = manager.job(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.output.unwrap().filename, format!("{id}.png"));
    assert_eq!(
        store.stored.lock().unwrap().as_slice(),
        &[(id.clone(), b"png-bytes".to_vec())]
    );

    manager.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: success without a payload is forced after the grace period
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_payload_forces_completion() {
    let mock = MockComfyUI::spawn().await;
    let (manager, _store) = start(&mock).await;
    let id = manager.submit(&json!({}), json!(null)).await.unwrap();

    mock.send_json(start_frame(&id));
    mock.send_json(success_frame(&id));

    wait_until("job to be forced", || {
        let manager = Arc::clone(&manager);
        let id = id.clone();
        async move { manager.job(&id).await.is_some_and(|job| job.is_forced()) }
    })
    .await;

    // A late payload inside the rescue window still binds.
    mock.send_binary(encode_payload(1, 1, b"late"));
    wait_until("forced job to be rescued", || {
        let manager = Arc::clone(&manager);
        let id = id.clone();
        async move { manager.job(&id).await.is_some_and(|job| job.has_output()) }
    })
    .await;

    manager.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: reconnecting keeps tracked jobs intact
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconnect_preserves_registry() {
    let mock = MockComfyUI::spawn().await;
    let (manager, _store) = start(&mock).await;
    let running = manager.submit(&json!({}), json!(null)).await.unwrap();
    let queued = manager.submit(&json!({}), json!(null)).await.unwrap();

    mock.send_json(start_frame(&running));
    wait_until("job to start", || {
        let manager = Arc::clone(&manager);
        let id = running.clone();
        async move {
            manager
                .job(&id)
                .await
                .is_some_and(|job| job.status == JobStatus::Processing)
        }
    })
    .await;

    mock.drop_connections();
    wait_until("second connection", || {
        let connections = mock.connections();
        let manager = Arc::clone(&manager);
        async move { connections == 2 && manager.is_connected() }
    })
    .await;

    assert_eq!(mock.ws_client_ids()[0], mock.ws_client_ids()[1]);
    assert_eq!(manager.job(&running).await.unwrap().status, JobStatus::Processing);
    assert_eq!(manager.job(&queued).await.unwrap().status, JobStatus::Pending);

    // The active pointer survived, so progress still lands on the running job.
    mock.send_json(json!({"type": "progress", "data": {"value": 3, "max": 4}}));
    wait_until("progress after reconnect", || {
        let manager = Arc::clone(&manager);
        let id = running.clone();
        async move { manager.job(&id).await.is_some_and(|job| job.progress == 75) }
    })
    .await;

    manager.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: cancellation is forwarded as interrupt or queue delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_forwards_to_server() {
    let mock = MockComfyUI::spawn().await;
    let (manager, _store) = start(&mock).await;
    let running = manager.submit(&json!({}), json!(null)).await.unwrap();
    let queued = manager.submit(&json!({}), json!(null)).await.unwrap();

    mock.send_json(start_frame(&running));
    wait_until("job to become active", || {
        let manager = Arc::clone(&manager);
        let id = running.clone();
        async move { manager.registry().active().await.as_deref() == Some(id.as_str()) }
    })
    .await;

    assert_eq!(manager.cancel(&running).await.unwrap(), CancelAction::Interrupted);
    assert_eq!(manager.cancel(&queued).await.unwrap(), CancelAction::Dequeued);
    assert_matches!(
        manager.cancel("unknown").await,
        Err(ComfyUIManagerError::JobNotFound(_))
    );

    assert_eq!(mock.interrupts(), 1);
    assert_eq!(mock.deleted(), vec![queued.clone()]);
    // Cancelling does not touch the registry.
    assert_eq!(manager.job(&queued).await.unwrap().status, JobStatus::Pending);

    manager.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: reconfiguration moves the connection to the new server
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconfigure_switches_server() {
    let first = MockComfyUI::spawn().await;
    let second = MockComfyUI::spawn().await;
    let (manager, _store) = start(&first).await;
    let id = manager.submit(&json!({}), json!(null)).await.unwrap();

    manager.reconfigure(second.endpoint()).await;
    wait_until("connection to second server", || {
        let connections = second.connections();
        let manager = Arc::clone(&manager);
        async move { connections == 1 && manager.is_connected() }
    })
    .await;

    assert_eq!(manager.endpoint().await, second.endpoint());
    assert!(manager.job(&id).await.is_some());

    manager.submit(&json!({}), json!(null)).await.unwrap();
    assert_eq!(first.prompt_client_ids().len(), 1);
    assert_eq!(second.prompt_client_ids().len(), 1);

    manager.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: shutdown closes the connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_disconnects() {
    let mock = MockComfyUI::spawn().await;
    let (manager, _store) = start(&mock).await;

    manager.shutdown().await;

    assert!(!manager.is_connected());
}
