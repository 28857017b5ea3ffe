//! Shared fixtures for the manager integration tests: an in-process mock
//! ComfyUI server and an in-memory artifact store.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use atelier_comfyui::config::TrackerConfig;
use atelier_comfyui::endpoint::EngineEndpoint;
use atelier_core::artifact::{ArtifactRef, ArtifactRequest, ArtifactStore, StorageError};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::broadcast;

/// Something the mock pushes to connected WebSocket clients.
#[derive(Clone)]
enum Push {
    Frame(Message),
    Drop,
}

#[derive(Clone)]
struct MockState {
    push: broadcast::Sender<Push>,
    prompt_client_ids: Arc<Mutex<Vec<String>>>,
    ws_client_ids: Arc<Mutex<Vec<String>>>,
    interrupts: Arc<AtomicUsize>,
    deleted: Arc<Mutex<Vec<String>>>,
    next_id: Arc<AtomicUsize>,
    reject: Arc<AtomicBool>,
}

/// In-process stand-in for a ComfyUI server.
pub struct MockComfyUI {
    pub url: String,
    state: MockState,
}

impl MockComfyUI {
    pub async fn spawn() -> Self {
        let (push, _) = broadcast::channel(64);
        let state = MockState {
            push,
            prompt_client_ids: Arc::default(),
            ws_client_ids: Arc::default(),
            interrupts: Arc::default(),
            deleted: Arc::default(),
            next_id: Arc::new(AtomicUsize::new(1)),
            reject: Arc::default(),
        };

        let app = Router::new()
            .route("/prompt", post(prompt))
            .route("/queue", post(queue))
            .route("/interrupt", post(interrupt))
            .route("/ws", get(ws))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            state,
        }
    }

    pub fn endpoint(&self) -> EngineEndpoint {
        EngineEndpoint::parse(&self.url).unwrap()
    }

    pub fn send_json(&self, value: serde_json::Value) {
        let _ = self
            .state
            .push
            .send(Push::Frame(Message::Text(value.to_string().into())));
    }

    pub fn send_binary(&self, frame: Vec<u8>) {
        let _ = self.state.push.send(Push::Frame(Message::Binary(frame.into())));
    }

    /// Drop every open WebSocket without a close handshake.
    pub fn drop_connections(&self) {
        let _ = self.state.push.send(Push::Drop);
    }

    pub fn reject_prompts(&self) {
        self.state.reject.store(true, Ordering::SeqCst);
    }

    pub fn prompt_client_ids(&self) -> Vec<String> {
        self.state.prompt_client_ids.lock().unwrap().clone()
    }

    pub fn ws_client_ids(&self) -> Vec<String> {
        self.state.ws_client_ids.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.state.ws_client_ids.lock().unwrap().len()
    }

    pub fn interrupts(&self) -> usize {
        self.state.interrupts.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.deleted.lock().unwrap().clone()
    }
}

async fn prompt(State(state): State<MockState>, Json(body): Json<serde_json::Value>) -> Response {
    if state.reject.load(Ordering::SeqCst) {
        return (StatusCode::BAD_REQUEST, "invalid prompt").into_response();
    }
    let client_id = body["client_id"].as_str().unwrap_or_default().to_string();
    state.prompt_client_ids.lock().unwrap().push(client_id);

    let n = state.next_id.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({ "prompt_id": format!("prompt-{n}"), "number": n })).into_response()
}

async fn queue(State(state): State<MockState>, Json(body): Json<serde_json::Value>) -> StatusCode {
    let ids: Vec<String> = body["delete"]
        .as_array()
        .map(|ids| ids.iter().filter_map(|id| id.as_str().map(String::from)).collect())
        .unwrap_or_default();
    state.deleted.lock().unwrap().extend(ids);
    StatusCode::OK
}

async fn interrupt(State(state): State<MockState>) -> StatusCode {
    state.interrupts.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn ws(
    upgrade: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<MockState>,
) -> Response {
    let rx = state.push.subscribe();
    let client_id = params.get("clientId").cloned().unwrap_or_default();
    state.ws_client_ids.lock().unwrap().push(client_id);
    upgrade.on_upgrade(move |socket| handle_socket(socket, rx))
}

async fn handle_socket(mut socket: WebSocket, mut rx: broadcast::Receiver<Push>) {
    loop {
        tokio::select! {
            push = rx.recv() => match push {
                Ok(Push::Frame(msg)) => {
                    if socket.send(msg).await.is_err() {
                        break;
                    }
                }
                Ok(Push::Drop) | Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => {}
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Records every stored artifact in memory.
#[derive(Default)]
pub struct MemoryStore {
    pub stored: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait::async_trait]
impl ArtifactStore for MemoryStore {
    async fn store(
        &self,
        bytes: &[u8],
        request: &ArtifactRequest<'_>,
    ) -> Result<ArtifactRef, StorageError> {
        self.stored
            .lock()
            .unwrap()
            .push((request.job_id.to_string(), bytes.to_vec()));
        let filename = format!("{}.{}", request.job_id, request.format.extension());
        Ok(ArtifactRef {
            url: format!("/gallery/{filename}"),
            filename,
        })
    }
}

/// Short timings so the tests run in well under a second each.
pub fn fast_config() -> TrackerConfig {
    TrackerConfig {
        grace_period: Duration::from_millis(300),
        rescue_window: Duration::from_secs(2),
        retention: Duration::from_secs(3),
        forced_retention: Duration::from_secs(5),
        max_job_age: Duration::from_secs(60),
        sweep_interval: Duration::from_secs(30),
        reconnect_delay: Duration::from_millis(100),
    }
}

/// Poll `check` until it returns `true`, panicking after five seconds.
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}
