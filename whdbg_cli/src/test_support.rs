//! In-process stand-in for the whdbg backend, used by session tests

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
enum Frame {
    Text(String),
    Drop,
}

#[derive(Clone)]
struct BackendState {
    frames: broadcast::Sender<Frame>,
    connections: Arc<Mutex<Vec<String>>>,
    pushes: Arc<Mutex<Vec<(String, Value)>>>,
    push_status: Arc<AtomicU16>,
}

/// Serves `/ws/{listener}` and `/api/{listener}/update` on a random port
pub struct FakeBackend {
    pub addr: SocketAddr,
    state: BackendState,
    task: JoinHandle<()>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let (frames, _) = broadcast::channel(64);
        let state = BackendState {
            frames,
            connections: Arc::new(Mutex::new(Vec::new())),
            pushes: Arc::new(Mutex::new(Vec::new())),
            push_status: Arc::new(AtomicU16::new(200)),
        };

        let app = Router::new()
            .route("/ws/{listener}", get(stream))
            .route("/api/{listener}/update", post(update))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake backend");
        let addr = listener.local_addr().expect("fake backend address");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state, task }
    }

    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Send a text frame to every open stream
    pub fn send(&self, frame: &str) {
        let _ = self.state.frames.send(Frame::Text(frame.to_string()));
    }

    /// Drop every open stream without a close handshake
    pub fn drop_connections(&self) {
        let _ = self.state.frames.send(Frame::Drop);
    }

    /// Listener names of every stream opened so far
    pub fn connections(&self) -> Vec<String> {
        self.state.connections.lock().unwrap().clone()
    }

    /// Every override received, with its listener
    pub fn pushes(&self) -> Vec<(String, Value)> {
        self.state.pushes.lock().unwrap().clone()
    }

    pub fn set_push_status(&self, status: u16) {
        self.state.push_status.store(status, Ordering::SeqCst);
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn stream(
    ws: WebSocketUpgrade,
    Path(listener): Path<String>,
    State(state): State<BackendState>,
) -> impl IntoResponse {
    // Subscribe before the upgrade completes so no frame sent after the
    // client sees the stream open can be missed
    let frames = state.frames.subscribe();
    state.connections.lock().unwrap().push(listener);
    ws.on_upgrade(move |socket| serve_frames(socket, frames))
}

async fn serve_frames(mut socket: WebSocket, mut frames: broadcast::Receiver<Frame>) {
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(Frame::Text(text)) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Ok(Frame::Drop) | Err(_) => return,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn update(
    Path(listener): Path<String>,
    State(state): State<BackendState>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    state.pushes.lock().unwrap().push((listener, payload));
    let status = StatusCode::from_u16(state.push_status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::OK);
    (status, Json(json!({ "status": "ok" })))
}

/// A backend-shaped record frame
pub fn record_json(timestamp: &str, method: &str, url: &str) -> String {
    json!({
        "listener": "abc123",
        "timestamp": timestamp,
        "unixtimestamp": 1136214245,
        "url": url,
        "request": {
            "Method": method,
            "Host": "abc123.whdbg.dev",
            "Proto": "HTTP/1.1",
            "Header": { "User-Agent": ["curl/8.0"] },
            "Body": "",
        },
        "dump": format!("{} {} HTTP/1.1\r\nHost: abc123.whdbg.dev\r\n\r\n", method, url),
    })
    .to_string()
}
