//! In-process ComfyUI stub for exercising the API client, monitor and
//! reconnect loops against real HTTP and WebSocket endpoints.
//!
//! Serves `GET /` (switchable liveness), `POST /prompt` (configurable
//! queue response), `GET /object_info` (configurable capability body)
//! and `GET /ws` (scripted event sessions).  Each accepted WebSocket
//! connection consumes the next [`WsScript`] in the queue, sends its
//! frames in order, then either closes or holds the connection open.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde_json::Value;

/// One frame of a scripted WebSocket session.
pub struct ScriptFrame {
    pub delay: Duration,
    pub text: String,
}

impl ScriptFrame {
    pub fn text(text: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            text: text.to_string(),
        }
    }

    pub fn delayed(delay_ms: u64, text: &str) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            text: text.to_string(),
        }
    }
}

/// What a scripted session does after its frames are sent.
pub enum SessionEnd {
    /// Close the connection (simulates an abrupt server-side drop).
    Close,
    /// Keep the connection open indefinitely.
    Hold,
}

/// A scripted WebSocket session.
pub struct WsScript {
    pub frames: Vec<ScriptFrame>,
    pub end: SessionEnd,
}

pub struct StubState {
    /// Whether `GET /` answers 200 (true) or 503 (false).
    pub alive: AtomicBool,
    /// Number of initial probes that fail before `alive` applies.
    pub liveness_fail_first: AtomicUsize,
    /// Whether `GET /ws` accepts the upgrade at all.
    pub accept_ws: AtomicBool,
    /// Number of liveness probes received.
    pub liveness_hits: AtomicUsize,
    /// Number of WebSocket connection attempts (accepted or not).
    pub ws_attempts: AtomicUsize,
    /// Number of `POST /prompt` requests received.
    pub prompt_hits: AtomicUsize,
    /// Status and body returned by `POST /prompt`.
    pub prompt_response: Mutex<(u16, String)>,
    /// Body returned by `GET /object_info`; `None` yields a 500.
    pub object_info: Mutex<Option<String>>,
    /// Last body received on `POST /prompt`.
    pub last_prompt: Mutex<Option<Value>>,
    scripts: Mutex<VecDeque<WsScript>>,
}

/// Handle to a running stub engine.
pub struct StubEngine {
    pub addr: SocketAddr,
    pub state: Arc<StubState>,
}

impl StubEngine {
    pub fn api_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn set_alive(&self, alive: bool) {
        self.state.alive.store(alive, Ordering::SeqCst);
    }

    /// Make the next `count` liveness probes fail regardless of `alive`.
    pub fn fail_liveness_times(&self, count: usize) {
        self.state.liveness_fail_first.store(count, Ordering::SeqCst);
    }

    pub fn set_accept_ws(&self, accept: bool) {
        self.state.accept_ws.store(accept, Ordering::SeqCst);
    }

    pub fn set_prompt_response(&self, status: u16, body: &str) {
        *self.state.prompt_response.lock().expect("prompt lock") = (status, body.to_string());
    }

    pub fn set_object_info(&self, body: &str) {
        *self.state.object_info.lock().expect("object_info lock") = Some(body.to_string());
    }

    pub fn ws_attempts(&self) -> usize {
        self.state.ws_attempts.load(Ordering::SeqCst)
    }

    pub fn liveness_hits(&self) -> usize {
        self.state.liveness_hits.load(Ordering::SeqCst)
    }

    pub fn prompt_hits(&self) -> usize {
        self.state.prompt_hits.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<Value> {
        self.state.last_prompt.lock().expect("last_prompt lock").clone()
    }
}

/// Start the stub on an ephemeral port with the given session scripts.
pub async fn spawn(scripts: Vec<WsScript>) -> StubEngine {
    let state = Arc::new(StubState {
        alive: AtomicBool::new(true),
        liveness_fail_first: AtomicUsize::new(0),
        accept_ws: AtomicBool::new(true),
        liveness_hits: AtomicUsize::new(0),
        ws_attempts: AtomicUsize::new(0),
        prompt_hits: AtomicUsize::new(0),
        prompt_response: Mutex::new((200, r#"{"prompt_id":"abc","number":1}"#.to_string())),
        object_info: Mutex::new(None),
        last_prompt: Mutex::new(None),
        scripts: Mutex::new(VecDeque::from(scripts)),
    });

    let app = Router::new()
        .route("/", get(root))
        .route("/prompt", post(prompt))
        .route("/object_info", get(object_info))
        .route("/ws", get(ws_handler))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });

    StubEngine { addr, state }
}

async fn root(State(state): State<Arc<StubState>>) -> StatusCode {
    state.liveness_hits.fetch_add(1, Ordering::SeqCst);

    let remaining = state.liveness_fail_first.load(Ordering::SeqCst);
    if remaining > 0 {
        state.liveness_fail_first.store(remaining - 1, Ordering::SeqCst);
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    if state.alive.load(Ordering::SeqCst) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn prompt(State(state): State<Arc<StubState>>, Json(body): Json<Value>) -> Response {
    state.prompt_hits.fetch_add(1, Ordering::SeqCst);
    *state.last_prompt.lock().expect("last_prompt lock") = Some(body);

    let (status, response_body) = state.prompt_response.lock().expect("prompt lock").clone();
    (
        StatusCode::from_u16(status).expect("valid status"),
        response_body,
    )
        .into_response()
}

async fn object_info(State(state): State<Arc<StubState>>) -> Response {
    match state.object_info.lock().expect("object_info lock").clone() {
        Some(body) => (StatusCode::OK, body).into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn ws_handler(State(state): State<Arc<StubState>>, ws: WebSocketUpgrade) -> Response {
    state.ws_attempts.fetch_add(1, Ordering::SeqCst);
    if !state.accept_ws.load(Ordering::SeqCst) {
        return StatusCode::NOT_FOUND.into_response();
    }
    ws.on_upgrade(move |socket| run_session(socket, state))
}

async fn run_session(mut socket: WebSocket, state: Arc<StubState>) {
    let script = state
        .scripts
        .lock()
        .expect("scripts lock")
        .pop_front()
        .unwrap_or(WsScript {
            frames: Vec::new(),
            end: SessionEnd::Hold,
        });

    for frame in script.frames {
        if !frame.delay.is_zero() {
            tokio::time::sleep(frame.delay).await;
        }
        if socket.send(Message::Text(frame.text.into())).await.is_err() {
            return;
        }
    }

    match script.end {
        SessionEnd::Close => {
            // Dropping the socket closes the connection.
        }
        SessionEnd::Hold => {
            std::future::pending::<()>().await;
        }
    }
}
