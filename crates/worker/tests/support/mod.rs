//! In-process ComfyUI stub covering the full engine surface the
//! worker touches: liveness, queueing, history, artifact download,
//! image upload, capability introspection, and the scripted event
//! stream.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Path, Query, State};
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
}

/// What a scripted session does after its frames are sent.
pub enum SessionEnd {
    Close,
    Hold,
}

/// A scripted WebSocket session.
pub struct WsScript {
    pub frames: Vec<ScriptFrame>,
    pub end: SessionEnd,
}

impl WsScript {
    /// A session that sends the given frames and then stays open.
    pub fn hold(frames: Vec<ScriptFrame>) -> Self {
        Self {
            frames,
            end: SessionEnd::Hold,
        }
    }
}

pub struct StubState {
    pub alive: AtomicBool,
    pub liveness_hits: AtomicUsize,
    pub ws_attempts: AtomicUsize,
    pub prompt_hits: AtomicUsize,
    pub upload_hits: AtomicUsize,
    pub view_hits: AtomicUsize,
    pub fail_uploads: AtomicBool,
    pub prompt_response: Mutex<(u16, String)>,
    pub history_response: Mutex<String>,
    pub object_info: Mutex<Option<String>>,
    pub view_files: Mutex<HashMap<String, Vec<u8>>>,
    pub uploaded_names: Mutex<Vec<String>>,
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

    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn set_alive(&self, alive: bool) {
        self.state.alive.store(alive, Ordering::SeqCst);
    }

    pub fn set_prompt_response(&self, status: u16, body: &str) {
        *self.state.prompt_response.lock().expect("prompt lock") = (status, body.to_string());
    }

    pub fn set_history(&self, body: &str) {
        *self.state.history_response.lock().expect("history lock") = body.to_string();
    }

    pub fn add_view_file(&self, filename: &str, bytes: &[u8]) {
        self.state
            .view_files
            .lock()
            .expect("view lock")
            .insert(filename.to_string(), bytes.to_vec());
    }

    pub fn fail_uploads(&self) {
        self.state.fail_uploads.store(true, Ordering::SeqCst);
    }

    pub fn liveness_hits(&self) -> usize {
        self.state.liveness_hits.load(Ordering::SeqCst)
    }

    pub fn prompt_hits(&self) -> usize {
        self.state.prompt_hits.load(Ordering::SeqCst)
    }

    pub fn upload_hits(&self) -> usize {
        self.state.upload_hits.load(Ordering::SeqCst)
    }

    pub fn view_hits(&self) -> usize {
        self.state.view_hits.load(Ordering::SeqCst)
    }

    pub fn ws_attempts(&self) -> usize {
        self.state.ws_attempts.load(Ordering::SeqCst)
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.state.uploaded_names.lock().expect("names lock").clone()
    }
}

/// Start the stub on an ephemeral port with the given session scripts.
pub async fn spawn(scripts: Vec<WsScript>) -> StubEngine {
    let state = Arc::new(StubState {
        alive: AtomicBool::new(true),
        liveness_hits: AtomicUsize::new(0),
        ws_attempts: AtomicUsize::new(0),
        prompt_hits: AtomicUsize::new(0),
        upload_hits: AtomicUsize::new(0),
        view_hits: AtomicUsize::new(0),
        fail_uploads: AtomicBool::new(false),
        prompt_response: Mutex::new((200, r#"{"prompt_id":"abc","number":1}"#.to_string())),
        history_response: Mutex::new("{}".to_string()),
        object_info: Mutex::new(None),
        view_files: Mutex::new(HashMap::new()),
        uploaded_names: Mutex::new(Vec::new()),
        last_prompt: Mutex::new(None),
        scripts: Mutex::new(VecDeque::from(scripts)),
    });

    let app = Router::new()
        .route("/", get(root))
        .route("/prompt", post(prompt))
        .route("/history/{prompt_id}", get(history))
        .route("/view", get(view))
        .route("/upload/image", post(upload_image))
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

async fn history(
    State(state): State<Arc<StubState>>,
    Path(_prompt_id): Path<String>,
) -> Response {
    let body = state.history_response.lock().expect("history lock").clone();
    (StatusCode::OK, body).into_response()
}

async fn view(
    State(state): State<Arc<StubState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.view_hits.fetch_add(1, Ordering::SeqCst);

    let filename = params.get("filename").cloned().unwrap_or_default();
    match state.view_files.lock().expect("view lock").get(&filename) {
        Some(bytes) => (StatusCode::OK, bytes.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn upload_image(
    State(state): State<Arc<StubState>>,
    mut multipart: Multipart,
) -> Response {
    state.upload_hits.fetch_add(1, Ordering::SeqCst);

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("image") {
            if let Some(file_name) = field.file_name() {
                state
                    .uploaded_names
                    .lock()
                    .expect("names lock")
                    .push(file_name.to_string());
            }
        }
        // Consume the field body so the stream advances.
        let _ = field.bytes().await;
    }

    if state.fail_uploads.load(Ordering::SeqCst) {
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    } else {
        (StatusCode::OK, r#"{"name":"uploaded"}"#).into_response()
    }
}

async fn object_info(State(state): State<Arc<StubState>>) -> Response {
    match state.object_info.lock().expect("object_info lock").clone() {
        Some(body) => (StatusCode::OK, body).into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn ws_handler(State(state): State<Arc<StubState>>, ws: WebSocketUpgrade) -> Response {
    state.ws_attempts.fetch_add(1, Ordering::SeqCst);
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
        SessionEnd::Close => {}
        SessionEnd::Hold => {
            std::future::pending::<()>().await;
        }
    }
}
