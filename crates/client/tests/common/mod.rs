//! Loopback REST + WebSocket fixture for integration tests.
//!
//! Stands in for the backend: serves the forum list and per-forum history
//! over HTTP, accepts chat socket upgrades, records what clients send, and
//! lets tests push frames to connected sockets.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::broadcast;

use classconnect_client::notify::{Notice, Notifier};

pub struct ServerState {
    /// JSON body returned by `GET /forums`.
    pub forums_body: Mutex<serde_json::Value>,
    /// Per-forum history body and artificial delay in milliseconds.
    pub histories: Mutex<HashMap<i64, (serde_json::Value, u64)>>,
    /// Frames pushed to every connected socket.
    pub push_tx: broadcast::Sender<String>,
    /// Sockets accepted so far (including ones closed immediately).
    pub ws_accepts: AtomicUsize,
    /// Sockets currently open.
    pub ws_open: AtomicUsize,
    /// Forum id of the most recently accepted socket.
    pub last_forum: AtomicI64,
    /// Bearer tokens presented at upgrade time, in order.
    pub tokens_seen: Mutex<Vec<String>>,
    /// Close this many sockets immediately after accepting them.
    pub close_first: AtomicUsize,
    /// Text frames received from clients.
    pub received: Mutex<Vec<String>>,
}

#[derive(Clone)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
}

impl TestServer {
    pub fn api_base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_base(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn set_forums(&self, body: serde_json::Value) {
        *self.state.forums_body.lock().unwrap() = body;
    }

    pub fn set_history(&self, forum_id: i64, body: serde_json::Value, delay_ms: u64) {
        self.state
            .histories
            .lock()
            .unwrap()
            .insert(forum_id, (body, delay_ms));
    }

    pub fn push_frame(&self, frame: serde_json::Value) {
        self.push_text(&frame.to_string());
    }

    pub fn push_text(&self, text: &str) {
        let _ = self.state.push_tx.send(text.to_string());
    }

    pub fn received(&self) -> Vec<String> {
        self.state.received.lock().unwrap().clone()
    }
}

pub async fn spawn_server() -> TestServer {
    let (push_tx, _) = broadcast::channel(64);
    let state = Arc::new(ServerState {
        forums_body: Mutex::new(json!([])),
        histories: Mutex::new(HashMap::new()),
        push_tx,
        ws_accepts: AtomicUsize::new(0),
        ws_open: AtomicUsize::new(0),
        last_forum: AtomicI64::new(0),
        tokens_seen: Mutex::new(Vec::new()),
        close_first: AtomicUsize::new(0),
        received: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/forums", get(list_forums))
        .route("/forums/{forum_id}/messages", get(forum_messages))
        .route("/ws/chat/{forum_id}/", get(ws_chat))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer { addr, state }
}

async fn list_forums(State(state): State<Arc<ServerState>>) -> Response {
    let body = state.forums_body.lock().unwrap().clone();
    Json(body).into_response()
}

async fn forum_messages(
    Path(forum_id): Path<i64>,
    State(state): State<Arc<ServerState>>,
) -> Response {
    let (body, delay_ms) = state
        .histories
        .lock()
        .unwrap()
        .get(&forum_id)
        .cloned()
        .unwrap_or((json!([]), 0));
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    Json(body).into_response()
}

async fn ws_chat(
    Path(forum_id): Path<i64>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<ServerState>>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(token) = params.get("token") {
        state.tokens_seen.lock().unwrap().push(token.clone());
    }
    ws.on_upgrade(move |socket| handle_socket(socket, forum_id, state))
}

async fn handle_socket(mut socket: WebSocket, forum_id: i64, state: Arc<ServerState>) {
    // Subscribe before publishing the open count so tests that wait on
    // `ws_open` can push frames without losing them.
    let mut push_rx = state.push_tx.subscribe();

    state.ws_accepts.fetch_add(1, Ordering::SeqCst);
    state.last_forum.store(forum_id, Ordering::SeqCst);

    let close_now = {
        let mut close = false;
        let _ = state
            .close_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n > 0 {
                    close = true;
                    Some(n - 1)
                } else {
                    None
                }
            });
        close
    };
    if close_now {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    state.ws_open.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            pushed = push_rx.recv() => match pushed {
                Ok(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    state.received.lock().unwrap().push(text.as_str().to_string());
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    state.ws_open.fetch_sub(1, Ordering::SeqCst);
}

/// Notifier that records every notice for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn count(&self, wanted: &Notice) -> usize {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|notice| *notice == wanted)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
