//! In-process WebSocket server for integration tests.
//!
//! # Frame Handling
//!
//! | Frame | Reply |
//! |-------|-------|
//! | `echo` | same `id` and payload |
//! | `echo` with `delay_ms` | same, after the delay |
//! | `echo` with `silent` | none |
//! | `echo` with `kill` | drops the socket without a close frame |
//! | `echo` with `whoami` | `{"conn": <server-side connection number>}` |
//! | `get_application_policies` | policies, matched by `replyTo` |
//! | `request_for_allocation` | `allocationId`, or `limit_exceeded` above 100 |
//! | `use_allocation` | empty ack |
//!
//! Frames without an `id` are counted and never answered.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use pooled_socket::PoolOptions;

// ============================================================================
// Constants
// ============================================================================

pub const API_KEY: &str = "test-key";

// ============================================================================
// Mode
// ============================================================================

/// How the server treats new TCP connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Complete the handshake and answer frames.
    Serve,
    /// Drop the TCP stream before the handshake.
    Reject,
}

// ============================================================================
// TestServer
// ============================================================================

struct ServerState {
    mode: Mutex<Mode>,
    accepts: AtomicUsize,
    handshakes: AtomicUsize,
    frames: AtomicUsize,
    auth_keys: Mutex<Vec<String>>,
    kill_tx: broadcast::Sender<()>,
}

/// Test server bound to an ephemeral localhost port.
pub struct TestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    accept_task: JoinHandle<()>,
}

impl TestServer {
    /// Starts a server in [`Mode::Serve`].
    pub async fn start() -> Self {
        Self::start_with(Mode::Serve).await
    }

    /// Starts a server in the given mode.
    pub async fn start_with(mode: Mode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (kill_tx, _) = broadcast::channel(4);

        let state = Arc::new(ServerState {
            mode: Mutex::new(mode),
            accepts: AtomicUsize::new(0),
            handshakes: AtomicUsize::new(0),
            frames: AtomicUsize::new(0),
            auth_keys: Mutex::new(Vec::new()),
            kill_tx,
        });

        let accept_state = Arc::clone(&state);
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.accepts.fetch_add(1, Ordering::SeqCst);
                if *accept_state.mode.lock() == Mode::Reject {
                    drop(stream);
                    continue;
                }
                tokio::spawn(serve(stream, Arc::clone(&accept_state)));
            }
        });

        Self {
            addr,
            state,
            accept_task,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Options pointing at this server with test-sized timings.
    pub fn options(&self, pool_size: usize) -> PoolOptions {
        fast_options(self.endpoint()).with_pool_size(pool_size)
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.state.mode.lock() = mode;
    }

    pub fn accepts(&self) -> usize {
        self.state.accepts.load(Ordering::SeqCst)
    }

    pub fn handshakes(&self) -> usize {
        self.state.handshakes.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> usize {
        self.state.frames.load(Ordering::SeqCst)
    }

    pub fn auth_keys(&self) -> Vec<String> {
        self.state.auth_keys.lock().clone()
    }

    /// Drops every open socket without a close frame.
    pub fn disconnect_all(&self) {
        let _ = self.state.kill_tx.send(());
    }

    /// Stops accepting; the port refuses from now on.
    pub fn stop_listening(&self) {
        self.accept_task.abort();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        let _ = self.state.kill_tx.send(());
    }
}

// ============================================================================
// Connection Handling
// ============================================================================

enum Action {
    Continue,
    Kill,
}

async fn serve(stream: TcpStream, state: Arc<ServerState>) {
    let header_state = Arc::clone(&state);
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if let Some(value) = request.headers().get("x-usage-key") {
            header_state
                .auth_keys
                .lock()
                .push(value.to_str().unwrap_or_default().to_string());
        }
        Ok(response)
    };

    let Ok(socket) = accept_hdr_async(stream, callback).await else {
        return;
    };
    let conn = state.handshakes.fetch_add(1, Ordering::SeqCst);
    let mut kill_rx = state.kill_tx.subscribe();

    let (mut sink, mut source) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if sink.send(Message::text(frame.to_string())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = kill_rx.recv() => break,
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    state.frames.fetch_add(1, Ordering::SeqCst);
                    if let Action::Kill = handle_frame(text.as_str(), conn, &out_tx) {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    // Dropping both halves closes the TCP stream abruptly
    writer.abort();
}

fn handle_frame(text: &str, conn: usize, out_tx: &mpsc::UnboundedSender<Value>) -> Action {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        return Action::Continue;
    };

    let payload = frame.get("payload").cloned().unwrap_or(Value::Null);
    if payload.get("kill").and_then(Value::as_bool) == Some(true) {
        return Action::Kill;
    }

    let Some(id) = frame.get("id").and_then(Value::as_str).map(str::to_string) else {
        return Action::Continue;
    };

    let reply = match frame.get("type").and_then(Value::as_str) {
        Some("echo") => {
            if payload.get("silent").and_then(Value::as_bool) == Some(true) {
                return Action::Continue;
            }
            let body = if payload.get("whoami").and_then(Value::as_bool) == Some(true) {
                json!({ "conn": conn })
            } else {
                payload.clone()
            };
            json!({ "type": "echo", "id": id, "payload": body })
        }
        Some("get_application_policies") => json!({
            "type": "application_policies",
            "replyTo": id,
            "payload": {
                "policies": [{
                    "policyId": "pol-1",
                    "applicationId": "app-1",
                    "endpointPattern": "/v1/items",
                    "endpointMethod": "GET",
                    "rateLimit": 100,
                    "rateLimitInterval": "1m"
                }],
                "total": 1
            }
        }),
        Some("request_for_allocation") => {
            let amount = payload.get("amount").and_then(Value::as_f64).unwrap_or_default();
            if amount > 100.0 {
                json!({
                    "type": "error",
                    "id": id,
                    "error": "limit_exceeded",
                    "message": "Allocation exceeds limit"
                })
            } else {
                let alias = payload.get("alias").and_then(Value::as_str).unwrap_or_default();
                json!({
                    "type": "allocation",
                    "id": id,
                    "payload": { "allocationId": format!("alloc-{alias}") }
                })
            }
        }
        Some("use_allocation") => json!({ "type": "ack", "id": id, "payload": {} }),
        Some("ping") => json!({ "type": "pong", "id": id }),
        _ => json!({ "type": "error", "id": id, "error": "unknown_type" }),
    };

    match payload.get("delay_ms").and_then(Value::as_u64) {
        Some(delay) => {
            let out_tx = out_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                let _ = out_tx.send(reply);
            });
        }
        None => {
            let _ = out_tx.send(reply);
        }
    }

    Action::Continue
}

// ============================================================================
// Helpers
// ============================================================================

/// Options with short timings for tests.
pub fn fast_options(endpoint: impl Into<String>) -> PoolOptions {
    PoolOptions::new(endpoint, API_KEY)
        .with_pool_size(3)
        .with_connect_timeout(Duration::from_secs(2))
        .with_request_timeout(Duration::from_millis(500))
        .with_reconnect_delay(Duration::from_millis(20), Duration::from_millis(100))
        .with_max_reconnect_attempts(5)
}

/// An endpoint on a port nobody listens on.
pub async fn refused_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    format!("ws://127.0.0.1:{port}/ws")
}

/// Polls `condition` every 5ms until it holds or `limit` passes.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    tokio::time::timeout(limit, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

/// Installs a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
