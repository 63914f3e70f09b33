//! One pooled WebSocket session.
//!
//! A [`Connection`] owns the socket for a single pool slot, the table of
//! requests waiting for a reply on it, and the two tasks that drive it.
//!
//! # Tasks
//!
//! Each connection runs in its own [`JoinSet`]:
//!
//! - **Read loop**: decodes inbound frames, hands each reply to the waiter
//!   registered under its `id` (or `replyTo`), and treats silence longer
//!   than `pong_wait` as a dead peer.
//! - **Write loop**: owns the sink, serializes outgoing frames from callers
//!   and sends a ping every `ping_period`.
//!
//! # Failure Handling
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Data write fails | That one call fails with [`Error::Send`] |
//! | Ping write fails | Connection lost |
//! | Read error / close / liveness expiry | Connection lost |
//!
//! Losing a connection marks it disconnected, clears the handler table
//! (every pending caller wakes with [`Error::ConnectionLost`]) and notifies
//! the pool so a reconnector can replace it.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{from_slice, to_string};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result, millis};
use crate::identifiers::CorrelationId;
use crate::protocol::{Command, Request, Response};

use super::dial::dial;
use super::options::PoolOptions;

// ============================================================================
// Constants
// ============================================================================

/// Source of connection generations.
static GENERATION: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Types
// ============================================================================

/// Map of correlation IDs to reply slots.
type HandlerTable = FxHashMap<CorrelationId, oneshot::Sender<Response>>;

/// Notification sent to the pool when a connection dies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LostConnection {
    /// Pool slot of the dead connection.
    pub index: usize,
    /// Generation of the dead connection.
    pub generation: u64,
}

/// A frame queued for the write loop.
struct WriteRequest {
    text: String,
    ack: oneshot::Sender<Result<()>>,
}

/// Liveness flag and handler table, guarded together.
///
/// Invariant: `connected == false` implies `handlers` is empty.
struct ConnectionState {
    connected: bool,
    handlers: HandlerTable,
}

/// State shared between the handle and its tasks.
struct Shared {
    index: usize,
    generation: u64,
    state: Mutex<ConnectionState>,
    closed_tx: watch::Sender<bool>,
    lost_tx: mpsc::UnboundedSender<LostConnection>,
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket session occupying one pool slot.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Connection {
    shared: Arc<Shared>,
    write_tx: mpsc::UnboundedSender<WriteRequest>,
    tasks: Mutex<JoinSet<()>>,
    write_wait: Duration,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("index", &self.shared.index)
            .field("generation", &self.shared.generation)
            .field("connected", &self.is_connected())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Constructors
// ============================================================================

impl Connection {
    /// Dials the endpoint and starts the connection's tasks.
    ///
    /// # Errors
    ///
    /// Returns the dial failure; see [`dial`].
    pub(crate) async fn open(
        index: usize,
        options: &PoolOptions,
        lost_tx: mpsc::UnboundedSender<LostConnection>,
    ) -> Result<Self> {
        let stream = dial(options, index).await?;
        Ok(Self::from_stream(index, stream, options, lost_tx))
    }

    /// Wraps an established WebSocket and spawns its read and write loops.
    pub(crate) fn from_stream<S>(
        index: usize,
        stream: WebSocketStream<S>,
        options: &PoolOptions,
        lost_tx: mpsc::UnboundedSender<LostConnection>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (closed_tx, closed_rx) = watch::channel(false);
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            index,
            generation: GENERATION.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(ConnectionState {
                connected: true,
                handlers: HandlerTable::default(),
            }),
            closed_tx,
            lost_tx,
        });

        let (sink, source) = stream.split();
        let mut tasks = JoinSet::new();

        tasks.spawn(run_read_loop(
            Arc::clone(&shared),
            source,
            options.pong_wait,
            closed_rx.clone(),
        ));
        tasks.spawn(run_write_loop(
            Arc::clone(&shared),
            sink,
            write_rx,
            options.ping_period,
            options.write_wait,
            closed_rx,
        ));

        debug!(index, generation = shared.generation, "Connection established");

        Self {
            shared,
            write_tx,
            tasks: Mutex::new(tasks),
            write_wait: options.write_wait,
        }
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Returns the pool slot this connection occupies.
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.shared.index
    }

    /// Returns the generation, unique per established connection.
    #[inline]
    #[must_use]
    pub(crate) fn generation(&self) -> u64 {
        self.shared.generation
    }

    /// Returns `true` while the connection is live.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().connected
    }

    /// Returns the number of calls waiting for a reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().handlers.len()
    }

    /// Returns the pending count if live, read under one lock.
    #[inline]
    pub(crate) fn load(&self) -> Option<usize> {
        let state = self.shared.state.lock();
        state.connected.then_some(state.handlers.len())
    }
}

// ============================================================================
// Connection - Send Path
// ============================================================================

impl Connection {
    /// Sends `command` and waits up to `call_timeout` for the reply.
    ///
    /// The waiter is removed before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`Error::NoConnectionAvailable`] if the connection is already dead
    /// - [`Error::Send`] if the frame could not be written
    /// - [`Error::ConnectionLost`] if the read path died while waiting
    /// - [`Error::RequestTimeout`] if no reply arrived in time
    pub async fn send_and_await(
        &self,
        command: Command,
        call_timeout: Duration,
    ) -> Result<Response> {
        let id = CorrelationId::generate();
        let text = to_string(&Request::with_id(id.clone(), command))?;

        let waiter = self
            .register(id.clone())
            .ok_or(Error::NoConnectionAvailable)?;

        trace!(index = self.index(), id = %id, "Request registered");

        let exchange = async {
            self.write(text).await?;
            waiter.wait().await
        };

        match timeout(call_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                debug!(index = self.index(), id = %id, "Request timed out");
                Err(Error::request_timeout(id, millis(call_timeout)))
            }
        }
    }

    /// Sends `command` without registering a waiter.
    ///
    /// # Errors
    ///
    /// - [`Error::NoConnectionAvailable`] if the connection is already dead
    /// - [`Error::Send`] if the frame could not be written
    pub async fn send(&self, command: Command) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NoConnectionAvailable);
        }

        let text = to_string(&Request::oneway(command))?;
        self.write(text).await
    }

    /// Registers a waiter for `id`.
    ///
    /// Returns `None` if the connection is no longer live.
    pub(crate) fn register(&self, id: CorrelationId) -> Option<Waiter> {
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.shared.state.lock();
            if !state.connected {
                return None;
            }
            state.handlers.insert(id.clone(), tx);
        }

        Some(Waiter {
            shared: Arc::clone(&self.shared),
            id,
            rx,
        })
    }

    /// Queues a text frame and waits for the write loop's verdict.
    async fn write(&self, text: String) -> Result<()> {
        let (ack, ack_rx) = oneshot::channel();

        self.write_tx
            .send(WriteRequest { text, ack })
            .map_err(|_| Error::send(self.index(), "write loop stopped"))?;

        ack_rx
            .await
            .map_err(|_| Error::send(self.index(), "write loop stopped"))?
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Signals both tasks to stop without triggering a reconnect.
    ///
    /// Pending callers wake with [`Error::ConnectionLost`].
    pub fn close(&self) {
        let abandoned = {
            let mut state = self.shared.state.lock();
            state.connected = false;
            std::mem::take(&mut state.handlers)
        };

        self.shared.closed_tx.send_replace(true);

        if !abandoned.is_empty() {
            debug!(index = self.index(), count = abandoned.len(), "Abandoned pending requests on close");
        }
    }

    /// Closes the connection and waits for its tasks to finish.
    ///
    /// The write loop gets up to `write_wait` to send a close frame.
    pub async fn shutdown(&self) {
        self.close();

        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        let drained = timeout(self.write_wait, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tasks.abort_all();
            debug!(index = self.index(), "Connection tasks aborted after close deadline");
        }

        debug!(index = self.index(), "Connection shut down");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Dropping the JoinSet aborts the tasks; mark closed first so the
        // read loop's guard does not report a loss.
        self.close();
    }
}

// ============================================================================
// Waiter
// ============================================================================

/// Single-use reply slot for one outstanding request.
///
/// Dropping the waiter removes its handler-table entry; if the reply has
/// already been delivered the removal is a no-op.
pub(crate) struct Waiter {
    shared: Arc<Shared>,
    id: CorrelationId,
    rx: oneshot::Receiver<Response>,
}

impl Waiter {
    /// Waits for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionLost`] if the entry was cleared because
    /// the connection died.
    pub(crate) async fn wait(mut self) -> Result<Response> {
        match (&mut self.rx).await {
            Ok(response) => Ok(response),
            Err(_) => Err(Error::connection_lost(self.shared.index, self.id.clone())),
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.shared.state.lock().handlers.remove(&self.id);
    }
}

// ============================================================================
// Shared
// ============================================================================

impl Shared {
    /// Routes an inbound frame to its waiter.
    ///
    /// Frames that match nothing (late replies, server pushes) are dropped.
    fn deliver(&self, frame: &[u8]) {
        let response: Response = match from_slice(frame) {
            Ok(response) => response,
            Err(e) => {
                warn!(index = self.index, error = %e, "Failed to parse incoming frame");
                return;
            }
        };

        let handler = {
            let mut state = self.state.lock();
            response
                .correlation_keys()
                .find_map(|key| state.handlers.remove(key))
        };

        match handler {
            Some(tx) => {
                if tx.send(response).is_err() {
                    trace!(index = self.index, "Waiter dropped before delivery");
                }
            }
            None => {
                debug!(
                    index = self.index,
                    message_type = %response.message_type,
                    "Frame matched no pending request"
                );
            }
        }
    }

    /// Marks the connection dead and notifies the pool.
    ///
    /// Idempotent; only the first call per connection has any effect.
    fn mark_lost(&self, reason: &str) {
        let abandoned = {
            let mut state = self.state.lock();
            if !state.connected {
                return;
            }
            state.connected = false;
            std::mem::take(&mut state.handlers)
        };

        self.closed_tx.send_replace(true);

        warn!(
            index = self.index,
            generation = self.generation,
            abandoned = abandoned.len(),
            reason,
            "Connection lost"
        );
        drop(abandoned);

        let _ = self.lost_tx.send(LostConnection {
            index: self.index,
            generation: self.generation,
        });
    }
}

/// Marks the connection lost when a task exits for any reason.
struct LossGuard {
    shared: Arc<Shared>,
    reason: &'static str,
}

impl Drop for LossGuard {
    fn drop(&mut self) {
        self.shared.mark_lost(self.reason);
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// Decodes inbound frames until the socket fails or goes quiet.
async fn run_read_loop<S>(
    shared: Arc<Shared>,
    mut source: SplitStream<WebSocketStream<S>>,
    pong_wait: Duration,
    mut closed_rx: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let _guard = LossGuard {
        shared: Arc::clone(&shared),
        reason: "read loop exited",
    };

    loop {
        let next = tokio::select! {
            _ = closed_rx.changed() => break,
            next = timeout(pong_wait, source.next()) => next,
        };

        match next {
            Ok(Some(Ok(Message::Text(text)))) => shared.deliver(text.as_bytes()),

            Ok(Some(Ok(Message::Binary(data)))) => shared.deliver(&data),

            Ok(Some(Ok(Message::Close(frame)))) => {
                debug!(index = shared.index, ?frame, "WebSocket closed by remote");
                shared.mark_lost("closed by remote");
                break;
            }

            // Ping, Pong and raw frames only extend the deadline
            Ok(Some(Ok(_))) => trace!(index = shared.index, "Control frame"),

            Ok(Some(Err(e))) => {
                error!(index = shared.index, error = %e, "WebSocket read error");
                shared.mark_lost("read error");
                break;
            }

            Ok(None) => {
                shared.mark_lost("stream ended");
                break;
            }

            Err(_) => {
                shared.mark_lost("no inbound frame within liveness window");
                break;
            }
        }
    }

    trace!(index = shared.index, "Read loop terminated");
}

/// Writes queued frames and heartbeat pings.
async fn run_write_loop<S>(
    shared: Arc<Shared>,
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut write_rx: mpsc::UnboundedReceiver<WriteRequest>,
    ping_period: Duration,
    write_wait: Duration,
    mut closed_rx: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let _guard = LossGuard {
        shared: Arc::clone(&shared),
        reason: "write loop exited",
    };

    let mut heartbeat = interval_at(Instant::now() + ping_period, ping_period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = closed_rx.changed() => {
                let _ = timeout(write_wait, sink.close()).await;
                break;
            }

            _ = heartbeat.tick() => {
                match timeout(write_wait, sink.send(Message::Ping(Default::default()))).await {
                    Ok(Ok(())) => trace!(index = shared.index, "Ping sent"),
                    Ok(Err(e)) => {
                        warn!(index = shared.index, error = %e, "Ping write failed");
                        shared.mark_lost("ping write failed");
                        break;
                    }
                    Err(_) => {
                        shared.mark_lost("ping write timed out");
                        break;
                    }
                }
            }

            request = write_rx.recv() => {
                let Some(WriteRequest { text, ack }) = request else {
                    break;
                };

                let result = match timeout(write_wait, sink.send(Message::Text(text.into()))).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(Error::send(shared.index, e.to_string())),
                    Err(_) => Err(Error::send(
                        shared.index,
                        format!("write timed out after {}ms", write_wait.as_millis()),
                    )),
                };

                if let Err(e) = &result {
                    debug!(index = shared.index, error = %e, "Frame write failed");
                }
                let _ = ack.send(result);
            }
        }
    }

    // Fail anything still queued
    write_rx.close();
    while let Ok(WriteRequest { ack, .. }) = write_rx.try_recv() {
        let _ = ack.send(Err(Error::send(shared.index, "connection closed")));
    }

    trace!(index = shared.index, "Write loop terminated");
}

// ============================================================================
// Tests
// ============================================================================
