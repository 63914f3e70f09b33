//! Fixed-size pool of self-healing WebSocket connections.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                ConnectionPool                │
//! │  slot 0 → Connection (live, 2 pending)       │
//! │  slot 1 → Connection (live, 0 pending)  ◄─── least busy
//! │  slot 2 → Connection (lost) ◄─ reconnector   │
//! │                                              │
//! │  supervisor ◄── LostConnection notices       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! - Calls go to the live connection with the fewest pending requests;
//!   ties rotate through a round-robin cursor.
//! - A lost connection stays in its slot (never selected) until its
//!   reconnector installs a replacement at the same index.
//! - The supervisor and reconnectors run in the pool's [`JoinSet`] and are
//!   aborted by [`ConnectionPool::close`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::protocol::{Command, Response};

use super::connection::{Connection, LostConnection};
use super::options::PoolOptions;
use super::reconnect::{Backoff, run_reconnect_loop};

// ============================================================================
// ConnectionPool
// ============================================================================

/// Pool of connections to one logical endpoint.
///
/// Thread-safe; share it as `Arc<ConnectionPool>`.
///
/// # Example
///
/// ```ignore
/// let pool = ConnectionPool::connect(PoolOptions::new("ws://127.0.0.1:9000/ws", "key")).await?;
///
/// let reply = pool.send_and_await(Command::Echo(json!({"hello": "world"}))).await?;
/// pool.send(Command::Ping).await?;
///
/// pool.close().await;
/// ```
pub struct ConnectionPool {
    /// Construction-time configuration.
    options: PoolOptions,

    /// Reconnect schedule.
    backoff: Backoff,

    /// One entry per slot; `None` until the slot first connects.
    slots: RwLock<Vec<Option<Arc<Connection>>>>,

    /// Round-robin position among equally loaded connections.
    cursor: AtomicUsize,

    /// Slots with a running reconnector, keyed to that reconnector's token.
    reconnecting: Mutex<FxHashMap<usize, u64>>,

    /// Token source for reconnectors.
    next_token: AtomicU64,

    /// Sender handed to every connection for loss notices.
    lost_tx: mpsc::UnboundedSender<LostConnection>,

    /// Supervisor and reconnector tasks.
    tasks: Mutex<JoinSet<()>>,

    /// Set once by `close`.
    closed: AtomicBool,
}

// ============================================================================
// ConnectionPool - Constructor
// ============================================================================

impl ConnectionPool {
    /// Creates an empty pool and starts its supervisor.
    ///
    /// No connections are dialed; call [`initialize`](Self::initialize).
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `options` fail validation.
    pub fn new(options: PoolOptions) -> Result<Arc<Self>> {
        options.validate()?;

        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        let size = options.pool_size;

        let pool = Arc::new(Self {
            backoff: Backoff::from_options(&options),
            options,
            slots: RwLock::new(vec![None; size]),
            cursor: AtomicUsize::new(0),
            reconnecting: Mutex::new(FxHashMap::default()),
            next_token: AtomicU64::new(1),
            lost_tx,
            tasks: Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
        });

        pool.tasks
            .lock()
            .spawn(run_supervisor(Arc::downgrade(&pool), lost_rx));

        info!(size, endpoint = %pool.options.endpoint, "ConnectionPool created");

        Ok(pool)
    }

    /// Creates a pool and runs the first connection round.
    ///
    /// Succeeds even if no slot connected; failed slots retry in the
    /// background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `options` fail validation.
    pub async fn connect(options: PoolOptions) -> Result<Arc<Self>> {
        let pool = Self::new(options)?;
        pool.initialize().await?;
        Ok(pool)
    }
}

// ============================================================================
// ConnectionPool - Public API
// ============================================================================

impl ConnectionPool {
    /// Dials every empty or dead slot in parallel.
    ///
    /// Returns after the round completes with the number of live
    /// connections. Slots that failed are handed to a reconnector.
    /// Slots that already have a reconnector are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the pool has been closed.
    pub async fn initialize(self: &Arc<Self>) -> Result<usize> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let targets: Vec<usize> = {
            let slots = self.slots.read();
            let reconnecting = self.reconnecting.lock();
            slots
                .iter()
                .enumerate()
                .filter(|(index, slot)| {
                    !reconnecting.contains_key(index)
                        && !slot.as_ref().is_some_and(|c| c.is_connected())
                })
                .map(|(index, _)| index)
                .collect()
        };

        let results = join_all(targets.iter().map(|&index| self.connect_slot(index, None))).await;

        let mut failed = 0usize;
        for (&index, result) in targets.iter().zip(results) {
            if let Err(e) = result {
                debug!(index, error = %e, "Initial connect failed, retrying in background");
                failed += 1;
                self.spawn_reconnector(index);
            }
        }

        let live = self.connection_count();
        info!(
            attempted = targets.len(),
            live,
            failed,
            "ConnectionPool connection round complete"
        );

        Ok(live)
    }

    /// Explicit reconnect trigger.
    ///
    /// Restarts slots whose reconnector gave up, with a fresh attempt budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the pool has been closed.
    pub async fn reconnect(self: &Arc<Self>) -> Result<usize> {
        self.initialize().await
    }

    /// Returns the least-busy live connection.
    ///
    /// `None` means the pool is degraded, not that something failed.
    #[must_use]
    pub fn select_connection(&self) -> Option<Arc<Connection>> {
        let slots = self.slots.read();

        let loads: Vec<(&Arc<Connection>, usize)> = slots
            .iter()
            .flatten()
            .filter_map(|connection| connection.load().map(|load| (connection, load)))
            .collect();

        let min = loads.iter().map(|(_, load)| *load).min()?;
        let tied: Vec<&Arc<Connection>> = loads
            .iter()
            .filter(|(_, load)| *load == min)
            .map(|(connection, _)| *connection)
            .collect();

        let pick = self.cursor.fetch_add(1, Ordering::Relaxed) % tied.len();
        Some(Arc::clone(tied[pick]))
    }

    /// Sends a command and waits for its reply with the configured timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::NoConnectionAvailable`] if no connection is live
    /// - [`Error::RequestTimeout`] if no reply arrived in time
    /// - [`Error::ConnectionLost`] if the connection died while waiting
    /// - [`Error::Send`] if the frame could not be written
    /// - [`Error::Remote`] if the reply carries an error
    pub async fn send_and_await(&self, command: Command) -> Result<Response> {
        self.send_and_await_with_timeout(command, self.options.request_timeout)
            .await
    }

    /// Sends a command and waits for its reply with a custom timeout.
    ///
    /// # Errors
    ///
    /// See [`send_and_await`](Self::send_and_await).
    pub async fn send_and_await_with_timeout(
        &self,
        command: Command,
        call_timeout: Duration,
    ) -> Result<Response> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let connection = self
            .select_connection()
            .ok_or(Error::NoConnectionAvailable)?;

        connection
            .send_and_await(command, call_timeout)
            .await?
            .error_for_remote()
    }

    /// Sends a command without waiting for a reply.
    ///
    /// # Errors
    ///
    /// - [`Error::NoConnectionAvailable`] if no connection is live
    /// - [`Error::Send`] if the frame could not be written
    pub async fn send(&self, command: Command) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let connection = self
            .select_connection()
            .ok_or(Error::NoConnectionAvailable)?;

        connection.send(command).await
    }

    /// Returns `true` if at least one connection is live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.slots
            .read()
            .iter()
            .flatten()
            .any(|connection| connection.is_connected())
    }

    /// Returns the number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.slots
            .read()
            .iter()
            .flatten()
            .filter(|connection| connection.is_connected())
            .count()
    }

    /// Returns the number of calls waiting for a reply, across all slots.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.slots
            .read()
            .iter()
            .flatten()
            .map(|connection| connection.pending_count())
            .sum()
    }

    /// Returns the number of slots with a running reconnector.
    #[must_use]
    pub fn reconnecting_count(&self) -> usize {
        self.reconnecting.lock().len()
    }

    /// Returns the connection currently in slot `index`, live or not.
    #[must_use]
    pub fn connection(&self, index: usize) -> Option<Arc<Connection>> {
        self.slots.read().get(index).cloned().flatten()
    }

    /// Returns the configured pool size.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.options.pool_size
    }

    /// Returns the pool configuration.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// ConnectionPool - Lifecycle
// ============================================================================

impl ConnectionPool {
    /// Closes every connection and stops all background tasks.
    ///
    /// Idempotent and safe to call concurrently.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("ConnectionPool shutting down");
        }

        self.tasks.lock().abort_all();

        let connections: Vec<Arc<Connection>> = {
            let mut slots = self.slots.write();
            slots.iter_mut().filter_map(Option::take).collect()
        };
        self.reconnecting.lock().clear();

        if connections.is_empty() {
            return;
        }

        join_all(connections.iter().map(|connection| connection.shutdown())).await;

        info!(count = connections.len(), "ConnectionPool closed");
    }
}

// ============================================================================
// ConnectionPool - Slot Management
// ============================================================================

impl ConnectionPool {
    /// Dials slot `index` and installs the result.
    ///
    /// `token` identifies the calling reconnector, if any.
    pub(crate) async fn connect_slot(&self, index: usize, token: Option<u64>) -> Result<()> {
        let connection = Connection::open(index, &self.options, self.lost_tx.clone()).await?;
        self.install(index, Arc::new(connection), token)
    }

    /// Places `connection` in slot `index`.
    ///
    /// Only an empty or dead slot is replaced. Clears the reconnector entry
    /// owned by `token` under the same write lock, so a loss notice for the
    /// new connection always finds the slot free to reconnect.
    pub(crate) fn install(
        &self,
        index: usize,
        connection: Arc<Connection>,
        token: Option<u64>,
    ) -> Result<()> {
        let previous = {
            let mut slots = self.slots.write();

            if self.is_closed() {
                connection.close();
                return Err(Error::Closed);
            }

            if !connection.is_connected() {
                return Err(Error::connect(index, "connection lost before install"));
            }

            let Some(slot) = slots.get_mut(index) else {
                connection.close();
                return Err(Error::protocol(format!("slot {index} out of range")));
            };

            if slot.as_ref().is_some_and(|current| current.is_connected()) {
                debug!(index, "Slot already live, discarding new connection");
                connection.close();
                self.release_reconnector(index, token);
                return Ok(());
            }

            let previous = slot.replace(connection);
            self.release_reconnector(index, token);
            previous
        };

        if let Some(previous) = previous {
            previous.close();
        }

        debug!(index, "Connection installed");
        Ok(())
    }

    /// Starts a reconnector for `index` unless one is already running.
    fn spawn_reconnector(self: &Arc<Self>, index: usize) {
        if self.is_closed() {
            return;
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        {
            let mut reconnecting = self.reconnecting.lock();
            if reconnecting.contains_key(&index) {
                trace!(index, "Reconnector already running");
                return;
            }
            reconnecting.insert(index, token);
        }

        let pool = Arc::downgrade(self);
        let backoff = self.backoff;

        let mut tasks = self.tasks.lock();
        // Reap finished reconnectors
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            let reconnected = run_reconnect_loop(pool.clone(), index, token, backoff).await;
            if !reconnected && let Some(pool) = pool.upgrade() {
                pool.release_reconnector(index, Some(token));
            }
        });

        debug!(index, token, "Reconnector started");
    }

    /// Removes the reconnector entry for `index` if `token` still owns it.
    fn release_reconnector(&self, index: usize, token: Option<u64>) {
        let Some(token) = token else {
            return;
        };

        let mut reconnecting = self.reconnecting.lock();
        if reconnecting.get(&index) == Some(&token) {
            reconnecting.remove(&index);
        }
    }

    /// Reacts to a loss notice from a connection.
    fn handle_lost(self: &Arc<Self>, lost: LostConnection) {
        if self.is_closed() {
            return;
        }

        // Held across spawn so `install` cannot interleave
        let slots = self.slots.read();
        let current = slots
            .get(lost.index)
            .and_then(|slot| slot.as_ref())
            .map(|connection| connection.generation());

        if current != Some(lost.generation) {
            trace!(index = lost.index, "Stale loss notice ignored");
            return;
        }

        self.spawn_reconnector(lost.index);
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Turns loss notices into reconnectors.
async fn run_supervisor(pool: Weak<ConnectionPool>, mut lost_rx: mpsc::UnboundedReceiver<LostConnection>) {
    debug!("Pool supervisor started");

    while let Some(lost) = lost_rx.recv().await {
        let Some(pool) = pool.upgrade() else {
            break;
        };
        pool.handle_lost(lost);
    }

    debug!("Pool supervisor terminated");
}

// ============================================================================
// Tests
// ============================================================================
