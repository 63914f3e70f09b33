//! Typed client over the connection pool.
//!
//! The [`Client`] struct wraps a [`ConnectionPool`] and exposes one method
//! per supported command.
//!
//! # Degraded Mode
//!
//! Transport failures ([`Error::is_degraded`](crate::Error::is_degraded))
//! mean "the usage service could not answer". Callers on a request path
//! are expected to log them and carry on.
//!
//! # Example
//!
//! ```ignore
//! use pooled_socket::{AllocationRequest, Client};
//!
//! let client = Client::builder()
//!     .endpoint("wss://usage.example.com/ws")
//!     .api_key("secret")
//!     .build()
//!     .await?;
//!
//! let allocation = client
//!     .request_allocation(AllocationRequest::new("tokens", 12.0))
//!     .await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::protocol::{
    AllocationRequest, AllocationResponse, Command, PolicyResponse, Response,
    UseAllocationRequest,
};
use crate::transport::ConnectionPool;

use super::builder::ClientBuilder;
use super::poller::PolicyPoller;

// ============================================================================
// Client
// ============================================================================

/// Handle to a pooled usage-service connection.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Clone)]
pub struct Client {
    pool: Arc<ConnectionPool>,
}

// ============================================================================
// Client - Display
// ============================================================================

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.pool.options().endpoint)
            .field("connections", &self.pool.connection_count())
            .field("pending", &self.pool.pending_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Constructors
// ============================================================================

impl Client {
    /// Creates a configuration builder for the client.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Wraps an existing pool.
    #[inline]
    #[must_use]
    pub fn from_pool(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }
}

// ============================================================================
// Client - Commands
// ============================================================================

impl Client {
    /// Sends a raw command and waits for its reply.
    ///
    /// # Errors
    ///
    /// See [`ConnectionPool::send_and_await`].
    #[inline]
    pub async fn send_and_await(&self, command: Command) -> Result<Response> {
        self.pool.send_and_await(command).await
    }

    /// Sends a raw command without waiting for a reply.
    ///
    /// # Errors
    ///
    /// See [`ConnectionPool::send`].
    #[inline]
    pub async fn send(&self, command: Command) -> Result<()> {
        self.pool.send(command).await
    }

    /// Round-trips `payload` through the server.
    ///
    /// # Errors
    ///
    /// See [`ConnectionPool::send_and_await`].
    pub async fn echo(&self, payload: Value) -> Result<Value> {
        self.send_and_await(Command::Echo(payload))
            .await?
            .into_result()
    }

    /// Reserves an amount against an alias.
    ///
    /// # Errors
    ///
    /// - [`Error::Remote`](crate::Error::Remote) if the server refuses the
    ///   allocation
    /// - any transport error from [`ConnectionPool::send_and_await`]
    pub async fn request_allocation(&self, request: AllocationRequest) -> Result<AllocationResponse> {
        debug!(alias = %request.alias, amount = request.amount, "Requesting allocation");
        self.send_and_await(Command::RequestForAllocation(request))
            .await?
            .decode()
    }

    /// Records usage against an earlier allocation.
    ///
    /// # Errors
    ///
    /// - [`Error::Remote`](crate::Error::Remote) if the server rejects it
    /// - any transport error from [`ConnectionPool::send_and_await`]
    pub async fn use_allocation(&self, request: UseAllocationRequest) -> Result<()> {
        debug!(
            alias = %request.alias,
            allocation_id = %request.allocation_id,
            "Using allocation"
        );
        self.send_and_await(Command::UseAllocation(request)).await?;
        Ok(())
    }

    /// Fetches the application's policies.
    ///
    /// # Errors
    ///
    /// See [`ConnectionPool::send_and_await`].
    pub async fn application_policies(&self) -> Result<PolicyResponse> {
        self.send_and_await(Command::GetApplicationPolicies)
            .await?
            .decode()
    }

    /// Starts a background task that refreshes policies every `interval`.
    #[must_use]
    pub fn poll_policies(&self, interval: Duration) -> PolicyPoller {
        PolicyPoller::spawn(self.clone(), interval)
    }
}

// ============================================================================
// Client - Lifecycle
// ============================================================================

impl Client {
    /// Returns `true` if at least one pooled connection is live.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.pool.is_connected()
    }

    /// Redials every disconnected slot.
    ///
    /// Returns the number of live connections afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`](crate::Error::Closed) after [`close`](Self::close).
    pub async fn reconnect(&self) -> Result<usize> {
        self.pool.reconnect().await
    }

    /// Closes the pool. Idempotent.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
