//! Pooled Socket - Request/reply RPC over a pool of WebSocket connections.
//!
//! This library keeps a fixed number of long-lived WebSocket sessions open
//! to a usage service and multiplexes request/reply calls over them.
//!
//! # Architecture
//!
//! - **Pool**: N connections dialed in parallel; each call goes to the
//!   live connection with the fewest calls in flight
//! - **Connection**: one read loop that routes replies by correlation ID,
//!   one write loop that serializes frames and sends heartbeats
//! - **Reconnector**: a dead slot is redialed with exponential backoff
//!   and replaced in place
//!
//! Key design principles:
//!
//! - A dead read path fails every pending call on that connection at once
//! - A failed data write fails only that call
//! - Every transport failure is a degraded-mode error; only
//!   [`Error::Remote`] reports a business-rule failure
//!
//! # Quick Start
//!
//! ```no_run
//! use pooled_socket::{AllocationRequest, Client, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder()
//!         .endpoint("wss://usage.example.com/ws")
//!         .api_key("secret")
//!         .pool_size(4)
//!         .build()
//!         .await?;
//!
//!     match client.request_allocation(AllocationRequest::new("tokens", 12.0)).await {
//!         Ok(allocation) => println!("allocated {}", allocation.allocation_id),
//!         Err(e) if e.is_degraded() => println!("usage service unavailable: {e}"),
//!         Err(e) => return Err(e),
//!     }
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Typed client, builder and policy poller |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Correlation IDs |
//! | [`protocol`] | Wire message types |
//! | [`transport`] | Connection pool and WebSocket sessions |
//!
//! # Features
//!
//! - **`rustls`**: `wss://` endpoints via rustls with webpki roots
//! - **`native-tls`**: `wss://` endpoints via the platform TLS library

// ============================================================================
// Modules
// ============================================================================

/// Typed client over the connection pool.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Correlation identifiers.
pub mod identifiers;

/// WebSocket protocol message types.
///
/// Defines the request and response envelopes and their payloads.
pub mod protocol;

/// Pooled WebSocket transport.
///
/// Connection pool, per-connection loops, and reconnection.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, PolicyPoller};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::CorrelationId;

// Protocol types
pub use protocol::{
    AllocationRequest, AllocationResponse, Command, Policy, PolicyResponse, Request, Response,
    UseAllocationRequest,
};

// Transport types
pub use transport::{Backoff, Connection, ConnectionPool, PoolOptions};
