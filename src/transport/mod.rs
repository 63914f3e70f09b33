//! Pooled WebSocket transport.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                         ┌──────────────────┐
//! │   ConnectionPool     │                         │  Remote service  │
//! │                      │   N WebSocket sessions  │                  │
//! │  Connection[0]  ─────┼────────────────────────►│                  │
//! │  Connection[1]  ─────┼────────────────────────►│                  │
//! │  ...                 │   request  {type,id}    │                  │
//! │  Connection[N-1] ────┼◄────────────────────────│  reply {id}      │
//! └──────────────────────┘                         └──────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `ConnectionPool::connect` - Dial every slot in parallel
//! 2. `ConnectionPool::send_and_await` - Route a call to the least-busy slot
//! 3. Connection lost - Pending calls fail, a reconnector retries with backoff
//! 4. `ConnectionPool::close` - Close every slot and stop background tasks
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | One WebSocket session and its read/write loops |
//! | `dial` | Client handshake with the credential header |
//! | `options` | Pool configuration |
//! | `pool` | Slot management and connection selection |
//! | `reconnect` | Backoff schedule and per-slot reconnector |

// ============================================================================
// Submodules
// ============================================================================

/// One WebSocket session and its read/write loops.
pub mod connection;

/// Client handshake.
mod dial;

/// Pool configuration.
pub mod options;

/// Slot management and connection selection.
pub mod pool;

/// Backoff schedule and per-slot reconnector.
pub mod reconnect;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
pub use options::PoolOptions;
pub use pool::ConnectionPool;
pub use reconnect::Backoff;
