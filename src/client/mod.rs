//! User-facing client.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Typed calls over a connection pool |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`PolicyPoller`] | Periodic policy refresh |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for client configuration.
pub mod builder;

/// Core client implementation.
pub mod core;

/// Periodic policy refresh.
pub mod poller;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::Client;
pub use poller::{DEFAULT_POLL_INTERVAL, PolicyPoller};
