//! Error types for the pooled socket transport.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use pooled_socket::{Client, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let policies = client.application_policies().await?;
//!     println!("{} policies", policies.total);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connect`], [`Error::ConnectionTimeout`], [`Error::ConnectionLost`] |
//! | Degraded | [`Error::NoConnectionAvailable`], [`Error::RequestTimeout`], [`Error::Send`], [`Error::Closed`] |
//! | Remote | [`Error::Remote`] |
//! | Protocol | [`Error::Protocol`] |
//! | External | [`Error::Json`], [`Error::Url`] |
//!
//! Only [`Error::Remote`] reports a business-rule failure. Everything in the
//! degraded group means the transport could not answer, and callers are
//! expected to carry on with their primary operation.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;
use std::time::Duration;

use thiserror::Error;

use crate::identifiers::CorrelationId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when pool or client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Dial or handshake failed.
    ///
    /// Retried in the background by the reconnector, never returned from
    /// a send.
    #[error("Connect failed for slot {index}: {message}")]
    Connect {
        /// Pool slot that failed to connect.
        index: usize,
        /// Description of the dial failure.
        message: String,
    },

    /// Handshake did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The connection carrying this call lost its read path.
    ///
    /// Every call pending on that connection is abandoned at once.
    #[error("Connection {index} lost while request {id} was pending")]
    ConnectionLost {
        /// Pool slot of the dead connection.
        index: usize,
        /// The abandoned request.
        id: CorrelationId,
    },

    // ========================================================================
    // Degraded-Mode Errors
    // ========================================================================
    /// No live connection in the pool.
    #[error("No connection available")]
    NoConnectionAvailable,

    /// No reply arrived within the call timeout.
    #[error("Request {id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        id: CorrelationId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Writing this one frame failed.
    ///
    /// The connection itself stays in service.
    #[error("Send failed on connection {index}: {message}")]
    Send {
        /// Pool slot the write was attempted on.
        index: usize,
        /// Description of the write failure.
        message: String,
    },

    /// The pool has been closed.
    #[error("Pool closed")]
    Closed,

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// A well-formed reply carried a non-empty `error` field.
    #[error("Remote error: {message}")]
    Remote {
        /// Error code from the reply's `error` field.
        code: String,
        /// Human-readable message (falls back to the code).
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Unexpected message shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Endpoint URL could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connect failure for a pool slot.
    #[inline]
    pub fn connect(index: usize, message: impl Into<String>) -> Self {
        Self::Connect {
            index,
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a connection lost error.
    #[inline]
    pub fn connection_lost(index: usize, id: CorrelationId) -> Self {
        Self::ConnectionLost { index, id }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(id: CorrelationId, timeout_ms: u64) -> Self {
        Self::RequestTimeout { id, timeout_ms }
    }

    /// Creates a single-send failure.
    #[inline]
    pub fn send(index: usize, message: impl Into<String>) -> Self {
        Self::Send {
            index,
            message: message.into(),
        }
    }

    /// Creates a remote error.
    #[inline]
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

/// Converts a deadline to whole milliseconds for error fields, saturating.
#[inline]
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if the transport could not answer.
    ///
    /// Callers should proceed with their primary operation.
    #[inline]
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            Self::NoConnectionAvailable
                | Self::RequestTimeout { .. }
                | Self::ConnectionLost { .. }
                | Self::Send { .. }
                | Self::Closed
        )
    }

    /// Returns `true` if the remote end rejected the call.
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionLost { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
