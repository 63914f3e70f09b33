//! Request and Response envelopes.
//!
//! Defines the frames exchanged with the remote end.

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;

use super::Command;

// ============================================================================
// Request
// ============================================================================

/// An outgoing frame.
///
/// # Format
///
/// ```json
/// {
///   "type": "request_for_allocation",
///   "payload": { ... },
///   "id": "correlation-id"
/// }
/// ```
///
/// `id` is present iff a reply is expected.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Command with type and payload.
    #[serde(flatten)]
    pub command: Command,

    /// Correlation ID for request/reply matching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<CorrelationId>,
}

impl Request {
    /// Creates a request that expects a reply.
    #[inline]
    #[must_use]
    pub fn with_id(id: CorrelationId, command: Command) -> Self {
        Self {
            command,
            id: Some(id),
        }
    }

    /// Creates a fire-and-forget request.
    #[inline]
    #[must_use]
    pub fn oneway(command: Command) -> Self {
        Self { command, id: None }
    }
}

// ============================================================================
// Response
// ============================================================================

/// An incoming frame.
///
/// # Format
///
/// ```json
/// {
///   "type": "allocation",
///   "payload": { ... },
///   "id": "correlation-id",
///   "replyTo": "correlation-id",
///   "message": "optional human readable text",
///   "error": "optional error code"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Message type.
    #[serde(rename = "type", default)]
    pub message_type: String,

    /// Reply data.
    #[serde(default)]
    pub payload: Value,

    /// The frame's own ID (echoes the request ID on most replies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CorrelationId>,

    /// ID of the request this frame answers.
    #[serde(rename = "replyTo", default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<CorrelationId>,

    /// Human-readable text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Error code (set iff the call failed remotely).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Keys to look the pending waiter up by, in order: `id`, then `replyTo`.
    ///
    /// Empty strings are skipped. `replyTo` is tried even when `id` is set,
    /// because some replies carry their own fresh `id` alongside the
    /// `replyTo` of the request they answer. Generated IDs are unique, so
    /// a reply's own `id` never matches another caller's waiter.
    pub fn correlation_keys(&self) -> impl Iterator<Item = &CorrelationId> {
        self.id
            .iter()
            .chain(self.reply_to.iter())
            .filter(|id| !id.as_str().is_empty())
    }

    /// Returns `true` if the frame carries a non-empty `error`.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Passes a successful reply through and turns an error reply into
    /// [`Error::Remote`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] if the frame carries a non-empty `error`.
    pub fn error_for_remote(self) -> Result<Self> {
        if !self.is_error() {
            return Ok(self);
        }

        let code = self.error.unwrap_or_default();
        let message = self
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| code.clone());
        Err(Error::remote(code, message))
    }

    /// Extracts the payload, turning a remote error into [`Error::Remote`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] if the frame carries a non-empty `error`.
    #[inline]
    pub fn into_result(self) -> Result<Value> {
        Ok(self.error_for_remote()?.payload)
    }

    /// Decodes the payload into a typed structure.
    ///
    /// # Errors
    ///
    /// - [`Error::Remote`] if the frame carries a non-empty `error`
    /// - [`Error::Json`] if the payload does not match `T`
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        let payload = self.into_result()?;
        Ok(serde_json::from_value(payload)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
