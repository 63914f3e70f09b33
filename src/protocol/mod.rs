//! WebSocket protocol message types.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Local → Remote | Typed command, optionally correlated |
//! | `Response` | Remote → Local | Reply matched by `id` or `replyTo` |
//!
//! Frames are JSON text messages. Payloads are typed on the way out
//! ([`Command`]) and decoded into typed replies on the way in
//! ([`Response::decode`]).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command definitions by message type |
//! | `payload` | Request and reply payload structs |
//! | `request` | Request and Response envelopes |

// ============================================================================
// Submodules
// ============================================================================

/// Command definitions by message type.
pub mod command;

/// Typed payload structures.
pub mod payload;

/// Request and Response envelopes.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::Command;
pub use payload::{
    AllocationRequest, AllocationResponse, Policy, PolicyResponse, UseAllocationRequest,
};
pub use request::{Request, Response};
