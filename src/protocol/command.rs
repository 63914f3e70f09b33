//! Command definitions by message type.
//!
//! Each variant serializes to the `{"type": ..., "payload": ...}` half of
//! the wire envelope. [`Request`](super::Request) adds the optional `id`.
//!
//! | Type | Payload | Reply payload |
//! |------|---------|---------------|
//! | `echo` | any JSON | the same JSON |
//! | `request_for_allocation` | [`AllocationRequest`] | [`AllocationResponse`](super::AllocationResponse) |
//! | `use_allocation` | [`UseAllocationRequest`] | ignored |
//! | `get_application_policies` | none | [`PolicyResponse`](super::PolicyResponse) |
//! | `ping` | none | none |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::payload::{AllocationRequest, UseAllocationRequest};

// ============================================================================
// Command
// ============================================================================

/// A typed outgoing message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    /// Ask the server to reflect the payload back.
    #[serde(rename = "echo")]
    Echo(Value),

    /// Reserve an amount against a ledger before doing the work.
    #[serde(rename = "request_for_allocation")]
    RequestForAllocation(AllocationRequest),

    /// Settle a previously reserved allocation.
    #[serde(rename = "use_allocation")]
    UseAllocation(UseAllocationRequest),

    /// Fetch the endpoint policies configured for this application.
    #[serde(rename = "get_application_policies")]
    GetApplicationPolicies,

    /// Application-level keepalive.
    #[serde(rename = "ping")]
    Ping,
}

impl Command {
    /// Returns the wire `type` string.
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Echo(_) => "echo",
            Self::RequestForAllocation(_) => "request_for_allocation",
            Self::UseAllocation(_) => "use_allocation",
            Self::GetApplicationPolicies => "get_application_policies",
            Self::Ping => "ping",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
