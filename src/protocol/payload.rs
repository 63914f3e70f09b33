//! Strongly typed payloads.
//!
//! Request payloads are embedded in [`Command`](super::Command) variants.
//! Reply payloads are decoded out of a [`Response`](super::Response) with
//! [`Response::decode`](super::Response::decode) as soon as they reach the
//! client layer.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Allocation Requests
// ============================================================================

/// Reserve `amount` units against the ledger `alias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRequest {
    /// Ledger alias.
    pub alias: String,

    /// Units to reserve.
    pub amount: f64,

    /// Free-form request metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl AllocationRequest {
    /// Creates an allocation request without metadata.
    #[inline]
    #[must_use]
    pub fn new(alias: impl Into<String>, amount: f64) -> Self {
        Self {
            alias: alias.into(),
            amount,
            metadata: None,
        }
    }

    /// Attaches metadata.
    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Settle a reservation made by an [`AllocationRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseAllocationRequest {
    /// Ledger alias.
    pub alias: String,

    /// Units actually consumed.
    pub amount: f64,

    /// ID returned in the [`AllocationResponse`].
    pub allocation_id: String,

    /// Free-form request metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl UseAllocationRequest {
    /// Creates a settlement without metadata.
    #[inline]
    #[must_use]
    pub fn new(alias: impl Into<String>, amount: f64, allocation_id: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            amount,
            allocation_id: allocation_id.into(),
            metadata: None,
        }
    }

    /// Attaches metadata.
    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

// ============================================================================
// Replies
// ============================================================================

/// Reply to `request_for_allocation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResponse {
    /// Reservation handle to pass to `use_allocation`.
    pub allocation_id: String,
}

/// Reply to `get_application_policies`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResponse {
    /// Configured policies.
    #[serde(default)]
    pub policies: Vec<Policy>,

    /// Total number of policies on the server.
    #[serde(default)]
    pub total: u64,
}

/// One endpoint policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Policy {
    pub policy_id: String,
    pub account_id: String,
    pub application_id: String,
    pub endpoint_pattern: String,
    pub endpoint_method: String,
    pub identity_field: String,
    pub identity_location: String,
    pub rate_limit: i64,
    pub rate_limit_interval: String,
    pub metering_expression: String,
    pub metering_trigger: String,
    pub stripe_price_id: String,
    pub stripe_customer_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PolicyResponse {
    /// Finds the policy for a method and route pattern.
    ///
    /// A policy with method `*` matches any method.
    #[must_use]
    pub fn find(&self, method: &str, pattern: &str) -> Option<&Policy> {
        self.policies.iter().find(|p| {
            p.endpoint_pattern == pattern
                && (p.endpoint_method == "*" || p.endpoint_method.eq_ignore_ascii_case(method))
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
