//! Type-safe identifiers.
//!
//! Newtype wrappers keep correlation IDs from being mixed up with other
//! strings that travel in the same frames (message types, error codes).

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Number of random bytes in the leading segment.
const RANDOM_BYTES: usize = 8;

/// Process-wide sequence appended to every generated ID.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// CorrelationId
// ============================================================================

/// Token linking an outgoing call to its inbound reply.
///
/// Generated IDs have the shape `<random>_<unix-nanos>_<sequence>`:
///
/// - `random`: 8 random bytes, base64url without padding
/// - `unix-nanos`: wall clock at generation
/// - `sequence`: process-wide counter, strictly increasing
///
/// The sequence alone makes IDs unique within a process; the random and
/// timestamp segments keep them unique across processes sharing a server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generates a fresh, never-before-issued ID.
    #[must_use]
    pub fn generate() -> Self {
        let uuid = Uuid::new_v4();
        let random = URL_SAFE_NO_PAD.encode(&uuid.as_bytes()[..RANDOM_BYTES]);

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);

        Self(format!("{random}_{nanos}_{sequence}"))
    }

    /// Wraps an ID received from the remote end.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ============================================================================
// Tests
// ============================================================================
