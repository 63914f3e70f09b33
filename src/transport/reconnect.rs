//! Per-slot reconnection with exponential backoff.
//!
//! When a connection dies the pool starts one reconnector for its slot.
//! Attempt `n` waits `base * 2^n` (capped at `max`) and then dials; the
//! first success replaces the slot's connection in place. After
//! `max_attempts` failures the slot is left disconnected until
//! [`ConnectionPool::reconnect`](super::ConnectionPool::reconnect) is called.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Weak;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::options::PoolOptions;
use super::pool::ConnectionPool;

// ============================================================================
// Backoff
// ============================================================================

/// Reconnect delay schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_attempts: u32,
}

impl Backoff {
    /// Creates a schedule.
    #[inline]
    #[must_use]
    pub const fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            max_attempts,
        }
    }

    /// Creates the schedule configured in `options`.
    #[inline]
    #[must_use]
    pub fn from_options(options: &PoolOptions) -> Self {
        Self::new(
            options.reconnect_base_delay,
            options.reconnect_max_delay,
            options.max_reconnect_attempts,
        )
    }

    /// Returns the number of attempts before giving up.
    #[inline]
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt` (zero-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Iterates over the delays of every attempt.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts).map(|attempt| self.delay(attempt))
    }
}

// ============================================================================
// Reconnect Loop
// ============================================================================

/// Retries slot `index` until it reconnects, the pool closes, or the
/// schedule runs out.
///
/// Holds only a weak reference between attempts so a dropped pool ends
/// the loop. Returns `true` if a connection was installed.
pub(crate) async fn run_reconnect_loop(
    pool: Weak<ConnectionPool>,
    index: usize,
    token: u64,
    backoff: Backoff,
) -> bool {
    for (attempt, delay) in backoff.delays().enumerate() {
        debug!(index, attempt, ?delay, "Reconnect scheduled");
        sleep(delay).await;

        let Some(pool) = pool.upgrade() else {
            return false;
        };
        if pool.is_closed() {
            return false;
        }

        match pool.connect_slot(index, Some(token)).await {
            Ok(()) => {
                info!(index, attempt, "Slot reconnected");
                return true;
            }
            Err(e) => {
                warn!(index, attempt, error = %e, "Reconnect attempt failed");
            }
        }
    }

    warn!(
        index,
        attempts = backoff.max_attempts(),
        "Reconnect attempts exhausted, slot stays disconnected"
    );
    false
}

// ============================================================================
// Tests
// ============================================================================
