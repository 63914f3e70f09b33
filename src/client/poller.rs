//! Periodic policy refresh.
//!
//! A [`PolicyPoller`] issues `get_application_policies` on a fixed interval
//! and keeps the last successful reply. A failed refresh keeps the previous
//! snapshot.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, trace};

use crate::protocol::PolicyResponse;

use super::core::Client;

// ============================================================================
// Constants
// ============================================================================

/// Default refresh interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// PolicyPoller
// ============================================================================

/// Background policy refresher.
///
/// Stops when dropped.
#[derive(Debug)]
pub struct PolicyPoller {
    snapshot: watch::Receiver<Option<PolicyResponse>>,
    task: JoinHandle<()>,
}

impl PolicyPoller {
    /// Starts polling. The first refresh runs immediately.
    pub(crate) fn spawn(client: Client, every: Duration) -> Self {
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(run_poll_loop(client, every, tx));
        Self { snapshot: rx, task }
    }

    /// Returns the most recent successful reply, if any.
    #[must_use]
    pub fn latest(&self) -> Option<PolicyResponse> {
        self.snapshot.borrow().clone()
    }

    /// Waits until a new snapshot is stored.
    ///
    /// Returns `false` once the poller has stopped.
    pub async fn changed(&mut self) -> bool {
        self.snapshot.changed().await.is_ok()
    }

    /// Returns `true` while the task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops polling.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for PolicyPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ============================================================================
// Poll Loop
// ============================================================================

async fn run_poll_loop(
    client: Client,
    every: Duration,
    snapshot: watch::Sender<Option<PolicyResponse>>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if client.pool().is_closed() {
            debug!("Pool closed, policy poller stopping");
            return;
        }

        match client.application_policies().await {
            Ok(policies) => {
                trace!(total = policies.total, "Policies refreshed");
                snapshot.send_replace(Some(policies));
            }
            Err(e) => {
                debug!(error = %e, "Policy refresh failed, keeping previous snapshot");
            }
        }
    }
}
