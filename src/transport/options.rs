//! Pool configuration.
//!
//! Every knob of the transport lives in [`PoolOptions`]. Defaults match a
//! long-lived production pool; tests shrink the timings.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use pooled_socket::PoolOptions;
//!
//! let options = PoolOptions::new("ws://127.0.0.1:9000/ws", "secret")
//!     .with_pool_size(4)
//!     .with_request_timeout(Duration::from_millis(500));
//! options.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default number of pooled connections.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Handshake header carrying the credential.
pub const DEFAULT_AUTH_HEADER: &str = "x-usage-key";

/// Interval between heartbeat pings.
pub const DEFAULT_PING_PERIOD: Duration = Duration::from_secs(30);

/// Liveness window: no inbound frame for this long kills the connection.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);

/// Deadline for a single frame write.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);

/// Deadline for dial plus WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-call deadline for `send_and_await`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// First reconnect delay.
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(5);

/// Upper bound on reconnect delay.
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Reconnect attempts per slot before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

// ============================================================================
// PoolOptions
// ============================================================================

/// Construction-time configuration of a [`ConnectionPool`](super::ConnectionPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub endpoint: String,

    /// Credential sent in [`auth_header`](Self::auth_header) at handshake.
    pub api_key: String,

    /// Header name for the credential.
    pub auth_header: String,

    /// Number of connections to maintain.
    pub pool_size: usize,

    /// Heartbeat period.
    pub ping_period: Duration,

    /// Liveness window.
    pub pong_wait: Duration,

    /// Single write deadline.
    pub write_wait: Duration,

    /// Dial and handshake deadline.
    pub connect_timeout: Duration,

    /// Default `send_and_await` deadline.
    pub request_timeout: Duration,

    /// Reconnect delay for attempt 0.
    pub reconnect_base_delay: Duration,

    /// Reconnect delay cap.
    pub reconnect_max_delay: Duration,

    /// Attempts before a slot is left disconnected.
    pub max_reconnect_attempts: u32,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            auth_header: DEFAULT_AUTH_HEADER.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            ping_period: DEFAULT_PING_PERIOD,
            pong_wait: DEFAULT_PONG_WAIT,
            write_wait: DEFAULT_WRITE_WAIT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            reconnect_max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl PoolOptions {
    /// Creates options for an endpoint and credential with default timings.
    #[inline]
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl PoolOptions {
    /// Sets the endpoint.
    #[inline]
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the credential.
    #[inline]
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Sets the credential header name.
    #[inline]
    #[must_use]
    pub fn with_auth_header(mut self, header: impl Into<String>) -> Self {
        self.auth_header = header.into();
        self
    }

    /// Sets the number of pooled connections.
    #[inline]
    #[must_use]
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Sets the heartbeat period.
    #[inline]
    #[must_use]
    pub fn with_ping_period(mut self, period: Duration) -> Self {
        self.ping_period = period;
        self
    }

    /// Sets the liveness window.
    #[inline]
    #[must_use]
    pub fn with_pong_wait(mut self, wait: Duration) -> Self {
        self.pong_wait = wait;
        self
    }

    /// Sets the single-write deadline.
    #[inline]
    #[must_use]
    pub fn with_write_wait(mut self, wait: Duration) -> Self {
        self.write_wait = wait;
        self
    }

    /// Sets the dial and handshake deadline.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the default call deadline.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets reconnect base delay and cap.
    #[inline]
    #[must_use]
    pub fn with_reconnect_delay(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_base_delay = base;
        self.reconnect_max_delay = max;
        self
    }

    /// Sets the number of reconnect attempts per slot.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl PoolOptions {
    /// Checks that the timings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::config("pool_size must be at least 1"));
        }

        if self.auth_header.is_empty() {
            return Err(Error::config("auth_header must not be empty"));
        }

        let durations = [
            ("ping_period", self.ping_period),
            ("pong_wait", self.pong_wait),
            ("write_wait", self.write_wait),
            ("connect_timeout", self.connect_timeout),
            ("request_timeout", self.request_timeout),
            ("reconnect_base_delay", self.reconnect_base_delay),
            ("reconnect_max_delay", self.reconnect_max_delay),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(Error::config(format!("{name} must be non-zero")));
        }

        if self.ping_period >= self.pong_wait {
            return Err(Error::config(format!(
                "ping_period ({:?}) must be shorter than pong_wait ({:?})",
                self.ping_period, self.pong_wait
            )));
        }

        if self.reconnect_base_delay > self.reconnect_max_delay {
            return Err(Error::config(format!(
                "reconnect_base_delay ({:?}) exceeds reconnect_max_delay ({:?})",
                self.reconnect_base_delay, self.reconnect_max_delay
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
