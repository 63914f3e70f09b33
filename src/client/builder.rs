//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//!
//! # Example
//!
//! ```ignore
//! use pooled_socket::Client;
//!
//! let client = Client::builder()
//!     .endpoint("wss://usage.example.com/ws")
//!     .api_key("secret")
//!     .pool_size(4)
//!     .build()
//!     .await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::transport::{ConnectionPool, PoolOptions};

use super::core::Client;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct ClientBuilder {
    /// Endpoint override.
    endpoint: Option<String>,
    /// Credential override.
    api_key: Option<String>,
    /// Everything else.
    options: PoolOptions,
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new builder with default pool options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the WebSocket endpoint.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - `ws://` or `wss://` URL
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the credential sent at handshake.
    #[inline]
    #[must_use]
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the number of pooled connections.
    #[inline]
    #[must_use]
    pub fn pool_size(mut self, size: usize) -> Self {
        self.options.pool_size = size;
        self
    }

    /// Sets the default per-call timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = timeout;
        self
    }

    /// Replaces every pool option.
    ///
    /// Endpoint and credential set on the builder take precedence over the
    /// ones in `options`.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: PoolOptions) -> Self {
        self.options = options;
        self
    }

    /// Validates the configuration and connects the pool.
    ///
    /// Returns once the first connection round has finished, even if some
    /// or all slots failed; those keep retrying in the background.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if endpoint or credential is missing, or the
    ///   pool options are invalid
    /// - [`Error::Url`] if the endpoint does not parse
    pub async fn build(self) -> Result<Client> {
        let options = self.into_options()?;
        let pool = ConnectionPool::connect(options).await?;
        Ok(Client::from_pool(pool))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Merges overrides into the options and validates the result.
    fn into_options(self) -> Result<PoolOptions> {
        let mut options = self.options;
        if let Some(endpoint) = self.endpoint {
            options.endpoint = endpoint;
        }
        if let Some(api_key) = self.api_key {
            options.api_key = api_key;
        }

        validate_endpoint(&options.endpoint)?;
        validate_api_key(&options.api_key)?;
        options.validate()?;

        Ok(options)
    }
}

/// Requires a `ws` or `wss` URL.
fn validate_endpoint(endpoint: &str) -> Result<()> {
    if endpoint.is_empty() {
        return Err(Error::config(
            "Endpoint is required. Use .endpoint() to set it.\n\
             Example: Client::builder().endpoint(\"wss://host/ws\")",
        ));
    }

    let url = Url::parse(endpoint)?;
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(Error::config(format!(
            "Endpoint scheme must be ws or wss, got {other}: {endpoint}"
        ))),
    }
}

/// Requires a non-empty credential.
fn validate_api_key(api_key: &str) -> Result<()> {
    if api_key.trim().is_empty() {
        return Err(Error::config(
            "API key is required. Use .api_key() to set it.",
        ));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
