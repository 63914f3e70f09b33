//! WebSocket client handshake.
//!
//! Dials the configured endpoint and attaches the credential header to the
//! upgrade request.
//!
//! # Connection Flow
//!
//! 1. Build the upgrade request from `PoolOptions::endpoint`
//! 2. Insert `auth_header: api_key`
//! 3. TCP connect + (optional TLS) + WebSocket handshake, bounded by
//!    `connect_timeout`

// ============================================================================
// Imports
// ============================================================================

use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::error::{Error, Result, millis};

use super::options::PoolOptions;

// ============================================================================
// Types
// ============================================================================

/// Socket type produced by [`dial`].
pub(crate) type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Dial
// ============================================================================

/// Opens one WebSocket session for pool slot `index`.
///
/// # Errors
///
/// - [`Error::Connect`] if the request cannot be built or the handshake fails
/// - [`Error::ConnectionTimeout`] if the handshake exceeds `connect_timeout`
pub(crate) async fn dial(options: &PoolOptions, index: usize) -> Result<ClientStream> {
    let mut request = options
        .endpoint
        .as_str()
        .into_client_request()
        .map_err(|e| Error::connect(index, format!("invalid endpoint: {e}")))?;

    let name = HeaderName::from_bytes(options.auth_header.as_bytes())
        .map_err(|e| Error::connect(index, format!("invalid auth header name: {e}")))?;
    let value = HeaderValue::from_str(&options.api_key)
        .map_err(|e| Error::connect(index, format!("invalid credential: {e}")))?;
    request.headers_mut().insert(name, value);

    let (stream, response) = timeout(options.connect_timeout, connect_async(request))
        .await
        .map_err(|_| Error::connection_timeout(millis(options.connect_timeout)))?
        .map_err(|e| Error::connect(index, e.to_string()))?;

    debug!(index, status = %response.status(), "WebSocket handshake completed");

    Ok(stream)
}

// ============================================================================
// Tests
// ============================================================================
