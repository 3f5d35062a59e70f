//! Handshake key material (RFC 6455 Section 4).
//!
//! The HTTP upgrade exchange itself happens outside this crate. What the
//! engine needs from it is the `Sec-WebSocket-Key` it sent and a way to check
//! the server's answer before the byte streams are handed over.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Generate a fresh `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
#[must_use]
pub fn generate_key() -> String {
    let mut nonce = [0u8; 16];
    if getrandom::getrandom(&mut nonce).is_err() {
        // The key only has to be unpredictable to caches, not secret.
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_nanos());
        nonce = nanos.to_le_bytes();
    }
    BASE64.encode(nonce)
}

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use rsws_duplex::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// The parts of the server's upgrade response the engine cares about.
///
/// Also handed to [`WebSocketListener::on_failure`](crate::WebSocketListener::on_failure)
/// when a connection fails because of its handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HandshakeResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Upgrade` header.
    pub upgrade: Option<String>,
    /// Value of the `Connection` header.
    pub connection: Option<String>,
    /// Value of the `Sec-WebSocket-Accept` header.
    pub accept: Option<String>,
}

impl HandshakeResponse {
    /// Create a response with the given status and no headers.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Build the response a compliant server sends for `key`.
    #[must_use]
    pub fn switching_protocols(key: &str) -> Self {
        Self {
            status: 101,
            upgrade: Some("websocket".into()),
            connection: Some("Upgrade".into()),
            accept: Some(compute_accept_key(key)),
        }
    }

    /// Check that this response completes the upgrade started with `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the status is not 101, the
    /// `Connection`/`Upgrade` headers are wrong, or the accept value does not
    /// match the key.
    pub fn verify(&self, key: &str) -> Result<()> {
        if self.status != 101 {
            return Err(Error::InvalidHandshake(format!(
                "Expected HTTP 101 response but was '{}'",
                self.status
            )));
        }

        let connection = self.connection.as_deref().unwrap_or("null");
        if !connection
            .split(',')
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        {
            return Err(Error::InvalidHandshake(format!(
                "Expected 'Connection' header value 'Upgrade' but was '{connection}'"
            )));
        }

        let upgrade = self.upgrade.as_deref().unwrap_or("null");
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Expected 'Upgrade' header value 'websocket' but was '{upgrade}'"
            )));
        }

        let expected = compute_accept_key(key);
        let accept = self.accept.as_deref().unwrap_or("null");
        if accept != expected {
            return Err(Error::InvalidHandshake(format!(
                "Expected 'Sec-WebSocket-Accept' header value '{expected}' but was '{accept}'"
            )));
        }

        Ok(())
    }
}
