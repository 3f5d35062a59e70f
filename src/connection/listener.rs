//! Application callbacks.

use crate::connection::WebSocket;
use crate::error::Error;
use crate::message::Message;
use crate::protocol::HandshakeResponse;

/// Receives connection events.
///
/// `on_message`, `on_closing` and `on_closed` (when triggered by the peer's
/// close) run on the task driving [`WebSocket::loop_reader`], in wire order.
/// A slow callback stalls inbound processing. `on_closed` may also run on the
/// writer task when the local close frame is the last one exchanged.
///
/// All methods default to doing nothing.
pub trait WebSocketListener: Send + Sync + 'static {
    /// The streams were attached and the connection is open.
    fn on_open(&self, _ws: &WebSocket) {}

    /// A complete text or binary message arrived.
    fn on_message(&self, _ws: &WebSocket, _message: Message) {}

    /// The peer's close frame arrived. Call [`WebSocket::close`] to finish the
    /// handshake if it has not been called yet.
    fn on_closing(&self, _ws: &WebSocket, _code: u16, _reason: &str) {}

    /// Both close frames were exchanged. `code` and `reason` are the peer's.
    fn on_closed(&self, _ws: &WebSocket, _code: u16, _reason: &str) {}

    /// The connection failed. Called at most once, and never after
    /// `on_closed`.
    fn on_failure(&self, _ws: &WebSocket, _error: &Error, _response: Option<&HandshakeResponse>) {}
}
