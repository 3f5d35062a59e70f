//! # rsws-duplex - Full-duplex RFC 6455 WebSocket engine
//!
//! `rsws-duplex` runs the WebSocket protocol over a byte-stream pair that an
//! HTTP upgrade has already produced.
//!
//! ## Features
//!
//! - **Strict frame decoding**: reserved bits, mask direction, control-frame
//!   shape and close codes are all enforced
//! - **Non-blocking sends** through an ordered outbound queue with a
//!   backpressure cap, drained by one writer task per connection
//! - **Pong priority**: replies to pings jump ahead of queued messages
//! - **Keepalive** with one outstanding ping at a time
//! - **Graceful close** with a forced cancel when the peer never answers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rsws_duplex::{Config, Role, Streams, WebSocket, WebSocketListener};
//!
//! struct Listener;
//! impl WebSocketListener for Listener {}
//!
//! let ws = WebSocket::new("client", Config::default(), Arc::new(Listener));
//! // `ws.key()` goes into the upgrade request's Sec-WebSocket-Key header.
//! ws.start(Streams::from_io(Role::Client, stream))?;
//! ws.send_text("hello");
//! ws.loop_reader().await;
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;

pub use codec::{FrameCallback, FrameReader, FrameWriter, MessageSink};
pub use config::{Config, Limits};
pub use connection::{ConnectionState, Role, Streams, WebSocket, WebSocketListener};
pub use error::{Error, Result};
pub use message::{CloseCode, CloseFrame, Message};
pub use protocol::{HandshakeResponse, OpCode, WS_GUID, compute_accept_key, generate_key};

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_public_types_are_send() {
        assert_send::<Error>();
        assert_send::<Config>();
        assert_send::<Limits>();
        assert_send::<Message>();
        assert_send::<CloseCode>();
        assert_send::<CloseFrame>();
        assert_send::<ConnectionState>();
        assert_send::<Role>();
        assert_send::<Streams>();
        assert_send::<WebSocket>();
        assert_send::<HandshakeResponse>();
    }

    #[test]
    fn test_public_types_are_sync() {
        assert_sync::<Error>();
        assert_sync::<Config>();
        assert_sync::<Limits>();
        assert_sync::<Message>();
        assert_sync::<CloseCode>();
        assert_sync::<CloseFrame>();
        assert_sync::<ConnectionState>();
        assert_sync::<Role>();
        assert_sync::<WebSocket>();
        assert_sync::<HandshakeResponse>();
    }
}
