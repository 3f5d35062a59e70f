//! Frame-level reading and writing over async byte streams.
//!
//! [`FrameReader`] decodes inbound frames and reports them through a
//! [`FrameCallback`]; [`FrameWriter`] encodes outbound control frames and
//! streams messages through a [`MessageSink`].

mod reader;
mod writer;

use bytes::Bytes;

use crate::message::Message;

pub use reader::FrameReader;
pub use writer::{FrameWriter, MessageSink};

/// Receives decoded frames from a [`FrameReader`].
///
/// Calls happen synchronously on the task driving the reader, in wire order.
pub trait FrameCallback {
    /// A complete text or binary message was reassembled.
    fn on_read_message(&self, message: Message);

    /// A ping arrived. The payload is what the pong must echo.
    fn on_read_ping(&self, payload: Bytes);

    /// A pong arrived.
    fn on_read_pong(&self, payload: Bytes);

    /// A close frame arrived. `code` is 1005 when the frame had no status.
    fn on_read_close(&self, code: u16, reason: String);
}
