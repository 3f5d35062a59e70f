//! Outbound frame queues.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;

use crate::message::Message;

/// A local close waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CloseMarker {
    pub code: u16,
    pub reason: String,
    /// How long to wait for the peer's close once ours is written.
    pub cancel_after: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Queued {
    Message(Message),
    Close(CloseMarker),
}

/// The next thing the writer task should put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outgoing {
    Pong(Bytes),
    Message(Message),
    Close(CloseMarker),
}

/// Pong replies plus the ordered message-and-close queue.
///
/// Pongs always go first. Once a close is queued no further message is
/// accepted. `queue_size` counts payload bytes of messages that were queued
/// but have not finished writing.
#[derive(Debug, Default)]
pub(crate) struct OutboundQueue {
    pongs: VecDeque<Bytes>,
    messages: VecDeque<Queued>,
    queue_size: u64,
    enqueued_close: bool,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message. Returns `false` once a close has been queued.
    pub fn push_message(&mut self, message: Message) -> bool {
        if self.enqueued_close {
            return false;
        }
        self.queue_size += message.len() as u64;
        self.messages.push_back(Queued::Message(message));
        true
    }

    pub fn push_pong(&mut self, payload: Bytes) {
        self.pongs.push_back(payload);
    }

    /// Queue the local close. Returns `false` if one is already queued.
    pub fn push_close(&mut self, close: CloseMarker) -> bool {
        if self.enqueued_close {
            return false;
        }
        self.enqueued_close = true;
        self.messages.push_back(Queued::Close(close));
        true
    }

    pub fn pop_next(&mut self) -> Option<Outgoing> {
        if let Some(payload) = self.pongs.pop_front() {
            return Some(Outgoing::Pong(payload));
        }
        self.messages.pop_front().map(|queued| match queued {
            Queued::Message(message) => Outgoing::Message(message),
            Queued::Close(close) => Outgoing::Close(close),
        })
    }

    /// Release the bytes of a message that has been written.
    pub fn complete_message(&mut self, len: u64) {
        self.queue_size = self.queue_size.saturating_sub(len);
    }

    /// Whether `additional` more bytes would exceed `max`.
    pub fn would_overflow(&self, additional: u64, max: u64) -> bool {
        self.queue_size.saturating_add(additional) > max
    }

    pub fn queue_size(&self) -> u64 {
        self.queue_size
    }

    pub fn enqueued_close(&self) -> bool {
        self.enqueued_close
    }

    pub fn is_message_queue_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
