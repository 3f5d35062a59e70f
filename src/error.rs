//! Error types for the WebSocket protocol engine.
//!
//! This module defines every error condition the engine can raise: protocol
//! violations found while decoding, API misuse reported to the caller,
//! transport failures and liveness timeouts.

use thiserror::Error;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in a text message or close reason.
    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: u64,
        /// Maximum allowed size.
        max: usize,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// The peer's close frame arrived in the middle of a fragmented message.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The upgrade response did not confirm the WebSocket handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid close code.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Close reason longer than 123 bytes.
    #[error("Close reason too long: {0} bytes (max: 123)")]
    CloseReasonTooLong(usize),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Invalid opcode value.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(u64),

    /// Unmasked client frame (security violation).
    #[error("Client frame must be masked")]
    UnmaskedClientFrame,

    /// Masked server frame (security violation).
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Reserved bits set; no extensions are supported.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// A message sink was started while another one was still open.
    #[error("Another message writer is active. Did you call finish()?")]
    SinkActive,

    /// A frame was written after the close frame.
    #[error("Frame writer is closed")]
    WriterClosed,

    /// The previous ping was still unanswered when the next one was due.
    #[error(
        "Sent ping but didn't receive pong within {interval_ms}ms (after {successful} successful ping/pongs)"
    )]
    PingTimeout {
        /// Keepalive interval in milliseconds.
        interval_ms: u64,
        /// Number of ping/pong round trips that completed before the timeout.
        successful: u64,
    },

    /// The connection was aborted with [`WebSocket::cancel`](crate::WebSocket::cancel).
    #[error("Canceled")]
    Canceled,

    /// [`WebSocket::start`](crate::WebSocket::start) was called on a connection
    /// that is no longer waiting for its streams.
    #[error("Connection already started")]
    AlreadyStarted,
}

impl Error {
    /// Returns `true` for errors caused by a malformed or forbidden frame.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::ProtocolViolation(_)
                | Error::InvalidUtf8
                | Error::FrameTooLarge { .. }
                | Error::MessageTooLarge { .. }
                | Error::TooManyFragments { .. }
                | Error::InvalidCloseCode(_)
                | Error::ReservedOpcode(_)
                | Error::InvalidOpcode(_)
                | Error::FragmentedControlFrame
                | Error::ControlFrameTooLarge(_)
                | Error::UnmaskedClientFrame
                | Error::MaskedServerFrame
                | Error::ReservedBitsSet
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<getrandom::Error> for Error {
    fn from(err: getrandom::Error) -> Self {
        Error::Io(format!("random source unavailable: {err}"))
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(_: std::string::FromUtf8Error) -> Self {
        Error::InvalidUtf8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::FrameTooLarge {
            size: 20_000_000,
            max: 16_000_000,
        };
        assert_eq!(
            err.to_string(),
            "Frame too large: 20000000 bytes (max: 16000000)"
        );
    }

    #[test]
    fn test_ping_timeout_display() {
        let err = Error::PingTimeout {
            interval_ms: 500,
            successful: 3,
        };
        assert_eq!(
            err.to_string(),
            "Sent ping but didn't receive pong within 500ms (after 3 successful ping/pongs)"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let ws_err: Error = io_err.into();
        assert!(matches!(ws_err, Error::Io(_)));
    }

    #[test]
    fn test_protocol_error_classification() {
        assert!(Error::ReservedBitsSet.is_protocol_error());
        assert!(Error::ControlFrameTooLarge(126).is_protocol_error());
        assert!(!Error::Canceled.is_protocol_error());
        assert!(!Error::SinkActive.is_protocol_error());
        assert!(!Error::Io("reset".into()).is_protocol_error());
    }

    #[test]
    fn test_error_clone() {
        let err = Error::InvalidUtf8;
        let cloned = err.clone();
        assert_eq!(err, cloned);
    }
}
