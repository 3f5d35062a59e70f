//! The byte-stream pair a connection runs over.

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::Role;

/// Boxed inbound half of a transport.
pub type BoxedSource = Box<dyn AsyncRead + Send + Unpin>;
/// Boxed outbound half of a transport.
pub type BoxedSink = Box<dyn AsyncWrite + Send + Unpin>;

/// An upgraded transport handed to [`WebSocket::start`](crate::WebSocket::start).
///
/// Whatever performed the HTTP upgrade produces this; the connection consumes
/// it exactly once.
pub struct Streams {
    /// Which side of the upgrade this endpoint played.
    pub role: Role,
    /// Inbound bytes from the peer.
    pub source: BoxedSource,
    /// Outbound bytes to the peer.
    pub sink: BoxedSink,
}

impl Streams {
    /// Wrap separate read and write halves.
    pub fn new<R, W>(role: Role, source: R, sink: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            role,
            source: Box::new(source),
            sink: Box::new(sink),
        }
    }

    /// Split one bidirectional stream, such as a `TcpStream`, into a pair.
    pub fn from_io<T>(role: Role, io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (source, sink) = tokio::io::split(io);
        Self::new(role, source, sink)
    }

    #[must_use]
    pub fn is_client(&self) -> bool {
        self.role.is_client()
    }
}

impl fmt::Debug for Streams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Streams")
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}
