use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::connection::Role;
use crate::error::{Error, Result};
use crate::message::CloseCode;
use crate::protocol::{
    FrameHeader, MAX_CLOSE_REASON, MAX_CONTROL_FRAME_PAYLOAD, OpCode, toggle_mask,
};

/// Encodes frames onto an outbound byte stream.
///
/// Clients mask every frame with a fresh key; servers never mask. Once a
/// close frame has been written (or its write attempted) every further
/// write fails with [`Error::WriterClosed`].
pub struct FrameWriter<W> {
    sink: W,
    role: Role,
    fragment_size: usize,
    writer_closed: bool,
    sink_active: bool,
    frame_buf: BytesMut,
}

impl<W> FrameWriter<W> {
    /// Create a writer for the endpoint playing `role`.
    ///
    /// Messages streamed through a [`MessageSink`] are cut into frames of at
    /// most `fragment_size` payload bytes.
    #[must_use]
    pub fn new(sink: W, role: Role, fragment_size: usize) -> Self {
        Self {
            sink,
            role,
            fragment_size: fragment_size.max(1),
            writer_closed: false,
            sink_active: false,
            frame_buf: BytesMut::new(),
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns `true` once a close frame has been written.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.writer_closed
    }

    #[must_use]
    pub fn into_inner(self) -> W {
        self.sink
    }

    /// A fresh key from the OS random source for every client frame.
    fn next_mask(&self) -> Result<Option<[u8; 4]>> {
        if !self.role.must_mask() {
            return Ok(None);
        }
        let mut key = [0u8; 4];
        getrandom::getrandom(&mut key)?;
        Ok(Some(key))
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Write a ping frame and flush.
    ///
    /// # Errors
    ///
    /// [`Error::ControlFrameTooLarge`] for payloads over 125 bytes,
    /// [`Error::WriterClosed`] after a close frame, or an I/O error.
    pub async fn write_ping(&mut self, payload: &[u8]) -> Result<()> {
        self.write_control_frame(OpCode::Ping, payload).await
    }

    /// Write a pong frame and flush.
    ///
    /// # Errors
    ///
    /// Same as [`write_ping`](Self::write_ping).
    pub async fn write_pong(&mut self, payload: &[u8]) -> Result<()> {
        self.write_control_frame(OpCode::Pong, payload).await
    }

    /// Write a close frame and flush.
    ///
    /// With no `code` the frame has an empty payload. The writer is closed
    /// afterwards even if the write itself failed.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCloseCode`] or [`Error::CloseReasonTooLong`] before
    /// anything is written, otherwise the errors of
    /// [`write_ping`](Self::write_ping).
    pub async fn write_close(&mut self, code: Option<u16>, reason: &str) -> Result<()> {
        let mut payload = BytesMut::new();
        if let Some(code) = code {
            CloseCode::validate(code)?;
            if reason.len() > MAX_CLOSE_REASON {
                return Err(Error::CloseReasonTooLong(reason.len()));
            }
            payload.put_u16(code);
            payload.put_slice(reason.as_bytes());
        }

        let result = self.write_control_frame(OpCode::Close, &payload).await;
        self.writer_closed = true;
        result
    }

    async fn write_control_frame(&mut self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        if self.writer_closed {
            return Err(Error::WriterClosed);
        }
        if payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::ControlFrameTooLarge(payload.len() as u64));
        }

        self.write_frame(true, opcode, payload).await?;
        self.sink.flush().await?;
        Ok(())
    }

    async fn write_frame(&mut self, fin: bool, opcode: OpCode, payload: &[u8]) -> Result<()> {
        let mask = self.next_mask()?;
        let header = FrameHeader::new(fin, opcode, payload.len() as u64).with_mask(mask);

        self.frame_buf.clear();
        header.encode(&mut self.frame_buf);
        let start = self.frame_buf.len();
        self.frame_buf.put_slice(payload);
        if let Some(key) = header.mask {
            toggle_mask(&mut self.frame_buf[start..], key, 0);
        }

        trace!(%opcode, fin, len = payload.len(), "write frame");
        self.sink.write_all(&self.frame_buf).await?;
        Ok(())
    }

    /// Start streaming a text or binary message.
    ///
    /// Only one sink may be open at a time. A sink dropped without
    /// [`finish`](MessageSink::finish) leaves the writer unusable for
    /// messages, since the peer is still waiting for the final fragment.
    ///
    /// # Errors
    ///
    /// [`Error::WriterClosed`] after a close frame, [`Error::SinkActive`]
    /// while another sink is open, or [`Error::ProtocolViolation`] if
    /// `opcode` is not Text or Binary.
    pub fn message_sink(&mut self, opcode: OpCode) -> Result<MessageSink<'_, W>> {
        if self.writer_closed {
            return Err(Error::WriterClosed);
        }
        if self.sink_active {
            return Err(Error::SinkActive);
        }
        if !opcode.starts_message() {
            return Err(Error::ProtocolViolation(format!(
                "Cannot start a message with {opcode}"
            )));
        }

        self.sink_active = true;
        Ok(MessageSink {
            writer: self,
            opcode,
            buffer: BytesMut::new(),
            first_frame: true,
        })
    }

    /// Write a complete message through a [`MessageSink`].
    ///
    /// # Errors
    ///
    /// See [`message_sink`](Self::message_sink) and [`MessageSink::write`].
    pub async fn write_message(&mut self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        let mut sink = self.message_sink(opcode)?;
        sink.write(payload).await?;
        sink.finish().await
    }

    /// Flush and shut down the underlying stream.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.sink.shutdown().await?;
        Ok(())
    }
}

/// Streams one message as a sequence of frames.
///
/// Bytes are buffered until a full segment is ready and more data follows;
/// only then is a non-final frame emitted. [`finish`](Self::finish) writes
/// the remaining bytes as the final frame, which may be empty.
pub struct MessageSink<'a, W> {
    writer: &'a mut FrameWriter<W>,
    opcode: OpCode,
    buffer: BytesMut,
    first_frame: bool,
}

impl<W: AsyncWrite + Unpin> MessageSink<'_, W> {
    /// Append bytes to the message.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if a completed segment could not be written.
    pub async fn write(&mut self, mut data: &[u8]) -> Result<()> {
        let segment = self.writer.fragment_size;
        while !data.is_empty() {
            if self.buffer.len() >= segment {
                let opcode = self.next_opcode();
                self.writer.write_frame(false, opcode, &self.buffer).await?;
                self.buffer.clear();
            }
            let take = (segment - self.buffer.len()).min(data.len());
            self.buffer.put_slice(&data[..take]);
            data = &data[take..];
        }
        Ok(())
    }

    /// Emit the final frame and release the writer.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the write or flush.
    pub async fn finish(mut self) -> Result<()> {
        let opcode = self.next_opcode();
        self.writer.write_frame(true, opcode, &self.buffer).await?;
        self.writer.sink.flush().await?;
        self.writer.sink_active = false;
        Ok(())
    }

    fn next_opcode(&mut self) -> OpCode {
        if self.first_frame {
            self.first_frame = false;
            self.opcode
        } else {
            OpCode::Continuation
        }
    }
}
