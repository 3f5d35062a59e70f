use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::codec::FrameCallback;
use crate::config::Limits;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::message::{CloseCode, Message, NO_STATUS_CODE};
use crate::protocol::frame::{B1_FLAG_MASK, B1_MASK_LENGTH};
use crate::protocol::{
    FrameHeader, FrameValidator, OpCode, PAYLOAD_LONG, PAYLOAD_SHORT, toggle_mask,
};

/// Decodes frames from an inbound byte stream.
///
/// Control frames are dispatched as soon as they are read, including those
/// interleaved between the fragments of a message. Message fragments are
/// collected until the final one and then dispatched as one [`Message`].
///
/// The reader owns no connection state beyond its two assembly buffers and
/// the flag recording that a close frame was seen.
pub struct FrameReader<R> {
    source: R,
    validator: FrameValidator,
    limits: Limits,
    closed: bool,

    // Header of the frame currently being read.
    header: FrameHeader,
    fragment_count: usize,

    control_frame_buffer: BytesMut,
    message_frame_buffer: BytesMut,
}

impl<R> FrameReader<R> {
    /// Create a reader for the endpoint playing `role`.
    ///
    /// A client reader rejects masked frames and a server reader rejects
    /// unmasked ones.
    pub fn new(source: R, role: Role, limits: Limits) -> Self {
        Self {
            source,
            validator: FrameValidator::new(role, limits.clone()),
            limits,
            closed: false,
            header: FrameHeader::new(true, OpCode::Continuation, 0),
            fragment_count: 0,
            control_frame_buffer: BytesMut::new(),
            message_frame_buffer: BytesMut::new(),
        }
    }

    /// Returns `true` once a close frame has been processed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Recover the underlying source.
    #[must_use]
    pub fn into_inner(self) -> R {
        self.source
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Read the next frame and dispatch it to `callback`.
    ///
    /// A control frame is dispatched on its own. A text or binary frame is
    /// read together with all of its continuation frames (and any control
    /// frames in between) and dispatched once complete.
    ///
    /// # Errors
    ///
    /// Any protocol violation or I/O failure. The reader is unusable
    /// afterwards; the caller must fail the connection.
    pub async fn process_next_frame<C>(&mut self, callback: &C) -> Result<()>
    where
        C: FrameCallback + ?Sized,
    {
        self.read_header().await?;
        if self.header.opcode.is_control() {
            self.read_control_frame(callback).await
        } else {
            self.read_message_frame(callback).await
        }
    }

    async fn read_header(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        let b0 = self.source.read_u8().await?;
        let mut header = FrameHeader::from_first_byte(b0)?;
        header.validate()?;

        let b1 = self.source.read_u8().await?;
        let masked = b1 & B1_FLAG_MASK != 0;
        self.validator.validate_masking(masked)?;

        header.payload_len = match b1 & B1_MASK_LENGTH {
            PAYLOAD_SHORT => u64::from(self.source.read_u16().await?),
            PAYLOAD_LONG => {
                let len = self.source.read_u64().await?;
                self.validator.validate_long_length(len)?;
                len
            }
            len => u64::from(len),
        };

        // Placeholder key so the validator sees the masking bit.
        header.mask = masked.then_some([0; 4]);
        self.validator.validate_incoming(&header)?;

        if masked {
            let mut key = [0u8; 4];
            self.source.read_exact(&mut key).await?;
            header.mask = Some(key);
        }

        self.header = header;
        Ok(())
    }

    async fn read_control_frame<C>(&mut self, callback: &C) -> Result<()>
    where
        C: FrameCallback + ?Sized,
    {
        // Bounded to 125 by validate_incoming.
        let len = self.header.payload_len as usize;
        self.control_frame_buffer.clear();
        self.control_frame_buffer.resize(len, 0);
        self.source
            .read_exact(&mut self.control_frame_buffer[..])
            .await?;
        if let Some(key) = self.header.mask {
            toggle_mask(&mut self.control_frame_buffer[..], key, 0);
        }
        let payload = self.control_frame_buffer.split().freeze();

        trace!(opcode = %self.header.opcode, len, "read control frame");
        match self.header.opcode {
            OpCode::Ping => callback.on_read_ping(payload),
            OpCode::Pong => callback.on_read_pong(payload),
            OpCode::Close => {
                let (code, reason) = parse_close_payload(&payload)?;
                callback.on_read_close(code, reason);
                self.closed = true;
            }
            other => {
                return Err(Error::ProtocolViolation(format!(
                    "Unknown control opcode: {other}"
                )));
            }
        }
        Ok(())
    }

    async fn read_message_frame<C>(&mut self, callback: &C) -> Result<()>
    where
        C: FrameCallback + ?Sized,
    {
        let opcode = self.header.opcode;
        if !opcode.starts_message() {
            return Err(Error::ProtocolViolation(format!(
                "Unexpected continuation frame: {opcode}"
            )));
        }

        self.read_message(callback).await?;
        let payload = self.message_frame_buffer.split().freeze();

        let message = if opcode == OpCode::Text {
            Message::Text(String::from_utf8(Vec::from(payload))?)
        } else {
            Message::Binary(payload)
        };
        callback.on_read_message(message);
        Ok(())
    }

    /// Read control frames until a message frame header arrives.
    async fn read_until_non_control_frame<C>(&mut self, callback: &C) -> Result<()>
    where
        C: FrameCallback + ?Sized,
    {
        while !self.closed {
            self.read_header().await?;
            if !self.header.opcode.is_control() {
                break;
            }
            self.read_control_frame(callback).await?;
        }
        Ok(())
    }

    /// Collect the payloads of a message's frames into the message buffer.
    async fn read_message<C>(&mut self, callback: &C) -> Result<()>
    where
        C: FrameCallback + ?Sized,
    {
        self.message_frame_buffer.clear();
        self.fragment_count = 0;

        loop {
            self.fragment_count += 1;
            self.limits.check_fragment_count(self.fragment_count)?;

            // Bounded by max_frame_size, which is a usize.
            let len = self.header.payload_len as usize;
            let start = self.message_frame_buffer.len();
            self.limits.check_message_size(start.saturating_add(len))?;

            self.message_frame_buffer.resize(start + len, 0);
            self.source
                .read_exact(&mut self.message_frame_buffer[start..])
                .await?;
            if let Some(key) = self.header.mask {
                toggle_mask(&mut self.message_frame_buffer[start..], key, 0);
            }

            if self.header.fin {
                return Ok(());
            }

            self.read_until_non_control_frame(callback).await?;
            if self.closed {
                return Err(Error::ConnectionClosed);
            }
            if self.header.opcode != OpCode::Continuation {
                return Err(Error::ProtocolViolation(format!(
                    "Expected continuation opcode. Got: {}",
                    self.header.opcode
                )));
            }
        }
    }
}

/// Split a close payload into its status code and reason.
///
/// An empty payload means "no status" and reports [`NO_STATUS_CODE`].
fn parse_close_payload(payload: &Bytes) -> Result<(u16, String)> {
    match payload.len() {
        0 => Ok((NO_STATUS_CODE, String::new())),
        1 => Err(Error::ProtocolViolation(
            "Malformed close payload length of 1.".into(),
        )),
        _ => {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            CloseCode::validate(code)?;
            let reason = std::str::from_utf8(&payload[2..])?.to_owned();
            Ok((code, reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Message(Message),
        Ping(Bytes),
        Pong(Bytes),
        Close(u16, String),
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl FrameCallback for Recorder {
        fn on_read_message(&self, message: Message) {
            self.events.lock().unwrap().push(Event::Message(message));
        }

        fn on_read_ping(&self, payload: Bytes) {
            self.events.lock().unwrap().push(Event::Ping(payload));
        }

        fn on_read_pong(&self, payload: Bytes) {
            self.events.lock().unwrap().push(Event::Pong(payload));
        }

        fn on_read_close(&self, code: u16, reason: String) {
            self.events.lock().unwrap().push(Event::Close(code, reason));
        }
    }

    fn frame(fin: bool, opcode: OpCode, payload: &[u8], mask: Option<[u8; 4]>) -> Vec<u8> {
        let mut buf = BytesMut::new();
        FrameHeader::new(fin, opcode, payload.len() as u64)
            .with_mask(mask)
            .encode(&mut buf);
        let start = buf.len();
        buf.put_slice(payload);
        if let Some(key) = mask {
            toggle_mask(&mut buf[start..], key, 0);
        }
        buf.to_vec()
    }

    fn server_frame(fin: bool, opcode: OpCode, payload: &[u8]) -> Vec<u8> {
        frame(fin, opcode, payload, None)
    }

    async fn read_all_as_client(data: &[u8]) -> (Recorder, Result<()>) {
        let recorder = Recorder::default();
        let mut reader = FrameReader::new(data, Role::Client, Limits::default());
        let mut result = Ok(());
        while !data.is_empty() && !reader.is_closed() {
            result = reader.process_next_frame(&recorder).await;
            if result.is_err() || reader.source.is_empty() {
                break;
            }
        }
        (recorder, result)
    }

    #[tokio::test]
    async fn test_read_unmasked_text() {
        let data = [0x81, 0x05, b'H', b'e', b'l', b'l', b'o'];
        let (recorder, result) = read_all_as_client(&data).await;
        result.unwrap();
        assert_eq!(
            recorder.events(),
            vec![Event::Message(Message::text("Hello"))]
        );
    }

    #[tokio::test]
    async fn test_server_reads_masked_text() {
        // RFC 6455 Section 5.7 example.
        let data = [
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let recorder = Recorder::default();
        let mut reader = FrameReader::new(&data[..], Role::Server, Limits::default());
        reader.process_next_frame(&recorder).await.unwrap();
        assert_eq!(
            recorder.events(),
            vec![Event::Message(Message::text("Hello"))]
        );
    }

    #[tokio::test]
    async fn test_read_binary_with_16_bit_length() {
        let payload = vec![0xab; 300];
        let data = server_frame(true, OpCode::Binary, &payload);
        assert_eq!(data[1], 126);

        let (recorder, result) = read_all_as_client(&data).await;
        result.unwrap();
        assert_eq!(
            recorder.events(),
            vec![Event::Message(Message::binary(payload))]
        );
    }

    #[tokio::test]
    async fn test_read_binary_with_64_bit_length() {
        let payload = vec![0xcd; 70_000];
        let data = server_frame(true, OpCode::Binary, &payload);
        assert_eq!(data[1], 127);

        let (recorder, result) = read_all_as_client(&data).await;
        result.unwrap();
        assert_eq!(
            recorder.events(),
            vec![Event::Message(Message::binary(payload))]
        );
    }

    #[tokio::test]
    async fn test_fragmented_message_with_interleaved_ping() {
        let mut data = server_frame(false, OpCode::Text, b"Hel");
        data.extend(server_frame(true, OpCode::Ping, b"p1"));
        data.extend(server_frame(false, OpCode::Continuation, b"l"));
        data.extend(server_frame(true, OpCode::Pong, b""));
        data.extend(server_frame(true, OpCode::Continuation, b"o"));

        let recorder = Recorder::default();
        let mut reader = FrameReader::new(&data[..], Role::Client, Limits::default());
        reader.process_next_frame(&recorder).await.unwrap();

        assert_eq!(
            recorder.events(),
            vec![
                Event::Ping(Bytes::from_static(b"p1")),
                Event::Pong(Bytes::new()),
                Event::Message(Message::text("Hello")),
            ]
        );
    }

    #[tokio::test]
    async fn test_read_close_with_reason() {
        let mut payload = 1000u16.to_be_bytes().to_vec();
        payload.extend_from_slice(b"bye");
        let data = server_frame(true, OpCode::Close, &payload);

        let (recorder, result) = read_all_as_client(&data).await;
        result.unwrap();
        assert_eq!(recorder.events(), vec![Event::Close(1000, "bye".into())]);
    }

    #[tokio::test]
    async fn test_read_empty_close_reports_no_status() {
        let data = server_frame(true, OpCode::Close, b"");
        let (recorder, result) = read_all_as_client(&data).await;
        result.unwrap();
        assert_eq!(recorder.events(), vec![Event::Close(1005, String::new())]);
    }

    #[tokio::test]
    async fn test_close_marks_reader_done() {
        let mut data = server_frame(true, OpCode::Close, b"");
        data.extend(server_frame(true, OpCode::Text, b"late"));

        let recorder = Recorder::default();
        let mut reader = FrameReader::new(&data[..], Role::Client, Limits::default());
        reader.process_next_frame(&recorder).await.unwrap();
        assert!(reader.is_closed());
        assert_eq!(
            reader.process_next_frame(&recorder).await,
            Err(Error::ConnectionClosed)
        );
    }

    #[tokio::test]
    async fn test_one_byte_close_payload_is_protocol_error() {
        let data = server_frame(true, OpCode::Close, &[0x03]);
        let (_, result) = read_all_as_client(&data).await;
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn test_reserved_close_code_is_rejected() {
        for code in [0u16, 1004, 1005, 1006, 1012, 1013, 1014, 1015, 2000, 5000] {
            let data = server_frame(true, OpCode::Close, &code.to_be_bytes());
            let (recorder, result) = read_all_as_client(&data).await;
            assert_eq!(result, Err(Error::InvalidCloseCode(code)));
            assert!(recorder.events().is_empty());
        }
    }

    #[tokio::test]
    async fn test_control_frame_length_limit() {
        let accepted = server_frame(true, OpCode::Ping, &[7; 125]);
        let (recorder, result) = read_all_as_client(&accepted).await;
        result.unwrap();
        assert_eq!(recorder.events().len(), 1);

        // 126 can only be announced through the 16-bit extended length.
        let mut rejected = vec![0x89, 126, 0x00, 126];
        rejected.extend([7; 126]);
        let (recorder, result) = read_all_as_client(&rejected).await;
        assert_eq!(result, Err(Error::ControlFrameTooLarge(126)));
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn test_fragmented_control_frame_rejected() {
        let data = server_frame(false, OpCode::Ping, b"");
        let (_, result) = read_all_as_client(&data).await;
        assert_eq!(result, Err(Error::FragmentedControlFrame));
    }

    #[tokio::test]
    async fn test_reserved_bits_rejected() {
        let mut data = server_frame(true, OpCode::Text, b"x");
        data[0] |= 0x40;
        let (_, result) = read_all_as_client(&data).await;
        assert_eq!(result, Err(Error::ReservedBitsSet));
    }

    #[tokio::test]
    async fn test_mask_direction_enforced() {
        let masked = frame(true, OpCode::Text, b"x", Some([1, 2, 3, 4]));
        let (_, result) = read_all_as_client(&masked).await;
        assert_eq!(result, Err(Error::MaskedServerFrame));

        let unmasked = server_frame(true, OpCode::Text, b"x");
        let recorder = Recorder::default();
        let mut reader = FrameReader::new(&unmasked[..], Role::Server, Limits::default());
        assert_eq!(
            reader.process_next_frame(&recorder).await,
            Err(Error::UnmaskedClientFrame)
        );
    }

    #[tokio::test]
    async fn test_reserved_opcode_rejected() {
        let data = [0x83, 0x00];
        let (_, result) = read_all_as_client(&data).await;
        assert_eq!(result, Err(Error::ReservedOpcode(0x3)));
    }

    #[tokio::test]
    async fn test_continuation_without_start_rejected() {
        let data = server_frame(true, OpCode::Continuation, b"orphan");
        let (_, result) = read_all_as_client(&data).await;
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn test_new_message_inside_fragmented_message_rejected() {
        let mut data = server_frame(false, OpCode::Text, b"a");
        data.extend(server_frame(true, OpCode::Binary, b"b"));
        let (recorder, result) = read_all_as_client(&data).await;
        assert!(matches!(result, Err(Error::ProtocolViolation(msg)) if msg.contains("continuation")));
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn test_close_inside_fragmented_message() {
        let mut data = server_frame(false, OpCode::Text, b"a");
        data.extend(server_frame(true, OpCode::Close, &1000u16.to_be_bytes()));
        let (recorder, result) = read_all_as_client(&data).await;
        assert_eq!(result, Err(Error::ConnectionClosed));
        assert_eq!(recorder.events(), vec![Event::Close(1000, String::new())]);
    }

    #[tokio::test]
    async fn test_negative_64_bit_length_rejected() {
        let mut data = vec![0x82, 127];
        data.extend((1u64 << 63).to_be_bytes());
        let (_, result) = read_all_as_client(&data).await;
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn test_invalid_utf8_text_rejected() {
        let data = server_frame(true, OpCode::Text, &[0xff, 0xfe]);
        let (_, result) = read_all_as_client(&data).await;
        assert_eq!(result, Err(Error::InvalidUtf8));
    }

    #[tokio::test]
    async fn test_message_size_limit() {
        let mut data = server_frame(false, OpCode::Binary, &[0; 60]);
        data.extend(server_frame(true, OpCode::Continuation, &[0; 60]));

        let recorder = Recorder::default();
        let mut reader = FrameReader::new(&data[..], Role::Client, Limits::new(1024, 100, 8));
        assert_eq!(
            reader.process_next_frame(&recorder).await,
            Err(Error::MessageTooLarge { size: 120, max: 100 })
        );
    }

    #[tokio::test]
    async fn test_fragment_count_limit() {
        let mut data = Vec::new();
        data.extend(server_frame(false, OpCode::Binary, b"1"));
        data.extend(server_frame(false, OpCode::Continuation, b"2"));
        data.extend(server_frame(true, OpCode::Continuation, b"3"));

        let recorder = Recorder::default();
        let mut reader = FrameReader::new(&data[..], Role::Client, Limits::new(1024, 1024, 2));
        assert_eq!(
            reader.process_next_frame(&recorder).await,
            Err(Error::TooManyFragments { count: 3, max: 2 })
        );
    }

    #[tokio::test]
    async fn test_truncated_frame_is_io_error() {
        let data = [0x81, 0x05, b'H', b'e'];
        let (_, result) = read_all_as_client(&data).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
