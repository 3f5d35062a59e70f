//! WebSocket frame header layout (RFC 6455 Section 5.2).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                         Masking key (if present)              |
//! +---------------------------------------------------------------+
//! |                     Payload data                              |
//! +---------------------------------------------------------------+
//! ```

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::OpCode;

/// Final fragment flag in the first header byte.
pub const B0_FLAG_FIN: u8 = 0x80;
/// Reserved bit 1 in the first header byte.
pub const B0_FLAG_RSV1: u8 = 0x40;
/// Reserved bit 2 in the first header byte.
pub const B0_FLAG_RSV2: u8 = 0x20;
/// Reserved bit 3 in the first header byte.
pub const B0_FLAG_RSV3: u8 = 0x10;
/// Opcode bits in the first header byte.
pub const B0_MASK_OPCODE: u8 = 0x0F;
/// Mask flag in the second header byte.
pub const B1_FLAG_MASK: u8 = 0x80;
/// Length bits in the second header byte.
pub const B1_MASK_LENGTH: u8 = 0x7F;

/// Maximum payload size for control frames, and the largest length that
/// fits in the 7-bit length field.
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;
/// 7-bit length value announcing a 16-bit extended length.
pub const PAYLOAD_SHORT: u8 = 126;
/// 7-bit length value announcing a 64-bit extended length.
pub const PAYLOAD_LONG: u8 = 127;
/// Largest payload encoded with the 16-bit extended length.
pub const PAYLOAD_SHORT_MAX: u64 = 0xFFFF;
/// Largest close reason in bytes: the 2-byte code takes the rest of the
/// control payload.
pub const MAX_CLOSE_REASON: usize = MAX_CONTROL_FRAME_PAYLOAD - 2;

/// Header of a single frame, decoded or about to be encoded.
///
/// Headers are ephemeral: the reader fills one per frame and the writer
/// builds one per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1. Must be 0; no extensions are negotiated.
    pub rsv1: bool,
    /// Reserved bit 2. Must be 0.
    pub rsv2: bool,
    /// Reserved bit 3. Must be 0.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Masking key, present iff the frame is masked.
    pub mask: Option<[u8; 4]>,
    /// Payload length in bytes.
    pub payload_len: u64,
}

impl FrameHeader {
    /// Create an unmasked header with all reserved bits clear.
    #[must_use]
    pub const fn new(fin: bool, opcode: OpCode, payload_len: u64) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask: None,
            payload_len,
        }
    }

    /// Attach a masking key.
    #[must_use]
    pub const fn with_mask(mut self, mask: Option<[u8; 4]>) -> Self {
        self.mask = mask;
        self
    }

    /// Decode the first header byte.
    ///
    /// # Errors
    ///
    /// Returns `Error::ReservedOpcode` if the opcode nibble is reserved.
    pub fn from_first_byte(b0: u8) -> Result<Self> {
        let opcode = OpCode::from_u8(b0 & B0_MASK_OPCODE)?;
        Ok(Self {
            fin: b0 & B0_FLAG_FIN != 0,
            rsv1: b0 & B0_FLAG_RSV1 != 0,
            rsv2: b0 & B0_FLAG_RSV2 != 0,
            rsv3: b0 & B0_FLAG_RSV3 != 0,
            opcode,
            mask: None,
            payload_len: 0,
        })
    }

    /// Check that this header is legal without extensions.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` if any RSV bit is set
    /// - `Error::FragmentedControlFrame` if a control frame has FIN=0
    /// - `Error::ControlFrameTooLarge` if a control frame payload exceeds 125 bytes
    pub fn validate(&self) -> Result<()> {
        if self.rsv1 || self.rsv2 || self.rsv3 {
            return Err(Error::ReservedBitsSet);
        }

        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if self.payload_len > MAX_CONTROL_FRAME_PAYLOAD as u64 {
                return Err(Error::ControlFrameTooLarge(self.payload_len));
            }
        }

        Ok(())
    }

    /// Number of bytes [`encode`](Self::encode) writes.
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        let extended = if self.payload_len <= MAX_CONTROL_FRAME_PAYLOAD as u64 {
            0
        } else if self.payload_len <= PAYLOAD_SHORT_MAX {
            2
        } else {
            8
        };
        let mask = if self.mask.is_some() { 4 } else { 0 };
        2 + extended + mask
    }

    /// Append the header bytes (not the payload) to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());

        let mut b0 = self.opcode.as_u8();
        if self.fin {
            b0 |= B0_FLAG_FIN;
        }
        if self.rsv1 {
            b0 |= B0_FLAG_RSV1;
        }
        if self.rsv2 {
            b0 |= B0_FLAG_RSV2;
        }
        if self.rsv3 {
            b0 |= B0_FLAG_RSV3;
        }
        buf.put_u8(b0);

        let mask_bit = if self.mask.is_some() { B1_FLAG_MASK } else { 0 };
        if self.payload_len <= MAX_CONTROL_FRAME_PAYLOAD as u64 {
            buf.put_u8(mask_bit | self.payload_len as u8);
        } else if self.payload_len <= PAYLOAD_SHORT_MAX {
            buf.put_u8(mask_bit | PAYLOAD_SHORT);
            buf.put_u16(self.payload_len as u16);
        } else {
            buf.put_u8(mask_bit | PAYLOAD_LONG);
            buf.put_u64(self.payload_len);
        }

        if let Some(key) = self.mask {
            buf.put_slice(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(header: FrameHeader) -> Vec<u8> {
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), header.encoded_len());
        buf.to_vec()
    }

    #[test]
    fn test_encode_small_unmasked() {
        let header = FrameHeader::new(true, OpCode::Text, 5);
        assert_eq!(encoded(header), [0x81, 0x05]);
    }

    #[test]
    fn test_encode_non_final_continuation() {
        let header = FrameHeader::new(false, OpCode::Continuation, 3);
        assert_eq!(encoded(header), [0x00, 0x03]);
    }

    #[test]
    fn test_encode_masked() {
        let header =
            FrameHeader::new(true, OpCode::Ping, 0).with_mask(Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(encoded(header), [0x89, 0x80, 0x37, 0xfa, 0x21, 0x3d]);
    }

    #[test]
    fn test_encode_length_boundaries() {
        assert_eq!(encoded(FrameHeader::new(true, OpCode::Binary, 125)), [0x82, 125]);
        assert_eq!(
            encoded(FrameHeader::new(true, OpCode::Binary, 126)),
            [0x82, 126, 0x00, 0x7e]
        );
        assert_eq!(
            encoded(FrameHeader::new(true, OpCode::Binary, 0xFFFF)),
            [0x82, 126, 0xff, 0xff]
        );
        assert_eq!(
            encoded(FrameHeader::new(true, OpCode::Binary, 0x1_0000)),
            [0x82, 127, 0, 0, 0, 0, 0, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn test_from_first_byte() {
        let header = FrameHeader::from_first_byte(0x81).unwrap();
        assert!(header.fin);
        assert_eq!(header.opcode, OpCode::Text);
        assert!(header.validate().is_ok());

        let header = FrameHeader::from_first_byte(0x02).unwrap();
        assert!(!header.fin);
        assert_eq!(header.opcode, OpCode::Binary);

        let header = FrameHeader::from_first_byte(0xC1).unwrap();
        assert!(header.rsv1);
        assert_eq!(header.validate(), Err(Error::ReservedBitsSet));

        assert_eq!(
            FrameHeader::from_first_byte(0x83),
            Err(Error::ReservedOpcode(0x3))
        );
    }

    #[test]
    fn test_validate_control_frames() {
        let fragmented_ping = FrameHeader::new(false, OpCode::Ping, 0);
        assert_eq!(
            fragmented_ping.validate(),
            Err(Error::FragmentedControlFrame)
        );

        assert!(FrameHeader::new(true, OpCode::Close, 125).validate().is_ok());
        assert_eq!(
            FrameHeader::new(true, OpCode::Close, 126).validate(),
            Err(Error::ControlFrameTooLarge(126))
        );

        // Data frames have no such limit.
        assert!(FrameHeader::new(false, OpCode::Text, 1 << 20).validate().is_ok());
    }

    #[test]
    fn test_close_reason_limit() {
        assert_eq!(MAX_CLOSE_REASON, 123);
    }
}
