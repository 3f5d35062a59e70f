//! Inbound frame validation (RFC 6455).
//!
//! This module enforces the rules a frame must satisfy before its payload is
//! read:
//! - Masking direction per RFC 6455 Section 5.1
//! - RSV bits and control-frame shape per Section 5.2 and 5.5
//! - Frame size limits

use crate::config::Limits;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::FrameHeader;

/// Frame validator for incoming WebSocket frames.
///
/// Enforces RFC 6455 security requirements based on connection role.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    /// Role of the local endpoint.
    role: Role,
    /// Size limits for frames.
    limits: Limits,
}

impl FrameValidator {
    /// Create a new frame validator.
    pub fn new(role: Role, limits: Limits) -> Self {
        Self { role, limits }
    }

    /// Validate a fully decoded header.
    ///
    /// # Errors
    ///
    /// - `Error::UnmaskedClientFrame` - Server received unmasked frame from client
    /// - `Error::MaskedServerFrame` - Client received masked frame from server
    /// - `Error::ReservedBitsSet` - RSV bits set without negotiated extension
    /// - `Error::FragmentedControlFrame` / `Error::ControlFrameTooLarge`
    /// - `Error::FrameTooLarge` - Frame exceeds size limit
    pub fn validate_incoming(&self, header: &FrameHeader) -> Result<()> {
        header.validate()?;
        self.validate_masking(header.mask.is_some())?;
        self.limits.check_frame_size(header.payload_len)
    }

    /// Validate masking rules per RFC 6455 Section 5.1.
    ///
    /// A server must see masked frames, a client must see unmasked ones.
    pub fn validate_masking(&self, masked: bool) -> Result<()> {
        match (self.role.expects_masked(), masked) {
            (true, false) => Err(Error::UnmaskedClientFrame),
            (false, true) => Err(Error::MaskedServerFrame),
            _ => Ok(()),
        }
    }

    /// Validate the raw 64-bit extended length.
    ///
    /// The most significant bit must be clear (RFC 6455 Section 5.2).
    pub fn validate_long_length(&self, len: u64) -> Result<()> {
        if len > i64::MAX as u64 {
            return Err(Error::ProtocolViolation(format!(
                "Frame length {len:#018x} > 0x7fffffffffffffff"
            )));
        }
        Ok(())
    }
}
