//! WebSocket frame codec primitives (RFC 6455).
//!
//! Opcodes, header layout, masking, close-code and handshake-key rules. Everything
//! here is pure: no I/O and no connection state.

pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;
pub mod validation;

pub use frame::{
    FrameHeader, MAX_CLOSE_REASON, MAX_CONTROL_FRAME_PAYLOAD, PAYLOAD_LONG, PAYLOAD_SHORT,
    PAYLOAD_SHORT_MAX,
};
pub use handshake::{HandshakeResponse, WS_GUID, compute_accept_key, generate_key};
pub use mask::{apply_mask, toggle_mask};
pub use opcode::OpCode;
pub use validation::FrameValidator;
