//! Payload masking (RFC 6455 Section 5.3).
//!
//! Masking is an XOR with a 4-byte key that rolls over the payload. Because
//! XOR is its own inverse the same routine masks and unmasks.

/// XOR `data` with `key`, treating `data[0]` as byte `offset` of the payload.
///
/// The offset lets a payload be masked in pieces: masking `a` at offset 0
/// and then `b` at offset `a.len()` gives the same bytes as masking `a ++ b`
/// in one call.
#[inline]
pub fn toggle_mask(data: &mut [u8], key: [u8; 4], offset: usize) {
    // Rotate so that rotated[0] lines up with data[0].
    let shift = offset % 4;
    let rotated = [
        key[shift],
        key[(shift + 1) % 4],
        key[(shift + 2) % 4],
        key[(shift + 3) % 4],
    ];
    let word = u32::from_ne_bytes(rotated);

    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let val = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ word;
        chunk.copy_from_slice(&val.to_ne_bytes());
    }
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= rotated[i];
    }
}

/// XOR a whole payload with `key`, starting at offset zero.
#[inline]
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    toggle_mask(data, key, 0);
}
