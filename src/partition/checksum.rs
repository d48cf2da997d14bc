//! CRC32 framing for partition tokens
//!
//! A sealed token is `crc32(payload) as u32 LE ‖ payload`. Any checksum
//! mismatch means the token was truncated or altered after planning.

use crc32fast::Hasher;

const HEADER_LEN: usize = 4;

/// Computes a CRC32 checksum over the provided data.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Verifies that the computed checksum matches the expected checksum.
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}

/// Prefix `payload` with its checksum
pub fn seal(payload: &[u8]) -> Vec<u8> {
    let mut sealed = Vec::with_capacity(HEADER_LEN + payload.len());
    sealed.extend_from_slice(&compute_checksum(payload).to_le_bytes());
    sealed.extend_from_slice(payload);
    sealed
}

/// Payload of a sealed token, or `None` if it is short or corrupted
pub fn unseal(sealed: &[u8]) -> Option<&[u8]> {
    if sealed.len() < HEADER_LEN {
        return None;
    }
    let (header, payload) = sealed.split_at(HEADER_LEN);
    let expected = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    verify_checksum(payload, expected).then_some(payload)
}
