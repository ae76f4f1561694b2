//! WebSocket frame masking utilities
//!
//! Masking is a cyclic XOR with a 4-byte key, so the same function masks and
//! unmasks. Keys come from the thread-local `rand` generator and are never
//! reused between frames.

use rand::Rng;

/// Generate a fresh mask key for a client frame
#[inline]
pub fn generate_mask() -> [u8; 4] {
    rand::rng().random()
}

/// XOR `data` in place with `mask`, key byte `i % 4` for byte `i`
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    // Word at a time, then the tail
    let key = u64::from_ne_bytes([
        mask[0], mask[1], mask[2], mask[3], mask[0], mask[1], mask[2], mask[3],
    ]);
    let mut chunks = data.chunks_exact_mut(8);
    for chunk in &mut chunks {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        let masked = u64::from_ne_bytes(word) ^ key;
        chunk.copy_from_slice(&masked.to_ne_bytes());
    }
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}
