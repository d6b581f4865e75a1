//! Content-addressed report identifiers.
//!
//! Format: `<prefix>:<20-digit scrambled timestamp>-<10-digit content hash>`.
//!
//! The content hash is 32 bits wide. Two different payloads captured in the
//! same millisecond can collide; that is an accepted risk, not a bug.

use sha2::{Digest, Sha256};

pub const DEFAULT_PREFIX: &str = "AppErr";

/// Spread the bits of `t` so that nearby timestamps do not sort together.
///
/// Even bit `2k` moves to `63 - k` (filling the top half downwards), odd bit
/// `2k + 1` moves to `k` (filling the bottom half upwards). This is a fixed
/// permutation, not a hash.
pub fn bit_twiddle(t: u64) -> u64 {
    let mut out = 0u64;
    for i in 0..64 {
        if t & (1 << i) == 0 {
            continue;
        }
        let target = if i % 2 == 0 { 63 - i / 2 } else { i / 2 };
        out |= 1 << target;
    }
    out
}

/// First four bytes of SHA-256, big-endian.
pub fn content_hash(content: &[u8]) -> u32 {
    let digest = Sha256::digest(content);
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

pub fn generate_identifier(prefix: &str, timestamp_millis: u64, content: &[u8]) -> String {
    format!(
        "{prefix}:{:020}-{:010}",
        bit_twiddle(timestamp_millis),
        content_hash(content)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twiddle_moves_low_bits_to_both_ends() {
        assert_eq!(bit_twiddle(0), 0);
        assert_eq!(bit_twiddle(1), 1 << 63);
        assert_eq!(bit_twiddle(0b10), 1);
        assert_eq!(bit_twiddle(0b100), 1 << 62);
        assert_eq!(bit_twiddle(1 << 63), 1 << 31);
        assert_eq!(bit_twiddle(1 << 62), 1 << 32);
    }

    #[test]
    fn twiddle_is_a_permutation() {
        let mut seen = 0u64;
        for i in 0..64 {
            let out = bit_twiddle(1 << i);
            assert_eq!(out.count_ones(), 1);
            assert_eq!(seen & out, 0, "bit {i} collides");
            seen |= out;
        }
        assert_eq!(seen, u64::MAX);
        assert_eq!(bit_twiddle(u64::MAX), u64::MAX);
    }

    #[test]
    fn identifier_has_fixed_width_fields() {
        let id = generate_identifier("AppErr", 1_700_000_000_000, b"trace");
        let (prefix, rest) = id.split_once(':').unwrap();
        assert_eq!(prefix, "AppErr");
        let (ts, hash) = rest.split_once('-').unwrap();
        assert_eq!(ts.len(), 20);
        assert_eq!(hash.len(), 10);
        assert!(ts.chars().chain(hash.chars()).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn identifier_is_deterministic() {
        let a = generate_identifier(DEFAULT_PREFIX, 42, b"payload");
        let b = generate_identifier(DEFAULT_PREFIX, 42, b"payload");
        assert_eq!(a, b);
    }

    #[test]
    fn identifier_changes_with_content_or_time() {
        let base = generate_identifier(DEFAULT_PREFIX, 42, b"payload");
        assert_ne!(base, generate_identifier(DEFAULT_PREFIX, 42, b"payload2"));
        assert_ne!(base, generate_identifier(DEFAULT_PREFIX, 43, b"payload"));
    }

    #[test]
    fn zero_timestamp_is_zero_padded() {
        let id = generate_identifier("X", 0, b"");
        assert!(id.starts_with("X:00000000000000000000-"));
    }
}
