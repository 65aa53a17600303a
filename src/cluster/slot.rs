//! Hash-slot calculation.
//!
//! Keys map to one of 16384 slots by CRC16 modulo the slot count. If the
//! key contains a `{...}` hashtag, only the tag is hashed, so related keys
//! can be pinned to the same slot.

use crc::{Crc, CRC_16_XMODEM};

/// Number of hash slots in a cluster.
pub const SLOT_COUNT: u16 = 16384;

/// CRC-16/XMODEM: polynomial 0x1021, initial 0x0000, no reflection.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Computes the CRC-16/XMODEM checksum of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Calculates the hash slot for a key.
///
/// The slot is `crc16(tag) % 16384` where the tag is the substring between
/// the first `{` and the first following `}` when that substring is
/// non-empty, and the whole key otherwise.
///
/// # Examples
///
/// ```
/// use shoal::cluster::key_slot;
///
/// assert_eq!(key_slot(b"{user1000}.following"), key_slot(b"{user1000}.followers"));
/// assert!(key_slot(b"foo") < 16384);
/// ```
pub fn key_slot(key: &[u8]) -> u16 {
    crc16(hash_tag(key)) % SLOT_COUNT
}

/// Extracts the hashtag from a key, or returns the whole key when no
/// non-empty tag exists.
fn hash_tag(key: &[u8]) -> &[u8] {
    if let Some(open) = key.iter().position(|&b| b == b'{') {
        let a = open + 1;
        if let Some(close) = key[a..].iter().position(|&b| b == b'}') {
            if close > 0 {
                return &key[a..a + close];
            }
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0x31C3);
    }

    #[test]
    fn test_slot_count() {
        assert_eq!(SLOT_COUNT, 16384);
    }

    #[test]
    fn test_hash_tag_table() {
        // slot(key) must equal the hash of the expected tag
        let cases: &[(&[u8], &[u8])] = &[
            (b"{foo}bar", b"foo"),
            (b"{foo}bla", b"foo"),
            (b"foo{bar}", b"bar"),
            (b"foo{}bar", b"foo{}bar"),
            (b"foo{}{bar}", b"foo{}{bar}"),
            (b"foo{{bar}}", b"{bar"),
            (b"foo{bar}{bla}", b"bar"),
            (b"{foobar}", b"foobar"),
            (b"foobar{", b"foobar{"),
            (b"{foobar", b"{foobar"),
        ];

        for (key, tag) in cases {
            assert_eq!(
                key_slot(key),
                crc16(tag) % SLOT_COUNT,
                "key '{}' should hash its tag '{}'",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(tag),
            );
        }
    }

    #[test]
    fn test_key_slot_in_range() {
        for key in [&b""[..], b"foo", b"key:1:value", b"{x}"] {
            assert!(key_slot(key) < SLOT_COUNT);
        }
    }

    #[test]
    fn test_same_tag_same_slot() {
        assert_eq!(
            key_slot(b"{user1000}.following"),
            key_slot(b"{user1000}.followers")
        );
    }

    #[test]
    fn test_distribution() {
        let mut slots = std::collections::HashSet::new();
        for i in 0..100 {
            slots.insert(key_slot(format!("key{}", i).as_bytes()));
        }
        assert!(slots.len() >= 50, "keys should spread across slots");
    }
}
