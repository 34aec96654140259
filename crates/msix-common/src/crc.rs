//! CRC-32 hashing utilities.
//!
//! ZIP uses the IEEE 802.3 polynomial (the same as zlib and PNG), not CRC32C.

pub use crc32fast::Hasher as Crc32;

/// Compute the CRC-32 of a byte slice.
#[inline]
pub fn hash_bytes(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hash() {
        assert_eq!(hash_bytes(&[]), 0);
    }

    #[test]
    fn test_known_hash() {
        // Standard check value for CRC-32/ISO-HDLC
        assert_eq!(hash_bytes(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut hasher = Crc32::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), hash_bytes(b"hello world"));
    }
}
