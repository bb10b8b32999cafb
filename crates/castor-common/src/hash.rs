//! Deterministic 32-bit hashing for the on-disk hash indexes.
//!
//! The hash function is part of the store format: the builder and the
//! reader must agree on it across processes and platforms. CRC-32 (IEEE)
//! over the serialized key bytes fits the bill.

/// Hash of a raw byte string, as used by the strings hash index.
pub fn hash_bytes(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Continue a running hash with more bytes.
pub fn hash_bytes_with(seed: u32, bytes: &[u8]) -> u32 {
    let mut h = crc32fast::Hasher::new_with_initial(seed);
    h.update(bytes);
    h.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }

    #[test]
    fn test_hash_chaining_differs_from_concat_of_parts() {
        let a = hash_bytes(b"ab");
        let b = hash_bytes_with(hash_bytes(b"a"), b"b");
        // chained hashing must equal hashing the concatenation
        assert_eq!(a, b);
    }
}
