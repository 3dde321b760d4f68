// BLAKE3 content addressing for shard blobs.
//
// A shard's content address is the lowercase hex BLAKE3 digest of its
// bytes. Write-once blobs with identical addresses hold identical data.

/// Hash `data` with BLAKE3 and return the 64-char lowercase hex digest.
pub fn content_address(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_deterministic() {
        let a = content_address(b"shard payload");
        let b = content_address(b"shard payload");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn different_data_different_address() {
        assert_ne!(content_address(b"aaa"), content_address(b"bbb"));
    }
}
