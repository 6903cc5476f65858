//! SHA-256 hex digests.

use sha2::{Digest, Sha256};

/// Field separator fed between parts so `("ab", "c")` and `("a", "bc")` differ.
const PART_SEPARATOR: &[u8] = &[0x1f];

/// Lowercase hex SHA-256 of a string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Lowercase hex SHA-256 over an ordered list of parts.
pub fn sha256_hex_parts<S: AsRef<str>>(parts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(PART_SEPARATOR);
        }
        hasher.update(part.as_ref().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
