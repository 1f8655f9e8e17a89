//! Payload digests
//!
//! The applier compares blocks by the first [`SHORT_DIGEST_LEN`] hex
//! characters of their SHA-256, which is also what it records as the
//! previous and new hash of an apply.

use sha2::{Digest, Sha256};

/// Number of hex characters in a short digest
pub const SHORT_DIGEST_LEN: usize = 12;

/// Short SHA-256 of a text, as used for idempotent comparisons
#[must_use]
pub fn short_digest(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..SHORT_DIGEST_LEN / 2])
}
