//! Content fingerprints for change detection.
//!
//! The digest is taken over the exact bytes given. Whitespace normalization
//! belongs to the extractor; doing any here would silently change what counts
//! as a change.

use sha2::{Digest, Sha256};

/// SHA-256 of `content` as 64 lowercase hex characters.
pub fn fingerprint(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
