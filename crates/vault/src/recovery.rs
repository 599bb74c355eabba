//! One-time recovery codes.
//!
//! A code authorizes a destructive vault reset when the passphrase is lost;
//! it cannot recover the master key. Codes are 128-bit random values shown
//! once as `XXXX-XXXX-XXXX-XXXX-XXXX-XXXX-XXXX-XXXX` (uppercase hex); only
//! SHA-256 hashes are persisted. Input is normalized before hashing so
//! lowercase or dash-less entry still matches.

use {
    rand::RngCore,
    sha2::{Digest, Sha256},
};

/// Number of codes issued per batch.
pub const BATCH_SIZE: usize = 8;

/// Generate a single recovery code.
pub fn generate_code() -> String {
    let mut entropy = [0u8; 16];
    rand::rng().fill_bytes(&mut entropy);

    let hex: String = entropy.iter().map(|b| format!("{b:02X}")).collect();
    hex.as_bytes()
        .chunks(4)
        .map(|chunk| String::from_utf8_lossy(chunk).to_string())
        .collect::<Vec<_>>()
        .join("-")
}

/// Generate a full batch of recovery codes.
pub fn generate_batch() -> Vec<String> {
    (0..BATCH_SIZE).map(|_| generate_code()).collect()
}

/// Hash a recovery code for storage or lookup.
///
/// Unknown and already-used codes are looked up the same way and fail the
/// same way; nothing about this hash distinguishes the two to a caller.
pub fn hash_code(code: &str) -> String {
    let normalized: String = code
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}
