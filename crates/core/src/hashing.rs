//! One-way hashing primitives.
//!
//! Every password, confirmation code and session token is stored as a *salted hash*: the
//! SHA-256 hex digest of the input wrapped in a fixed application phrase. The phrase is an
//! application secret shared by all records, not a per-record salt, so equal inputs always
//! produce equal hashes. Address keys use the plain digest.

use crate::constants::{HASH_PREFIX, HASH_SUFFIX};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest of `input`.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 of `input` wrapped in the application phrase.
pub fn salted_hash(input: &str) -> String {
    sha256_hex(&format!("{HASH_PREFIX}{input}{HASH_SUFFIX}"))
}

/// Sentinel stored for accounts whose password must never match.
///
/// This is the salted hash of the *digest* of the empty string, so it differs from
/// `salted_hash("")`. Login refuses any account that stores it.
pub fn blank_password_hash() -> String {
    salted_hash(&sha256_hex(""))
}
