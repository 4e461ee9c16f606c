//! Input validation utilities.
//!
//! This module contains functions for validating inputs before they are used as record keys
//! or on-disk file names.

use crate::error::{StoreError, StoreResult};
use flatshop_types::Cpf;

/// Returns true if `cpf` is a valid 11-digit national identifier.
///
/// The input must already be normalised to digits; see [`flatshop_types::digits_only`].
pub fn validate_cpf(cpf: &str) -> bool {
    Cpf::is_valid(cpf)
}

/// Name fragments that must never appear in a shard file name.
const FORBIDDEN_KEY_PATTERNS: &[&str] = &["/", "\\", "..", "\0"];

/// Longest key accepted as a shard file name (leaves room for the `.json` extension).
const MAX_SHARD_KEY_LEN: usize = 250;

/// Validates that a collection key can be used verbatim as a shard file stem.
///
/// Sharding writes `<dir>/<key>.json`, so a key must not be able to escape `<dir>` or collide
/// with the temporary files written during persistence.
///
/// # Errors
///
/// Returns `StoreError::UnsafeShardKey` if the key is empty, too long, hidden, or contains a
/// path separator or traversal sequence.
pub fn validate_shard_key(key: &str) -> StoreResult<()> {
    let unsafe_key = key.is_empty()
        || key.len() > MAX_SHARD_KEY_LEN
        || key.starts_with('.')
        || FORBIDDEN_KEY_PATTERNS.iter().any(|p| key.contains(p));

    if unsafe_key {
        return Err(StoreError::UnsafeShardKey(key.to_owned()));
    }
    Ok(())
}
