//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Request handling never reads process-wide environment variables;
//! binaries read them and hand the raw values to the `*_from_env_value` helpers below.

use crate::constants::{
    COLLECTION_EXTENSION, DEFAULT_MAX_COLLECTION_BYTES, DEFAULT_SESSION_TTL_SECS,
};
use crate::error::{StoreError, StoreResult};
use chrono::Duration;
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    max_collection_bytes: u64,
    session_ttl: Duration,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidInput` if `max_collection_bytes` is zero or `session_ttl`
    /// is not positive.
    pub fn new(
        data_dir: PathBuf,
        max_collection_bytes: u64,
        session_ttl: Duration,
    ) -> StoreResult<Self> {
        if max_collection_bytes == 0 {
            return Err(StoreError::InvalidInput(
                "max_collection_bytes must be greater than zero".into(),
            ));
        }
        if session_ttl <= Duration::zero() {
            return Err(StoreError::InvalidInput(
                "session_ttl must be positive".into(),
            ));
        }

        Ok(Self {
            data_dir,
            max_collection_bytes,
            session_ttl,
        })
    }

    /// Configuration with default limits rooted at `data_dir`.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            max_collection_bytes: DEFAULT_MAX_COLLECTION_BYTES,
            session_ttl: Duration::seconds(DEFAULT_SESSION_TTL_SECS),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn max_collection_bytes(&self) -> u64 {
        self.max_collection_bytes
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Path of the monolithic file backing `collection`.
    pub fn collection_file(&self, collection: &str) -> PathBuf {
        self.data_dir
            .join(collection)
            .with_extension(COLLECTION_EXTENSION)
    }

    /// Directory that replaces the collection file once it has been sharded.
    pub fn collection_shard_dir(&self, collection: &str) -> PathBuf {
        self.data_dir.join(collection)
    }
}

/// Parse the maximum collection size from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_MAX_COLLECTION_BYTES`].
pub fn max_collection_bytes_from_env_value(value: Option<String>) -> StoreResult<u64> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match value {
        None => Ok(DEFAULT_MAX_COLLECTION_BYTES),
        Some(v) => v.parse::<u64>().map_err(|e| {
            StoreError::InvalidInput(format!("invalid max collection size '{}': {}", v, e))
        }),
    }
}

/// Parse the session validity window (in seconds) from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the ten minute default.
pub fn session_ttl_from_env_value(value: Option<String>) -> StoreResult<Duration> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let secs = match value {
        None => DEFAULT_SESSION_TTL_SECS,
        Some(v) => v.parse::<i64>().map_err(|e| {
            StoreError::InvalidInput(format!("invalid session ttl '{}': {}", v, e))
        })?,
    };

    Ok(Duration::seconds(secs))
}
