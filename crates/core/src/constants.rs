//! Constants used throughout the flatshop core crate.
//!
//! This module contains collection names, on-disk layout details and the fixed values that
//! the hashing and numbering schemes depend on. Changing any of the hashing constants
//! invalidates every stored password, confirmation code and address key.

/// Default directory for collection storage when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Collection holding users keyed by CPF.
pub const USERS_COLLECTION: &str = "users";

/// Collection holding orders keyed by day-scoped numeric id.
pub const ORDERS_COLLECTION: &str = "orders";

/// Collection holding addresses keyed by content hash.
pub const ADDRESSES_COLLECTION: &str = "addresses";

/// Every collection the domain service touches.
pub const COLLECTIONS: &[&str] = &[USERS_COLLECTION, ORDERS_COLLECTION, ADDRESSES_COLLECTION];

/// File extension of collection and shard files.
pub const COLLECTION_EXTENSION: &str = "json";

/// Suffix appended to a collection file while it is being rewritten.
pub const TEMP_EXTENSION: &str = "json.tmp";

/// Indentation used when pretty-printing collections.
pub const JSON_INDENT: &[u8] = b"    ";

/// Default maximum on-disk size of a single collection file, in bytes.
///
/// Kept low so that sharding is reached by ordinary use and in tests.
pub const DEFAULT_MAX_COLLECTION_BYTES: u64 = 1000;

/// Default validity window of a login session, in seconds.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 10 * 60;

/// Application phrase placed before the input of every salted hash.
pub const HASH_PREFIX: &str = "HaKuNa_MaTaTa";

/// Application phrase placed after the input of every salted hash.
pub const HASH_SUFFIX: &str = "WhAt-A-WoNdErFuL-PhRaSe! \\o/";

/// Multiplier applied to the `YYMMDD` date code to leave room for the daily serial.
///
/// More than `ORDER_SERIAL_SPAN - 1` orders in one day overflow into the next day's range.
pub const ORDER_SERIAL_SPAN: u64 = 10_000;

/// Status of a freshly placed order.
pub const ORDER_STATUS_PLACED: i64 = 0;
