//! Cache error types

use thiserror::Error;

/// Errors raised by a cache backend or by the [`CacheClient`](super::CacheClient)
/// wrapper around it.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The operation did not complete within the configured deadline.
    #[error("cache operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The backend could not be reached or refused the operation.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be converted to or from its typed form.
    #[error("failed to convert cached value for '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// `incr_by` was called on a key holding a non-integer value.
    #[error("value at '{0}' is not an integer")]
    NotAnInteger(String),

    /// `rpush` was called on a key holding a non-list value.
    #[error("value at '{0}' is not a list")]
    NotAList(String),

    /// `keys` was called with a malformed glob pattern.
    #[error("invalid key pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}
