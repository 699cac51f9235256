//! Error types for cache store operations

use thiserror::Error;

/// Errors that can occur while talking to the cache store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached or a command failed in transit.
    /// Fatal for the current request in a handler; skips the current cycle
    /// in the refresher; fatal at startup.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The key exists but its stored fields do not decode into an entry.
    /// Handlers treat the key as a miss; the refresher evicts it.
    #[error("corrupt cache entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        // Command- and transport-level failures all mean the store cannot
        // currently serve us; corruption is only diagnosed from entry
        // contents, where the key is known.
        StoreError::Unavailable(err.to_string())
    }
}
