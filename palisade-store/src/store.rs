//! Registry store contract

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error as ThisError;

/// Errors a store backend may report.
///
/// Missing keys are not errors: `get` returns `Ok(None)` and `scan` returns
/// an empty list. Backends reserve errors for connectivity and encoding
/// faults.
#[derive(Debug, ThisError)]
pub enum StoreError {
    /// The backend could not be reached or the operation failed in transit
    #[error("store backend error: {0}")]
    Backend(String),
}

/// A shared key/value store with per-key expiry.
///
/// Concurrent readers and writers are expected; writes are last-write-wins.
/// Every method is a suspension point, so callers must not hold locks across
/// store calls.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Upsert `key` to `value`, optionally expiring after `ttl`.
    ///
    /// A `None` ttl persists the key until it is deleted. Re-setting a key
    /// replaces both its value and its expiry.
    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Fetch a key, returning `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete the given keys. Deleting an absent key is not an error.
    async fn delete(&self, keys: &[String]) -> Result<(), StoreError>;

    /// All live `(key, value)` pairs whose key starts with `prefix`.
    async fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError>;
}
