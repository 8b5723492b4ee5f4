//! Key-value store trait.
//!
//! Generic persistent storage keyed by plain strings. Tether uses it to keep
//! summary cache entries across restarts. Implementations live in
//! tether-infra (SQLite) and in [`super::memory`] (in-process).

use std::future::Future;

use tether_types::error::RepositoryError;

/// Persistent string-keyed store of JSON values.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait KvStore: Send + Sync {
    /// Get a value by key. Returns None if the key does not exist.
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<serde_json::Value>, RepositoryError>> + Send;

    /// Set a value for a key (upsert).
    fn set(
        &self,
        key: &str,
        value: &serde_json::Value,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a key. No-op if key does not exist.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// List keys starting with `prefix`, sorted.
    fn list_keys(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<String>, RepositoryError>> + Send;
}
