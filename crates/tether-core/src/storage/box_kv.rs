//! BoxKvStore -- object-safe dynamic dispatch wrapper for KvStore.
//!
//! Follows the same blanket-impl pattern as BoxChatBackend.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tether_types::error::RepositoryError;

use super::kv_store::KvStore;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Object-safe version of [`KvStore`] with boxed futures.
pub trait KvStoreDyn: Send + Sync {
    fn get_boxed<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<serde_json::Value>>;

    fn set_boxed<'a>(&'a self, key: &'a str, value: &'a serde_json::Value) -> BoxFuture<'a, ()>;

    fn delete_boxed<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()>;

    fn list_keys_boxed<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Vec<String>>;
}

impl<T: KvStore> KvStoreDyn for T {
    fn get_boxed<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<serde_json::Value>> {
        Box::pin(self.get(key))
    }

    fn set_boxed<'a>(&'a self, key: &'a str, value: &'a serde_json::Value) -> BoxFuture<'a, ()> {
        Box::pin(self.set(key, value))
    }

    fn delete_boxed<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(self.delete(key))
    }

    fn list_keys_boxed<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Vec<String>> {
        Box::pin(self.list_keys(prefix))
    }
}

/// Type-erased key-value store.
#[derive(Clone)]
pub struct BoxKvStore {
    inner: Arc<dyn KvStoreDyn>,
}

impl BoxKvStore {
    pub fn new<T: KvStore + 'static>(store: T) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, RepositoryError> {
        self.inner.get_boxed(key).await
    }

    pub async fn set(&self, key: &str, value: &serde_json::Value) -> Result<(), RepositoryError> {
        self.inner.set_boxed(key, value).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), RepositoryError> {
        self.inner.delete_boxed(key).await
    }

    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, RepositoryError> {
        self.inner.list_keys_boxed(prefix).await
    }
}

impl std::fmt::Debug for BoxKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxKvStore").finish_non_exhaustive()
    }
}
