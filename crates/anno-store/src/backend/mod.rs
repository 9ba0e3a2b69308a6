//! Key-value backends behind the subscription store.
//!
//! A backend stores opaque byte values under string keys. It knows nothing
//! about subscriptions; [`crate::SubscriptionStore`] layers the key scheme,
//! the record codec and the operation timeout on top of it.
//!
//! - [`MemoryBackend`]: process-local map, for tests and dry runs
//! - [`SqliteBackend`]: embedded single-file engine
//! - [`EtcdBackend`]: etcd v3 cluster over its JSON gateway

mod etcd;
mod memory;
mod sqlite;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

pub use etcd::{EtcdBackend, EtcdConfig, EtcdTlsConfig};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::error::Result;

/// A boxed, sendable future, as returned by backend operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A stored key and its raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    /// The full key.
    pub key: String,
    /// The raw value.
    pub value: Vec<u8>,
}

/// Capability interface implemented once per storage engine.
///
/// Implementations must be safe for concurrent use and must report a
/// missing key as `Ok(None)` / `Ok(false)`, never as an error.
pub trait KvBackend: Send + Sync + fmt::Debug {
    /// Returns the backend name, for logs.
    fn name(&self) -> &'static str;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot store the value.
    fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, Result<()>>;

    /// Fetches the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>>;

    /// Returns true if a value is stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.get(key).await?.is_some()) })
    }

    /// Removes the value under `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be updated.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Lists every pair whose key starts with `prefix`, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<KvPair>>>;
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every backend must share, run against each implementation.

    use super::KvBackend;

    pub async fn put_then_get(backend: &dyn KvBackend) {
        backend.put("p/1", b"one".to_vec()).await.unwrap();
        assert_eq!(backend.get("p/1").await.unwrap(), Some(b"one".to_vec()));
    }

    pub async fn put_overwrites(backend: &dyn KvBackend) {
        backend.put("p/1", b"one".to_vec()).await.unwrap();
        backend.put("p/1", b"uno".to_vec()).await.unwrap();
        assert_eq!(backend.get("p/1").await.unwrap(), Some(b"uno".to_vec()));
    }

    pub async fn missing_key_is_not_an_error(backend: &dyn KvBackend) {
        assert_eq!(backend.get("p/missing").await.unwrap(), None);
        assert!(!backend.exists("p/missing").await.unwrap());
    }

    pub async fn delete_missing_key_succeeds(backend: &dyn KvBackend) {
        backend.delete("p/missing").await.unwrap();
        backend.put("p/2", b"two".to_vec()).await.unwrap();
        backend.delete("p/2").await.unwrap();
        assert!(!backend.exists("p/2").await.unwrap());
    }

    pub async fn list_is_prefix_scoped(backend: &dyn KvBackend) {
        backend.put("p/1", b"a".to_vec()).await.unwrap();
        backend.put("p/2-9", b"b".to_vec()).await.unwrap();
        backend.put("pq/3", b"c".to_vec()).await.unwrap();
        backend.put("other/4", b"d".to_vec()).await.unwrap();

        let keys: Vec<String> = backend
            .list("p/")
            .await
            .unwrap()
            .into_iter()
            .map(|kv| kv.key)
            .collect();

        assert_eq!(keys, vec!["p/1".to_string(), "p/2-9".to_string()]);
    }

    pub async fn all(backend: &dyn KvBackend) {
        put_then_get(backend).await;
        put_overwrites(backend).await;
        missing_key_is_not_an_error(backend).await;
        delete_missing_key_succeeds(backend).await;
    }
}
