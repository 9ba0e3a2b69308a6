//! The subscription store.
//!
//! [`SubscriptionStore`] maps recipient keys to [`Subscription`] records on
//! top of any [`KvBackend`]. Every operation is bounded by the store's
//! operation timeout.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::backend::KvBackend;
use crate::error::{Result, StoreError};
use crate::key::{list_prefix, SubscriptionKey, DEFAULT_KEY_PREFIX};
use crate::record::Subscription;

/// Default bound on a single store operation.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(30);

/// Durable mapping from recipient keys to tag subscriptions.
///
/// Cloning is cheap; clones share the same backend.
#[derive(Clone)]
pub struct SubscriptionStore {
    backend: Arc<dyn KvBackend>,
    prefix: String,
    op_timeout: Duration,
}

impl fmt::Debug for SubscriptionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionStore")
            .field("backend", &self.backend.name())
            .field("prefix", &self.prefix)
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}

impl SubscriptionStore {
    /// Creates a store over `backend` using the default key prefix.
    #[must_use]
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the operation timeout.
    #[must_use]
    pub const fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Returns the key prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the backend name.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Returns the storage path for `key`.
    #[must_use]
    pub fn key_path(&self, key: &SubscriptionKey) -> String {
        key.to_path(&self.prefix)
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout {
                op,
                timeout: self.op_timeout,
            })?
    }

    /// Stores `record` under `key`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or times out.
    pub async fn put(&self, key: &SubscriptionKey, record: &Subscription) -> Result<()> {
        let path = self.key_path(key);
        let value = record.encode()?;
        self.bounded("put", self.backend.put(&path, value)).await?;
        debug!(key = %path, tags = ?record.tags, "stored subscription");
        Ok(())
    }

    /// Fetches the record under `key`. A missing record is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails, times out, or holds a record
    /// that cannot be decoded.
    pub async fn get(&self, key: &SubscriptionKey) -> Result<Option<Subscription>> {
        let path = self.key_path(key);
        match self.bounded("get", self.backend.get(&path)).await? {
            Some(bytes) => Subscription::decode(&path, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Returns true if a record exists under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or times out.
    pub async fn exists(&self, key: &SubscriptionKey) -> Result<bool> {
        let path = self.key_path(key);
        self.bounded("exists", self.backend.exists(&path)).await
    }

    /// Removes the record under `key`. Removing a missing record succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or times out.
    pub async fn delete(&self, key: &SubscriptionKey) -> Result<()> {
        let path = self.key_path(key);
        self.bounded("delete", self.backend.delete(&path)).await?;
        debug!(key = %path, "removed subscription");
        Ok(())
    }

    /// Lists every subscription under the store's prefix.
    ///
    /// Records that cannot be decoded are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or times out.
    pub async fn list(&self) -> Result<Vec<Subscription>> {
        let prefix = list_prefix(&self.prefix);
        let pairs = self.bounded("list", self.backend.list(&prefix)).await?;

        let mut records = Vec::with_capacity(pairs.len());
        for pair in pairs {
            match Subscription::decode(&pair.key, &pair.value) {
                Ok(record) => records.push(record),
                Err(e) => error!(key = %pair.key, error = %e, "skipping undecodable subscription"),
            }
        }

        Ok(records)
    }
}
