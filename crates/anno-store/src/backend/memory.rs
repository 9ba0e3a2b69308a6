//! In-memory backend.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::{BoxFuture, KvBackend, KvPair};
use crate::error::Result;

/// A process-local backend. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.entries.write().insert(key.to_string(), value);
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        Box::pin(async move { Ok(self.entries.read().get(key).cloned()) })
    }

    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.entries.read().contains_key(key)) })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.entries.write().remove(key);
            Ok(())
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<KvPair>>> {
        Box::pin(async move {
            let entries = self.entries.read();
            Ok(entries
                .range(prefix.to_string()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| KvPair {
                    key: k.clone(),
                    value: v.clone(),
                })
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::contract;

    #[tokio::test]
    async fn memory_backend_contract() {
        contract::all(&MemoryBackend::new()).await;
    }

    #[tokio::test]
    async fn memory_backend_list_is_prefix_scoped() {
        contract::list_is_prefix_scoped(&MemoryBackend::new()).await;
    }

    #[tokio::test]
    async fn memory_backend_len() {
        let backend = MemoryBackend::new();
        assert!(backend.is_empty());

        backend.put("a", vec![1]).await.unwrap();
        backend.put("b", vec![2]).await.unwrap();
        assert_eq!(backend.len(), 2);

        backend.delete("a").await.unwrap();
        assert_eq!(backend.len(), 1);
    }
}
