//! Storage backends for the orderbook cache
//!
//! The cache only needs "last write wins per key". Anything that can get
//! and set opaque bytes by key can back it: the in-process [`MemoryStore`]
//! or an adapter over an external key-value service.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Byte-oriented key-value store.
///
/// `set` must replace the previous value for `key` atomically.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns `Ok(None)` when the key was never set.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError>;

    async fn set(&self, key: &str, value: Bytes) -> Result<(), StorageError>;
}

/// In-process map backend
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let values = self.values.read().await;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), StorageError> {
        let mut values = self.values.write().await;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_last_write_wins() {
        let store = MemoryStore::new();
        assert!(store.get("a").await.unwrap().is_none());

        store.set("a", Bytes::from_static(b"one")).await.unwrap();
        store.set("a", Bytes::from_static(b"two")).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(Bytes::from_static(b"two")));
    }
}
