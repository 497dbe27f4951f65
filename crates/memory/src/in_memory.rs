//! In-memory backend: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use memoria_core::error::StorageError;
use memoria_core::store::KvStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An in-memory key-value store backed by a sorted map.
/// Useful for testing and sessions where persistence isn't needed.
pub struct InMemoryKv {
    entries: Arc<RwLock<BTreeMap<String, Vec<String>>>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for InMemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKv {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &str) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned().unwrap_or_default())
    }

    async fn append(&self, key: &str, values: Vec<String>) -> Result<usize, StorageError> {
        let mut entries = self.entries.write().await;
        let records = entries.entry(key.to_string()).or_default();
        records.extend(values);
        Ok(records.len())
    }

    async fn replace(&self, key: &str, values: Vec<String>) -> Result<(), StorageError> {
        self.entries.write().await.insert(key.to_string(), values);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
