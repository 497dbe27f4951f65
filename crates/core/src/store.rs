//! KvStore trait: the persistence seam under the memory layer.
//!
//! Every table the runtime persists is expressed as a key mapping to an
//! ordered list of serialized records:
//! - `turns/<device_id>`: one append-only turn log per device
//! - `links`: the link-pair table
//! - `models/<model_id>`: one descriptor snapshot per model
//!
//! Implementations: in-memory (tests), JSONL file-per-key, SQLite.

use async_trait::async_trait;
use crate::error::StorageError;

/// A minimal append-oriented key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "file", "sqlite").
    fn name(&self) -> &str;

    /// All records under `key`, in insertion order. Missing keys are empty.
    async fn get(&self, key: &str) -> Result<Vec<String>, StorageError>;

    /// Append records under `key` as a single write. Returns the new record count.
    async fn append(&self, key: &str, values: Vec<String>) -> Result<usize, StorageError>;

    /// Replace everything under `key` with `values`.
    async fn replace(&self, key: &str, values: Vec<String>) -> Result<(), StorageError>;

    /// Remove `key` entirely. Returns whether it existed.
    async fn remove(&self, key: &str) -> Result<bool, StorageError>;

    /// Keys starting with `prefix`, sorted.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}
