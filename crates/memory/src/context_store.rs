//! Context store: the per-device append-only turn log.
//!
//! Each device owns one log under `turns/<device_id>`. Writers for the same
//! device are serialized through a per-device async lock; different devices
//! never contend. Reads go straight to the backing store.
//!
//! The log keeps at most `retention` turns. When an append pushes it over
//! that bound, the oldest turns are compacted away. Turns themselves are
//! never edited or reordered.

use memoria_core::error::StorageError;
use memoria_core::store::KvStore;
use memoria_core::turn::{ConversationId, DeviceId, Turn};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::retry::retry_once;

const TURN_PREFIX: &str = "turns/";

/// Append-only turn storage keyed by device.
pub struct ContextStore {
    kv: Arc<dyn KvStore>,
    retention: usize,
    device_locks: Mutex<HashMap<DeviceId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ContextStore {
    pub fn new(kv: Arc<dyn KvStore>, retention: usize) -> Self {
        Self {
            kv,
            retention: retention.max(1),
            device_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The backing store's name.
    pub fn backend_name(&self) -> &str {
        self.kv.name()
    }

    fn key(device: &DeviceId) -> String {
        format!("{TURN_PREFIX}{device}")
    }

    /// Run `op` while holding the device's write lock. Lock entries are
    /// dropped once no writer holds or waits on them.
    async fn with_device_lock<T, Fut>(&self, device: &DeviceId, op: impl FnOnce() -> Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        let lock = {
            let mut locks = self.device_locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(device.clone()).or_default().clone()
        };
        let out = {
            let _guard = lock.lock().await;
            op().await
        };
        drop(lock);

        let mut locks = self.device_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(device).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(device);
        }
        out
    }

    /// Append a single turn to its device's log.
    pub async fn append(&self, turn: Turn) -> Result<(), StorageError> {
        self.append_all(vec![turn]).await
    }

    /// Append several turns. Turns for the same device land in one write,
    /// so a request/response pair is committed together or not at all.
    pub async fn append_all(&self, turns: Vec<Turn>) -> Result<(), StorageError> {
        let mut by_device: BTreeMap<DeviceId, Vec<Turn>> = BTreeMap::new();
        for turn in turns {
            by_device.entry(turn.device_id.clone()).or_default().push(turn);
        }

        for (device, turns) in by_device {
            let key = Self::key(&device);
            let records = turns
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::Corrupt {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;

            self.with_device_lock(&device, || async {
                let len = retry_once(&key, || self.kv.append(&key, records.clone())).await?;
                debug!(device_id = %device, appended = records.len(), total = len, "Turns appended");

                // The turns are committed; a failed compaction is retried on
                // the next append.
                if len > self.retention
                    && let Err(e) = self.compact(&key, len).await
                {
                    warn!(device_id = %device, error = %e, "Turn log compaction failed");
                }
                Ok::<_, StorageError>(())
            })
            .await?;
        }

        Ok(())
    }

    /// Drop the oldest turns so the log fits the retention bound.
    /// Caller must hold the device lock.
    async fn compact(&self, key: &str, len: usize) -> Result<(), StorageError> {
        let records = retry_once(key, || self.kv.get(key)).await?;
        let keep = records.len().saturating_sub(self.retention);
        let retained = records[keep..].to_vec();
        retry_once(key, || self.kv.replace(key, retained.clone())).await?;
        debug!(key, before = len, after = retained.len(), "Turn log compacted");
        Ok(())
    }

    /// The most recent `limit` turns of a device, most-recent-last.
    pub async fn read(&self, device: &DeviceId, limit: usize) -> Result<Vec<Turn>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let key = Self::key(device);
        let records = retry_once(&key, || self.kv.get(&key)).await?;
        let start = records.len().saturating_sub(limit);

        Ok(records[start..]
            .iter()
            .filter_map(|line| match serde_json::from_str::<Turn>(line) {
                Ok(turn) => Some(turn),
                Err(e) => {
                    warn!(device_id = %device, error = %e, "Skipping corrupted turn record");
                    None
                }
            })
            .collect())
    }

    /// Remove every turn of one conversation from a device's log.
    ///
    /// Returns the number of turns removed. Other conversations are untouched.
    pub async fn delete_conversation(
        &self,
        device: &DeviceId,
        conversation: &ConversationId,
    ) -> Result<usize, StorageError> {
        let key = Self::key(device);
        self.with_device_lock(device, || async {
            let records = retry_once(&key, || self.kv.get(&key)).await?;
            let before = records.len();
            let retained: Vec<String> = records
                .into_iter()
                .filter(|line| match serde_json::from_str::<Turn>(line) {
                    Ok(turn) => &turn.conversation_id != conversation,
                    Err(_) => true,
                })
                .collect();
            let removed = before - retained.len();

            if removed > 0 {
                if retained.is_empty() {
                    retry_once(&key, || self.kv.remove(&key)).await?;
                } else {
                    retry_once(&key, || self.kv.replace(&key, retained.clone())).await?;
                }
                debug!(device_id = %device, conversation_id = %conversation, removed, "Conversation deleted");
            }

            Ok::<_, StorageError>(removed)
        })
        .await
    }

    /// Every device that has at least one stored turn.
    pub async fn devices(&self) -> Result<Vec<DeviceId>, StorageError> {
        let keys = retry_once(TURN_PREFIX, || self.kv.keys(TURN_PREFIX)).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(TURN_PREFIX).map(DeviceId::from))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryKv;
    use async_trait::async_trait;
    use memoria_core::turn::Role;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> ContextStore {
        ContextStore::new(Arc::new(InMemoryKv::new()), 100)
    }

    fn user(device: &str, conv: &str, content: &str) -> Turn {
        Turn::user(device.into(), conv.into(), content)
    }

    /// Fails the first `failures` operations, then delegates.
    struct FlakyKv {
        inner: InMemoryKv,
        failures: AtomicUsize,
    }

    impl FlakyKv {
        fn new(failures: usize) -> Self {
            Self {
                inner: InMemoryKv::new(),
                failures: AtomicUsize::new(failures),
            }
        }

        fn trip(&self, key: &str) -> Result<(), StorageError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StorageError::io(key, "simulated I/O failure"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl KvStore for FlakyKv {
        fn name(&self) -> &str {
            "flaky"
        }
        async fn get(&self, key: &str) -> Result<Vec<String>, StorageError> {
            self.trip(key)?;
            self.inner.get(key).await
        }
        async fn append(&self, key: &str, values: Vec<String>) -> Result<usize, StorageError> {
            self.trip(key)?;
            self.inner.append(key, values).await
        }
        async fn replace(&self, key: &str, values: Vec<String>) -> Result<(), StorageError> {
            self.trip(key)?;
            self.inner.replace(key, values).await
        }
        async fn remove(&self, key: &str) -> Result<bool, StorageError> {
            self.trip(key)?;
            self.inner.remove(key).await
        }
        async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
            self.trip(prefix)?;
            self.inner.keys(prefix).await
        }
    }

    #[tokio::test]
    async fn read_returns_most_recent_last() {
        let store = store();
        for i in 0..5 {
            store.append(user("phone-1", "c1", &format!("m{i}"))).await.unwrap();
        }

        let turns = store.read(&"phone-1".into(), 3).await.unwrap();
        let contents: Vec<_> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn devices_are_isolated() {
        let store = store();
        store.append(user("phone-1", "c1", "mine")).await.unwrap();
        store.append(user("laptop-1", "c2", "theirs")).await.unwrap();

        let phone = store.read(&"phone-1".into(), 10).await.unwrap();
        assert_eq!(phone.len(), 1);
        assert_eq!(phone[0].content, "mine");
        assert!(store.read(&"tablet-1".into(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_all_commits_pair() {
        let store = store();
        let device: DeviceId = "phone-1".into();
        store
            .append_all(vec![
                user("phone-1", "c1", "Hello"),
                Turn::assistant(device.clone(), "c1".into(), "Hi there", "phi3"),
            ])
            .await
            .unwrap();

        let turns = store.read(&device, 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].model_used.as_deref(), Some("phi3"));
    }

    #[tokio::test]
    async fn retention_drops_oldest() {
        let store = ContextStore::new(Arc::new(InMemoryKv::new()), 3);
        for i in 0..5 {
            store.append(user("d", "c", &format!("m{i}"))).await.unwrap();
        }
        let turns = store.read(&"d".into(), 10).await.unwrap();
        let contents: Vec<_> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn delete_conversation_removes_whole_conversation_only() {
        let store = store();
        store.append(user("d", "keep", "a")).await.unwrap();
        store.append(user("d", "drop", "b")).await.unwrap();
        store.append(user("d", "keep", "c")).await.unwrap();
        store.append(user("d", "drop", "d")).await.unwrap();

        let removed = store
            .delete_conversation(&"d".into(), &"drop".into())
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let turns = store.read(&"d".into(), 10).await.unwrap();
        let contents: Vec<_> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "c"]);

        let none = store
            .delete_conversation(&"d".into(), &"missing".into())
            .await
            .unwrap();
        assert_eq!(none, 0);
    }

    #[tokio::test]
    async fn single_failure_is_retried() {
        let store = ContextStore::new(Arc::new(FlakyKv::new(1)), 100);
        store.append(user("d", "c", "survives")).await.unwrap();
        assert_eq!(store.read(&"d".into(), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn double_failure_surfaces_unavailable() {
        let store = ContextStore::new(Arc::new(FlakyKv::new(2)), 100);
        let err = store.append(user("d", "c", "lost")).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
    }

    /// Accepts appends but refuses every rewrite.
    struct NoRewriteKv {
        inner: InMemoryKv,
    }

    #[async_trait]
    impl KvStore for NoRewriteKv {
        fn name(&self) -> &str {
            "no_rewrite"
        }
        async fn get(&self, key: &str) -> Result<Vec<String>, StorageError> {
            self.inner.get(key).await
        }
        async fn append(&self, key: &str, values: Vec<String>) -> Result<usize, StorageError> {
            self.inner.append(key, values).await
        }
        async fn replace(&self, key: &str, _values: Vec<String>) -> Result<(), StorageError> {
            Err(StorageError::io(key, "read-only volume"))
        }
        async fn remove(&self, key: &str) -> Result<bool, StorageError> {
            self.inner.remove(key).await
        }
        async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
            self.inner.keys(prefix).await
        }
    }

    #[tokio::test]
    async fn failed_compaction_keeps_append_committed() {
        let store = ContextStore::new(
            Arc::new(NoRewriteKv {
                inner: InMemoryKv::new(),
            }),
            1,
        );
        store.append(user("d", "c", "one")).await.unwrap();
        store.append(user("d", "c", "two")).await.unwrap();

        let contents: Vec<_> = store
            .read(&"d".into(), 10)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.content)
            .collect();
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn device_locks_are_released() {
        let store = store();
        for device in ["a", "b", "c"] {
            store.append(user(device, "conv", "hi")).await.unwrap();
        }
        store
            .delete_conversation(&"a".into(), &"conv".into())
            .await
            .unwrap();
        assert!(store.device_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_same_device_are_not_lost() {
        let store = Arc::new(store());
        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append(user("phone-1", "c", &format!("m{i}"))).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(store.read(&"phone-1".into(), 100).await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn corrupted_records_are_skipped() {
        let kv = Arc::new(InMemoryKv::new());
        let good = serde_json::to_string(&user("d", "c", "ok")).unwrap();
        kv.append("turns/d", vec![good, "not json".into()]).await.unwrap();

        let store = ContextStore::new(kv, 100);
        let turns = store.read(&"d".into(), 10).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, "ok");
    }

    #[tokio::test]
    async fn lists_devices() {
        let store = store();
        store.append(user("b", "c", "x")).await.unwrap();
        store.append(user("a", "c", "x")).await.unwrap();
        let devices = store.devices().await.unwrap();
        assert_eq!(devices, vec![DeviceId::from("a"), DeviceId::from("b")]);
    }
}
